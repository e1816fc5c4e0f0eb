//! `revamp-products` — the Product aggregate.
//!
//! A product is a single returned/refurbishable item submitted by a vendor.
//! Its own stream carries intrinsic attributes, the admin quality-rating
//! override and soft deletion; batch-driven workflow status (in_batch,
//! sent_for_review, verified/rejected via review) is projected from the
//! owning batch's stream.

pub mod product;

pub use product::{
    Condition, DeleteProduct, Product, ProductCommand, ProductDeleted, ProductDetails,
    ProductEvent, ProductId, ProductRated, ProductRestored, ProductStatus, ProductSubmitted,
    ProductUpdated, QualityRating, RateProduct, RestoreProduct, SubmitProduct, UpdateProduct,
};
