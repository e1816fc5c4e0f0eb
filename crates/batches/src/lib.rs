//! `revamp-batches` — the Batch aggregate.
//!
//! A batch is a vendor-defined grouping of products submitted together for
//! review. Its stream is the single atomic unit for every workflow
//! transition that cascades to member products: one append carries both the
//! batch status change and, by projection, every member's derived status.

pub mod batch;

pub use batch::{
    Batch, BatchCommand, BatchCreated, BatchDeleted, BatchEvent, BatchId, BatchReviewed,
    BatchSentForReview, BatchStatus, CreateBatch, DecideReview, DeleteBatch, ReviewDecision,
    SendForReview,
};
