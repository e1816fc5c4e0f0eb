use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use revamp_auth::{JwtClaims, PrincipalId, Role};
use revamp_core::TenantId;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = revamp_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, sub: PrincipalId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn product_body(title: &str) -> serde_json::Value {
    json!({
        "title": title,
        "brand": "Acme",
        "category": "electronics",
        "condition": "very_good",
        "original_price": "129.99",
        "listing_price": "79.50",
        "quantity": 1,
        "description": "returned unit, light wear",
    })
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Health stays public.
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::admin()]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn full_batch_review_lifecycle() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);
    let admin_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::admin()]);

    // Vendor submits two products.
    let mut product_ids = Vec::new();
    for title in ["laptop", "tablet"] {
        let res = client
            .post(format!("{}/products", srv.base_url))
            .bearer_auth(&vendor_token)
            .json(&product_body(title))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: serde_json::Value = res.json().await.unwrap();
        product_ids.push(body["id"].as_str().unwrap().to_string());
    }

    // Vendor groups them into a batch.
    let res = client
        .post(format!("{}/batches", srv.base_url))
        .bearer_auth(&vendor_token)
        .json(&json!({
            "name": "week 32 returns",
            "product_ids": product_ids,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let batch_id = body["id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/batches/{}", srv.base_url, batch_id))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    let batch: serde_json::Value = res.json().await.unwrap();
    assert_eq!(batch["status"], "draft");
    assert_eq!(batch["total_products"], 2);

    // Members are now in_batch.
    let res = client
        .get(format!("{}/products/{}", srv.base_url, product_ids[0]))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product["status"], "in_batch");
    assert_eq!(product["batch_id"].as_str().unwrap(), batch_id);

    // Vendor sends the batch for review.
    let res = client
        .post(format!("{}/batches/{}/send-for-review", srv.base_url, batch_id))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Sending twice is an invalid transition.
    let res = client
        .post(format!("{}/batches/{}/send-for-review", srv.base_url, batch_id))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The vendor may not decide the review.
    let res = client
        .post(format!("{}/batches/{}/review", srv.base_url, batch_id))
        .bearer_auth(&vendor_token)
        .json(&json!({"status": "approved"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Admin approves with notes.
    let res = client
        .post(format!("{}/batches/{}/review", srv.base_url, batch_id))
        .bearer_auth(&admin_token)
        .json(&json!({"status": "approved", "notes": "ok"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{}/batches/{}", srv.base_url, batch_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let batch: serde_json::Value = res.json().await.unwrap();
    assert_eq!(batch["status"], "approved");
    assert_eq!(batch["notes"], "ok");
    assert_eq!(batch["verified_products"], 2);
    assert!(batch["reviewed_at"].is_string());

    for id in &product_ids {
        let res = client
            .get(format!("{}/products/{}", srv.base_url, id))
            .bearer_auth(&vendor_token)
            .send()
            .await
            .unwrap();
        let product: serde_json::Value = res.json().await.unwrap();
        assert_eq!(product["status"], "verified");
    }

    // A decided batch cannot be deleted.
    let res = client
        .delete(format!("{}/batches/{}", srv.base_url, batch_id))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn vendor_visibility_is_scoped() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_a = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);
    let vendor_b = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_a)
        .json(&product_body("camera"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let product_id = body["id"].as_str().unwrap().to_string();

    // Another vendor gets a 404, not a 403, for a foreign product.
    let res = client
        .get(format!("{}/products/{}", srv.base_url, product_id))
        .bearer_auth(&vendor_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_b)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rating_override_requires_admin() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);
    let admin_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::admin()]);

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_token)
        .json(&product_body("monitor"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let product_id = body["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/products/{}/rate", srv.base_url, product_id))
        .bearer_auth(&vendor_token)
        .json(&json!({"rating": "A"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/products/{}/rate", srv.base_url, product_id))
        .bearer_auth(&admin_token)
        .json(&json!({"rating": "B", "notes": "scratched bezel"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{}/products/{}", srv.base_url, product_id))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product["status"], "verified");
    assert_eq!(product["quality_rating"], "B");
}

#[tokio::test]
async fn malformed_input_is_rejected_with_field_detail() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);

    let mut body = product_body("keyboard");
    body["condition"] = json!("mint");
    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");

    let mut body = product_body("keyboard");
    body["listing_price"] = json!("12.345");
    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_import_creates_pending_products() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);

    let res = client
        .post(format!("{}/products/bulk", srv.base_url))
        .bearer_auth(&vendor_token)
        .json(&json!({
            "products": [product_body("a"), product_body("b"), product_body("c")],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["ids"].as_array().unwrap().len(), 3);

    let res = client
        .get(format!("{}/products", srv.base_url))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item["status"] == "pending"));
}

#[tokio::test]
async fn user_directory_is_admin_only() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let tenant_id = TenantId::new();
    let vendor_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::vendor()]);
    let admin_token = mint_jwt(jwt_secret, tenant_id, PrincipalId::new(), vec![Role::superadmin()]);

    let res = client
        .get(format!("{}/users", srv.base_url))
        .bearer_auth(&vendor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/users", srv.base_url))
        .bearer_auth(&admin_token)
        .json(&json!({
            "email": "vendor@example.com",
            "display_name": "Vendor One",
            "role": "vendor",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/users", srv.base_url))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["email"], "vendor@example.com");
    assert_eq!(items[0]["role"], "vendor");
}
