use chrono::{Duration as ChronoDuration, Utc};
use millbook_auth::{Hs256TokenIssuer, JwtClaims, PrincipalId, Role};
use millbook_core::MillId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = millbook_api::app::build_app(jwt_secret.to_string()).await;
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

fn mint_jwt(jwt_secret: &str, mill_id: MillId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        mill_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    Hs256TokenIssuer::new(jwt_secret.as_bytes())
        .issue(&claims)
        .expect("failed to encode jwt")
}

/// The API is intentionally eventual-consistent (command path vs projection
/// update). Poll briefly until the projection catches up.
async fn get_json_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    ready: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();
        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if ready(&body) {
                return body;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("projection did not catch up within timeout for {url}");
}

async fn created_id(res: reqwest::Response) -> String {
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
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
}

#[tokio::test]
async fn mill_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let mill_id = MillId::new();
    let token = mint_jwt(jwt_secret, mill_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["mill_id"].as_str().unwrap(), mill_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn arrival_lifecycle_reaches_the_stock_register() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let mill_id = MillId::new();
    let token = mint_jwt(jwt_secret, mill_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    // Reference data first (the arrival form needs all three pickers).
    let mandi_id = created_id(
        client
            .post(format!("{}/mandis", srv.base_url))
            .bearer_auth(&token)
            .json(&json!({"name": "Gondia Mandi", "distance_km": 42.5}))
            .send()
            .await
            .unwrap(),
    )
    .await;

    let vehicle_id = created_id(
        client
            .post(format!("{}/vehicles", srv.base_url))
            .bearer_auth(&token)
            .json(&json!({"registration": "mh 35 ab 1234"}))
            .send()
            .await
            .unwrap(),
    )
    .await;

    let driver_id = created_id(
        client
            .post(format!("{}/drivers", srv.base_url))
            .bearer_auth(&token)
            .json(&json!({"name": "Ramesh Kumar", "phone": "+91 98765 43210"}))
            .send()
            .await
            .unwrap(),
    )
    .await;

    // Pickers are fed by projections; wait until all three are visible.
    for path in ["mandis", "vehicles", "drivers"] {
        get_json_eventually(
            &client,
            &format!("{}/{}", srv.base_url, path),
            &token,
            |body| !body["items"].as_array().unwrap().is_empty(),
        )
        .await;
    }

    // Record a balanced load: 250 bags × 40 kg = 10 000 kg.
    let res = client
        .post(format!("{}/arrivals", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "date": "2024-11-14",
            "season": "2024-25",
            "ac_note": "AC-1021",
            "mandi_id": mandi_id,
            "vehicle_id": vehicle_id,
            "driver_id": driver_id,
            "bag_count": 250,
            "weight_kg": 10_000,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["within_tolerance"], json!(true));

    // The arrivals register shows the denormalized entry.
    let arrivals = get_json_eventually(
        &client,
        &format!("{}/arrivals?season=2024-25", srv.base_url),
        &token,
        |body| !body["items"].as_array().unwrap().is_empty(),
    )
    .await;
    let entry = &arrivals["items"][0];
    assert_eq!(entry["mandi_name"], json!("Gondia Mandi"));
    assert_eq!(entry["vehicle_registration"], json!("MH35AB1234"));
    assert_eq!(entry["expected_weight_kg"], json!(10_000));
    assert_eq!(entry["variance_kg"], json!(0));

    // An issue for the following day flows into the same register.
    let res = client
        .post(format!("{}/stock/issues", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({"season": "2024-25", "date": "2024-11-15", "quantity_kg": 6_000}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let register = get_json_eventually(
        &client,
        &format!("{}/stock/register?season=2024-25", srv.base_url),
        &token,
        |body| body["rows"].as_array().unwrap().len() == 2,
    )
    .await;

    let rows = register["rows"].as_array().unwrap();
    assert_eq!(rows[0]["date"], json!("2024-11-14"));
    assert_eq!(rows[0]["closing_kg"], json!(10_000));
    assert_eq!(rows[1]["opening_kg"], json!(10_000));
    assert_eq!(rows[1]["received_kg"], json!(0));
    assert_eq!(rows[1]["closing_kg"], json!(4_000));
    assert_eq!(register["summary"]["current_closing_kg"], json!(4_000));
}

#[tokio::test]
async fn created_users_can_login_with_their_password() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let mill_id = MillId::new();
    let admin_token = mint_jwt(jwt_secret, mill_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/admin/users", srv.base_url))
        .bearer_auth(&admin_token)
        .json(&json!({
            "username": "weighbridge",
            "display_name": "Weighbridge Desk",
            "password": "paddy@2024",
            "initial_roles": ["operator"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Login is read-model backed; wait for the user to project.
    get_json_eventually(
        &client,
        &format!("{}/admin/users", srv.base_url),
        &admin_token,
        |body| !body["items"].as_array().unwrap().is_empty(),
    )
    .await;

    // Wrong password is rejected without detail.
    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({
            "mill_id": mill_id.to_string(),
            "username": "weighbridge",
            "password": "wrong",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Correct password yields a working session token.
    let res = client
        .post(format!("{}/auth/login", srv.base_url))
        .json(&json!({
            "mill_id": mill_id.to_string(),
            "username": "weighbridge",
            "password": "paddy@2024",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let session_token = body["token"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&session_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["mill_id"].as_str().unwrap(), mill_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "operator"));
}

#[tokio::test]
async fn viewers_cannot_write_reference_data() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let mill_id = MillId::new();
    let token = mint_jwt(jwt_secret, mill_id, vec![Role::new("viewer")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/mandis", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({"name": "Tumsar", "distance_km": 12.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Reads are still allowed.
    let res = client
        .get(format!("{}/mandis", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn mills_are_isolated_from_each_other() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let mill_a = MillId::new();
    let mill_b = MillId::new();
    let token_a = mint_jwt(jwt_secret, mill_a, vec![Role::new("admin")]);
    let token_b = mint_jwt(jwt_secret, mill_b, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/mandis", srv.base_url))
        .bearer_auth(&token_a)
        .json(&json!({"name": "Gondia Mandi", "distance_km": 42.5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    get_json_eventually(
        &client,
        &format!("{}/mandis", srv.base_url),
        &token_a,
        |body| !body["items"].as_array().unwrap().is_empty(),
    )
    .await;

    // The other mill sees an empty directory.
    let res = client
        .get(format!("{}/mandis", srv.base_url))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
}
