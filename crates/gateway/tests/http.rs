//! Drives the gateway over real HTTP, the way a forwarding browser driver does

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use slicemock_common::Seed;
use slicemock_gateway::server::{self, FULFILLMENT_HEADER, PASS_THROUGH};
use slicemock_gateway::{Gateway, GatewayConfig, InterceptRecord, RouteStub, UnmatchedPolicy};

struct Served {
    base: String,
    gateway: Gateway,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for Served {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn serve(gateway: Gateway) -> Served {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    let handle = gateway.clone();
    tokio::spawn(async move {
        server::serve_until(listener, handle, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    Served {
        base: format!("http://{}", addr),
        gateway,
        stop: Some(tx),
    }
}

fn storefront() -> Gateway {
    Gateway::storefront(GatewayConfig::default(), Seed::storefront()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let served = serve(storefront()).await;
    let body: Value = reqwest::get(format!("{}/__slicemock/health", served.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_login_session_over_http() {
    let served = serve(storefront()).await;
    let client = reqwest::Client::new();

    let login = client
        .put(format!("{}/api/auth", served.base))
        .json(&json!({ "email": "d@jwt.com", "password": "a" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);
    let login: Value = login.json().await.unwrap();
    assert_eq!(login["user"]["name"], "Kai Chen");

    let me: Value = client
        .get(format!("{}/api/user/me", served.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["email"], "d@jwt.com");

    let log: Vec<InterceptRecord> = client
        .get(format!("{}/__slicemock/requests", served.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].rule.as_deref(), Some("user-me"));
    assert_eq!(served.gateway.intercepts().len(), 2);
}

#[tokio::test]
async fn test_stub_overrides_login() {
    let gateway = storefront();
    let stub: RouteStub = serde_yaml::from_str(
        "method: PUT\nglob: '*/**/api/auth'\nstatus: 401\nbody:\n  error: Unauthorized\n",
    )
    .unwrap();
    gateway.register_stub(&stub).unwrap();
    let served = serve(gateway).await;

    let resp = reqwest::Client::new()
        .put(format!("{}/api/auth", served.base))
        .json(&json!({ "email": "d@jwt.com", "password": "a" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Unauthorized" }));
    assert!(!served.gateway.state().is_authenticated());
}

#[tokio::test]
async fn test_unhandled_route_is_501() {
    let served = serve(storefront()).await;
    let resp = reqwest::get(format!("{}/api/nowhere", served.base)).await.unwrap();
    assert_eq!(resp.status(), 501);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["url"], "http://localhost:5173/api/nowhere");
}

#[tokio::test]
async fn test_pass_through_marks_response() {
    let config = GatewayConfig {
        unmatched: UnmatchedPolicy::PassThrough,
        ..Default::default()
    };
    let served = serve(Gateway::storefront(config, Seed::storefront()).unwrap()).await;
    let resp = reqwest::get(format!("{}/assets/logo.png", served.base)).await.unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(resp.headers()[FULFILLMENT_HEADER], PASS_THROUGH);
}

#[tokio::test]
async fn test_state_snapshot_reflects_mutation() {
    let served = serve(storefront()).await;
    let client = reqwest::Client::new();
    client
        .delete(format!("{}/api/user/5", served.base))
        .send()
        .await
        .unwrap();

    let snapshot: Value = client
        .get(format!("{}/__slicemock/state", served.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = snapshot["users"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["name"].as_str())
        .collect();
    assert!(!names.contains(&"Buddy"));
    assert_eq!(names.len(), 3);
}
