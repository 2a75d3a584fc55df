//! HTTP front for the gateway
//!
//! Every request outside `/__slicemock` is treated as an intercepted storefront
//! call and dispatched through the route table. A browser driver can forward
//! its intercepted traffic here and fulfill with whatever comes back.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{Fulfillment, Gateway};
use crate::wire::{InterceptedRequest, Method};

/// Header set on responses for requests that should reach the real network
pub const FULFILLMENT_HEADER: &str = "x-slicemock-fulfillment";
pub const PASS_THROUGH: &str = "pass-through";

pub const HEALTH_PATH: &str = "/__slicemock/health";
pub const REQUESTS_PATH: &str = "/__slicemock/requests";
pub const STATE_PATH: &str = "/__slicemock/state";

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(REQUESTS_PATH, get(requests_handler))
        .route(STATE_PATH, get(state_handler))
        .fallback(intercept_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

/// Bind `addr` and serve until the process exits
pub async fn serve(addr: SocketAddr, gateway: Gateway) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!("Mock gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(gateway)).await?;
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_until<F>(listener: TcpListener, gateway: Gateway, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true, "version": slicemock_common::VERSION }))
}

async fn requests_handler(State(gateway): State<Gateway>) -> impl IntoResponse {
    Json(gateway.intercepts())
}

async fn state_handler(State(gateway): State<Gateway>) -> impl IntoResponse {
    Json(gateway.state().snapshot())
}

async fn intercept_handler(
    State(gateway): State<Gateway>,
    method: axum::http::Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let method: Method = match method.as_str().parse() {
        Ok(m) => m,
        Err(e) => {
            return (StatusCode::METHOD_NOT_ALLOWED, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    };

    let request = match build_request(&gateway, method, &uri, &body) {
        Ok(r) => r,
        Err(e) => {
            warn!("rejecting {} {}: {}", method, uri, e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    match gateway.dispatch(&request) {
        Ok(Fulfillment::Respond(resp)) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(resp.body)).into_response()
        }
        Ok(Fulfillment::PassThrough) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            response
                .headers_mut()
                .insert(FULFILLMENT_HEADER, HeaderValue::from_static(PASS_THROUGH));
            response
        }
        Err(GatewayError::UnhandledRoute { method, url }) => (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({ "error": "unhandled route", "method": method, "url": url })),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn build_request(gateway: &Gateway, method: Method, uri: &Uri, body: &[u8]) -> GatewayResult<InterceptedRequest> {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut request = InterceptedRequest::new(method, target, &gateway.config().base_url()?)?;
    if !body.is_empty() {
        let value: Value = serde_json::from_slice(body).map_err(|e| GatewayError::Body(e.to_string()))?;
        request.body = Some(value);
    }
    Ok(request)
}
