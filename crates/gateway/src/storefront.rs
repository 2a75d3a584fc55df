//! Default handler set for the pizza storefront API
//!
//! Registration order matters: `/api/user/me` is registered after the
//! `/api/user/{id}` rule so that it wins for `me`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use slicemock_common::{Error, Franchise, NameFilter, OrderRequest, PageRequest};

use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::handler::Call;
use crate::matcher::{MethodFilter, RouteId, RoutePattern};
use crate::state::UserUpdate;
use crate::synth::{auth_payload, Outcome};
use crate::wire::Method;

const DEFAULT_USER_LIMIT: usize = 10;
const DEFAULT_FRANCHISE_LIMIT: usize = 10;
const DEFAULT_ORDER_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminRef {
    email: String,
}

#[derive(Debug, Deserialize)]
struct CreateFranchiseRequest {
    name: String,
    #[serde(default)]
    admins: Vec<AdminRef>,
}

#[derive(Debug, Deserialize)]
struct CreateStoreRequest {
    name: String,
}

/// Install the storefront rules, returning their ids in registration order
pub fn install(gateway: &Gateway) -> GatewayResult<Vec<RouteId>> {
    let ids = vec![
        gateway.register("auth", MethodFilter::Any, RoutePattern::glob("*/**/api/auth"), auth)?,
        gateway.register("user-list", Method::Get, RoutePattern::regex(r"/api/user(\?.*)?$"), list_users)?,
        gateway.register(
            "user-by-id",
            MethodFilter::Any,
            RoutePattern::regex(r"/api/user/(?P<id>[^/?]+)(\?.*)?$"),
            user_by_id,
        )?,
        gateway.register("user-me", Method::Get, RoutePattern::glob("*/**/api/user/me"), me)?,
        gateway.register("menu", Method::Get, RoutePattern::glob("*/**/api/order/menu"), menu)?,
        gateway.register("orders", MethodFilter::Any, RoutePattern::regex(r"/api/order(\?.*)?$"), orders)?,
        gateway.register(
            "franchise-list",
            MethodFilter::Any,
            RoutePattern::regex(r"/api/franchise(\?.*)?$"),
            franchises,
        )?,
        gateway.register(
            "franchise-by-id",
            MethodFilter::Any,
            RoutePattern::regex(r"/api/franchise/(?P<id>\d+)(\?.*)?$"),
            franchise_by_id,
        )?,
        gateway.register(
            "stores",
            MethodFilter::Any,
            RoutePattern::regex(r"/api/franchise/(?P<id>\d+)/store(/(?P<store>\d+))?$"),
            stores,
        )?,
        gateway.register("docs", Method::Get, RoutePattern::glob("*/**/api/docs"), docs)?,
    ];
    debug!("installed {} storefront routes", ids.len());
    Ok(ids)
}

fn method_not_allowed(call: &Call<'_>) -> Outcome {
    Outcome::Status {
        status: 405,
        body: json!({ "message": format!("{} not supported", call.request.method) }),
    }
}

fn common_error(err: Error) -> Outcome {
    match err {
        Error::NotFound { kind, id } => Outcome::NotFound(format!("unknown {} {}", kind, id)),
        Error::AlreadyExists { kind, id } => Outcome::Conflict(format!("{} {} already exists", kind, id)),
        other => Outcome::BadRequest(other.to_string()),
    }
}

fn body_or_default<T: for<'de> Deserialize<'de> + Default>(call: &Call<'_>) -> T {
    call.request.json().unwrap_or_default()
}

fn page_request(call: &Call<'_>, default_limit: usize) -> PageRequest {
    PageRequest::new(
        call.request.query_usize("page", 0),
        call.request.query_usize("limit", default_limit),
    )
}

fn name_filter(call: &Call<'_>) -> NameFilter {
    NameFilter::parse(&call.request.query_param("name").unwrap_or_default())
}

// ---------------------------------------------------------------------------
// /api/auth
// ---------------------------------------------------------------------------

fn auth(call: &Call<'_>) -> Outcome {
    match call.request.method {
        Method::Put => login(call),
        Method::Post => register(call),
        Method::Delete => {
            call.state.logout();
            Outcome::message("Logged out")
        }
        _ => method_not_allowed(call),
    }
}

fn login(call: &Call<'_>) -> Outcome {
    let req: LoginRequest = body_or_default(call);
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Outcome::Unauthorized("Unauthorized".to_string());
    };
    match call.state.login(&email, &password) {
        Some(identity) => auth_payload(&identity, &call.config.token),
        None => Outcome::Unauthorized("Unauthorized".to_string()),
    }
}

fn register(call: &Call<'_>) -> Outcome {
    let req: RegisterRequest = body_or_default(call);
    let (Some(name), Some(email), Some(password)) = (req.name, req.email, req.password) else {
        return Outcome::BadRequest("name, email, and password are required".to_string());
    };
    match call.state.register(&name, &email, &password) {
        Ok(identity) => auth_payload(&identity, &call.config.token),
        Err(e) => common_error(e),
    }
}

// ---------------------------------------------------------------------------
// /api/user
// ---------------------------------------------------------------------------

fn me(call: &Call<'_>) -> Outcome {
    match call.state.identity() {
        Some(identity) => Outcome::json(&identity),
        None => Outcome::Unauthorized("Not authenticated".to_string()),
    }
}

fn list_users(call: &Call<'_>) -> Outcome {
    let page = call
        .state
        .list_users(&name_filter(call), page_request(call, DEFAULT_USER_LIMIT));
    Outcome::Json(json!({ "users": page.items, "more": page.more }))
}

fn user_by_id(call: &Call<'_>) -> Outcome {
    let id = call.param("id");
    match call.request.method {
        Method::Put => {
            let update: UserUpdate = body_or_default(call);
            match call.state.update_user(id, update) {
                Ok(identity) => auth_payload(&identity, &call.config.token),
                Err(e) => common_error(e),
            }
        }
        Method::Delete => match call.state.delete_user(id) {
            Ok(_) => Outcome::message("user deleted"),
            Err(e) => common_error(e),
        },
        _ => Outcome::Fallthrough,
    }
}

// ---------------------------------------------------------------------------
// /api/order
// ---------------------------------------------------------------------------

fn menu(call: &Call<'_>) -> Outcome {
    Outcome::json(&call.state.menu())
}

fn orders(call: &Call<'_>) -> Outcome {
    let Some(identity) = call.state.identity() else {
        return Outcome::Unauthorized("Not authenticated".to_string());
    };

    match call.request.method {
        Method::Get => {
            let request = page_request(call, DEFAULT_ORDER_LIMIT);
            let page = call.state.orders_for(&identity.id, request);
            Outcome::Json(json!({
                "dinerId": identity.id,
                "orders": page.items,
                "page": request.page,
                "more": page.more,
            }))
        }
        Method::Post => {
            let request: OrderRequest = match call.request.json() {
                Ok(r) => r,
                Err(e) => return Outcome::BadRequest(e.to_string()),
            };
            match call.state.place_order(request) {
                Ok(order) => Outcome::Json(json!({
                    "order": order,
                    "jwt": call.config.order_jwt,
                })),
                Err(e) => common_error(e),
            }
        }
        _ => method_not_allowed(call),
    }
}

// ---------------------------------------------------------------------------
// /api/franchise
// ---------------------------------------------------------------------------

/// Listing shape: stores without revenue
fn franchise_summary(franchise: &Franchise) -> Value {
    json!({
        "id": franchise.id,
        "name": franchise.name,
        "admins": franchise.admins,
        "stores": franchise
            .stores
            .iter()
            .map(|s| json!({ "id": s.id, "name": s.name }))
            .collect::<Vec<_>>(),
    })
}

fn franchises(call: &Call<'_>) -> Outcome {
    match call.request.method {
        Method::Get => {
            let page = call
                .state
                .list_franchises(&name_filter(call), page_request(call, DEFAULT_FRANCHISE_LIMIT));
            let items: Vec<Value> = page.items.iter().map(franchise_summary).collect();
            Outcome::Json(json!({ "franchises": items, "more": page.more }))
        }
        Method::Post => {
            let req: CreateFranchiseRequest = match call.request.json() {
                Ok(r) => r,
                Err(e) => return Outcome::BadRequest(e.to_string()),
            };
            let emails: Vec<String> = req.admins.into_iter().map(|a| a.email).collect();
            match call.state.create_franchise(&req.name, &emails) {
                Ok(franchise) => Outcome::json(&franchise),
                Err(e) => common_error(e),
            }
        }
        _ => method_not_allowed(call),
    }
}

/// Store-level revenue detail, answered as a one-element list
fn franchise_by_id(call: &Call<'_>) -> Outcome {
    let id = call.param("id");
    match call.request.method {
        Method::Get => match call.state.franchise(id) {
            Some(franchise) => Outcome::json(&vec![franchise]),
            None => Outcome::NotFound(format!("unknown franchise {}", id)),
        },
        Method::Delete => match call.state.delete_franchise(id) {
            Ok(_) => Outcome::message("franchise deleted"),
            Err(e) => common_error(e),
        },
        _ => method_not_allowed(call),
    }
}

fn stores(call: &Call<'_>) -> Outcome {
    let franchise_id = call.param("id");
    match (call.request.method, call.params.get("store")) {
        (Method::Post, None) => {
            let req: CreateStoreRequest = match call.request.json() {
                Ok(r) => r,
                Err(e) => return Outcome::BadRequest(e.to_string()),
            };
            match call.state.create_store(franchise_id, &req.name) {
                Ok(store) => Outcome::json(&store),
                Err(e) => common_error(e),
            }
        }
        (Method::Delete, Some(store_id)) => match call.state.delete_store(franchise_id, store_id) {
            Ok(_) => Outcome::message("store deleted"),
            Err(e) => common_error(e),
        },
        _ => method_not_allowed(call),
    }
}

// ---------------------------------------------------------------------------
// /api/docs
// ---------------------------------------------------------------------------

fn docs(_call: &Call<'_>) -> Outcome {
    let endpoints = [
        ("PUT", "/api/auth", "Login"),
        ("POST", "/api/auth", "Register"),
        ("DELETE", "/api/auth", "Logout"),
        ("GET", "/api/user/me", "Current identity"),
        ("GET", "/api/user?page=0&limit=10&name=*", "List users"),
        ("PUT", "/api/user/:userId", "Update user"),
        ("DELETE", "/api/user/:userId", "Delete user"),
        ("GET", "/api/order/menu", "Menu"),
        ("GET", "/api/order", "Orders for the current identity"),
        ("POST", "/api/order", "Place an order"),
        ("GET", "/api/franchise?page=0&limit=10&name=*", "List franchises"),
        ("POST", "/api/franchise", "Create franchise"),
        ("GET", "/api/franchise/:franchiseId", "Franchise revenue detail"),
        ("DELETE", "/api/franchise/:franchiseId", "Close franchise"),
        ("POST", "/api/franchise/:franchiseId/store", "Create store"),
        ("DELETE", "/api/franchise/:franchiseId/store/:storeId", "Close store"),
    ];
    Outcome::Json(json!({
        "version": slicemock_common::VERSION,
        "endpoints": endpoints
            .iter()
            .map(|(method, path, description)| json!({
                "method": method,
                "path": path,
                "description": description,
            }))
            .collect::<Vec<_>>(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::error::GatewayError;
    use crate::gateway::Fulfillment;
    use crate::wire::MockResponse;
    use slicemock_common::Seed;

    fn gateway() -> Gateway {
        Gateway::storefront(GatewayConfig::default(), Seed::storefront()).unwrap()
    }

    fn respond(gateway: &Gateway, method: Method, url: &str, body: Option<Value>) -> MockResponse {
        match gateway.call(method, url, body).unwrap() {
            Fulfillment::Respond(resp) => resp,
            Fulfillment::PassThrough => panic!("{} {} passed through", method, url),
        }
    }

    #[test]
    fn test_login_then_me_round_trip() {
        let gw = gateway();
        let login = respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "d@jwt.com", "password": "a" })));
        assert_eq!(login.status, 200);
        assert_eq!(login.body["token"], "abcdef");

        let me = respond(&gw, Method::Get, "/api/user/me", None);
        assert_eq!(me.status, 200);
        assert_eq!(me.body, login.body["user"]);
    }

    #[test]
    fn test_bad_credentials_stay_anonymous() {
        let gw = gateway();
        let login = respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "d@jwt.com", "password": "nope" })));
        assert_eq!(login.status, 401);
        assert_eq!(login.body, json!({ "error": "Unauthorized" }));

        let unknown = respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "x@jwt.com", "password": "a" })));
        assert_eq!(unknown.status, 401);

        let me = respond(&gw, Method::Get, "/api/user/me", None);
        assert_eq!(me.status, 401);
        assert!(!gw.state().is_authenticated());
    }

    #[test]
    fn test_register_and_logout() {
        let gw = gateway();
        let reg = respond(
            &gw,
            Method::Post,
            "/api/auth",
            Some(json!({ "name": "John", "email": "john@test.com", "password": "pass" })),
        );
        assert_eq!(reg.status, 200);
        assert_eq!(reg.body["user"]["roles"][0]["role"], "diner");

        let out = respond(&gw, Method::Delete, "/api/auth", None);
        assert_eq!(out.body["message"], "Logged out");
        assert_eq!(respond(&gw, Method::Get, "/api/user/me", None).status, 401);
    }

    #[test]
    fn test_update_persists_after_relogin() {
        let gw = gateway();
        respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "d@jwt.com", "password": "a" })));
        let upd = respond(
            &gw,
            Method::Put,
            "/api/user/3",
            Some(json!({ "name": "Kai Chen X", "email": "kx@jwt.com" })),
        );
        assert_eq!(upd.body["user"]["name"], "Kai Chen X");

        respond(&gw, Method::Delete, "/api/auth", None);
        respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "kx@jwt.com", "password": "a" })));
        let me = respond(&gw, Method::Get, "/api/user/me", None);
        assert_eq!(me.body["name"], "Kai Chen X");
        assert_eq!(me.body["email"], "kx@jwt.com");
        assert_eq!(me.body["id"], "3");
    }

    #[test]
    fn test_update_to_taken_email_conflicts() {
        let gw = gateway();
        respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "d@jwt.com", "password": "a" })));
        let upd = respond(&gw, Method::Put, "/api/user/3", Some(json!({ "email": "buddy@jwt.com" })));
        assert_eq!(upd.status, 409);

        let me = respond(&gw, Method::Get, "/api/user/me", None);
        assert_eq!(me.body["email"], "d@jwt.com");
    }

    #[test]
    fn test_me_not_shadowed_by_user_id_rule() {
        let gw = gateway();
        let me = respond(&gw, Method::Get, "/api/user/me", None);
        assert_eq!(me.status, 401);
        let log = gw.intercepts();
        assert_eq!(log[0].rule.as_deref(), Some("user-me"));
    }

    #[test]
    fn test_delete_user_removes_exactly_one() {
        let gw = gateway();
        let resp = respond(&gw, Method::Delete, "/api/user/3", None);
        assert_eq!(resp.status, 200);

        let list = respond(&gw, Method::Get, "/api/user?page=0&limit=10&name=*", None);
        let names: Vec<&str> = list.body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Admin", "pizza franchisee", "Buddy"]);

        assert_eq!(respond(&gw, Method::Delete, "/api/user/3", None).status, 404);
    }

    #[test]
    fn test_user_filter_case_insensitive() {
        let gw = gateway();
        let list = respond(&gw, Method::Get, "/api/user?name=*kai*", None);
        assert_eq!(list.body["users"].as_array().unwrap().len(), 1);
        assert_eq!(list.body["users"][0]["name"], "Kai Chen");
        assert_eq!(list.body["more"], false);
    }

    #[test]
    fn test_user_pagination() {
        let gw = gateway();
        let first = respond(&gw, Method::Get, "/api/user?page=0&limit=3", None);
        assert_eq!(first.body["more"], true);
        let second = respond(&gw, Method::Get, "/api/user?page=1&limit=3", None);
        assert_eq!(second.body["more"], false);
        assert_eq!(second.body["users"].as_array().unwrap().len(), 1);
        assert_eq!(second.body["users"][0]["name"], "Buddy");
    }

    #[test]
    fn test_menu_catalog() {
        let gw = gateway();
        let menu = respond(&gw, Method::Get, "/api/order/menu", None);
        assert_eq!(menu.body.as_array().unwrap().len(), 4);
        assert_eq!(menu.body[0]["title"], "Veggie");
        assert_eq!(gw.intercepts()[0].rule.as_deref(), Some("menu"));
    }

    #[test]
    fn test_orders_require_identity() {
        let gw = gateway();
        assert_eq!(respond(&gw, Method::Get, "/api/order", None).status, 401);

        respond(&gw, Method::Put, "/api/auth", Some(json!({ "email": "d@jwt.com", "password": "a" })));
        let placed = respond(
            &gw,
            Method::Post,
            "/api/order",
            Some(json!({
                "franchiseId": 2,
                "storeId": 4,
                "items": [{ "menuId": 1, "description": "Veggie", "price": 0.0038 }],
            })),
        );
        assert_eq!(placed.status, 200);
        assert_eq!(placed.body["jwt"], "eyJpYXQ");
        assert_eq!(placed.body["order"]["id"], 1);

        let listed = respond(&gw, Method::Get, "/api/order", None);
        assert_eq!(listed.body["dinerId"], "3");
        assert_eq!(listed.body["orders"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_franchise_listing_and_detail() {
        let gw = gateway();
        let list = respond(&gw, Method::Get, "/api/franchise?page=0&limit=10&name=*", None);
        assert_eq!(list.body["franchises"][0]["name"], "LotaPizza");
        assert!(list.body["franchises"][0]["stores"][0].get("totalRevenue").is_none());

        let bare = respond(&gw, Method::Get, "/api/franchise", None);
        assert_eq!(bare.body["franchises"].as_array().unwrap().len(), 2);

        let detail = respond(&gw, Method::Get, "/api/franchise/2", None);
        assert_eq!(detail.body[0]["stores"][1]["totalRevenue"], 1500.0);

        let missing = respond(&gw, Method::Get, "/api/franchise/99", None);
        assert_eq!(missing.status, 404);
        assert_eq!(missing.error_message().as_deref(), Some("unknown franchise 99"));
    }

    #[test]
    fn test_franchise_and_store_mutations() {
        let gw = gateway();
        let created = respond(
            &gw,
            Method::Post,
            "/api/franchise",
            Some(json!({ "name": "SliceWorks", "admins": [{ "email": "buddy@jwt.com" }] })),
        );
        assert_eq!(created.body["admins"][0]["name"], "Buddy");
        let id = created.body["id"].as_u64().unwrap();

        let store = respond(&gw, Method::Post, &format!("/api/franchise/{}/store", id), Some(json!({ "name": "Provo" })));
        let store_id = store.body["id"].as_u64().unwrap();

        let closed = respond(&gw, Method::Delete, &format!("/api/franchise/{}/store/{}", id, store_id), None);
        assert_eq!(closed.body["message"], "store deleted");

        let gone = respond(&gw, Method::Delete, &format!("/api/franchise/{}", id), None);
        assert_eq!(gone.body["message"], "franchise deleted");
        assert!(gw.state().franchise(&id.to_string()).is_none());
    }

    #[test]
    fn test_unknown_endpoint_is_unhandled() {
        let gw = gateway();
        let err = gw.call(Method::Get, "/api/unknown", None).unwrap_err();
        assert!(matches!(err, GatewayError::UnhandledRoute { .. }));
    }
}
