//! In-process model of the pizza storefront
//!
//! Renders each page as a [`PageView`] and issues every backend call through
//! the scenario's [`Gateway`], the same way the real single-page app calls its
//! API. The session token survives full page loads; everything else (cart,
//! open dialogs, form input) is reset by them.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use url::Url;

use slicemock_common::{Identity, MenuItem, Role};
use slicemock_gateway::{Fulfillment, Gateway, GatewayError, Method, MockResponse};

use crate::driver::{AppDriver, AriaRole, Control, PageView, Region, SelectOption};
use crate::error::{E2eError, E2eResult};

pub const TITLE: &str = "JWT Pizza";

/// Rows per page in the admin franchise and user tables
pub const ADMIN_PAGE_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Home,
    Login,
    Register,
    Logout,
    Menu,
    Payment,
    Delivery,
    DinerDashboard,
    AdminDashboard,
    FranchiseDashboard,
    CreateFranchise,
    CloseFranchise,
    CreateStore,
    CloseStore,
    About,
    History,
    Docs,
    NotFound,
}

impl Page {
    fn from_path(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "" => Page::Home,
            "/login" => Page::Login,
            "/register" => Page::Register,
            "/logout" => Page::Logout,
            "/menu" => Page::Menu,
            "/payment" => Page::Payment,
            "/delivery" => Page::Delivery,
            "/diner-dashboard" => Page::DinerDashboard,
            "/admin-dashboard" => Page::AdminDashboard,
            "/franchise-dashboard" => Page::FranchiseDashboard,
            "/create-franchise" => Page::CreateFranchise,
            "/close-franchise" => Page::CloseFranchise,
            "/create-store" => Page::CreateStore,
            "/close-store" => Page::CloseStore,
            "/about" => Page::About,
            "/history" => Page::History,
            "/docs" => Page::Docs,
            _ => Page::NotFound,
        }
    }
}

#[derive(Debug, Clone)]
enum Action {
    Go(String),
    Login,
    Register,
    AddPizza(MenuItem),
    Checkout,
    Pay,
    OpenEdit,
    CloseEdit,
    UpdateUser,
    FilterUsers,
    UserPage(usize),
    FranchisePage(usize),
    DeleteUser(String),
    AskClose(Closing),
    ConfirmClose,
    CreateFranchise,
    StartCreateStore(u64),
    CreateStore,
}

#[derive(Debug, Clone)]
enum Closing {
    Franchise { id: u64, name: String },
    Store { franchise_id: u64, store_id: u64, name: String },
}

#[derive(Debug, Clone)]
struct StoreChoice {
    franchise_id: u64,
    store_id: u64,
    name: String,
}

#[derive(Debug, Default)]
struct Cart {
    store: Option<StoreChoice>,
    items: Vec<MenuItem>,
}

impl Cart {
    fn total(&self) -> f64 {
        self.items.iter().map(|i| i.price).sum()
    }
}

/// Data fetched when a page is entered
#[derive(Debug, Default)]
struct Loaded {
    menu: Vec<MenuItem>,
    stores: Vec<StoreChoice>,
    orders: Vec<Value>,
    franchises: Vec<Value>,
    franchises_more: bool,
    users: Vec<Identity>,
    users_more: bool,
    detail: Option<Value>,
    endpoints: Vec<Value>,
}

/// One rendered frame: the observable view plus what each control does
#[derive(Default)]
struct Screen {
    region: Region,
    lines: BTreeMap<Region, Vec<String>>,
    controls: Vec<Control>,
    actions: HashMap<String, Action>,
}

impl Screen {
    fn line(&mut self, text: impl Into<String>) {
        self.lines.entry(self.region).or_default().push(text.into());
    }

    /// Add a control; its name joins the region text while visible
    fn add(&mut self, control: Control, action: Option<Action>) {
        if control.visible && control.role != AriaRole::Textbox && control.role != AriaRole::Combobox {
            self.line(control.name.clone());
        }
        if let Some(action) = action {
            self.actions.insert(control.key.clone(), action);
        }
        self.controls.push(control);
    }

    fn heading(&mut self, key: &str, text: &str) {
        self.add(Control::heading(key, text), None);
    }

    fn link(&mut self, key: &str, name: &str, path: &str) {
        self.add(Control::link(key, name), Some(Action::Go(path.to_string())));
    }

    fn button(&mut self, key: &str, name: &str, enabled: bool, action: Action) {
        self.add(Control::button(key, name).enabled(enabled), Some(action));
    }

    fn row(&mut self, key: &str, text: String) {
        self.add(Control::new(key, AriaRole::Row, text), None);
    }

    fn into_view(self, url: String, title: &str) -> (PageView, HashMap<String, Action>) {
        let regions = self
            .lines
            .into_iter()
            .map(|(region, lines)| (region, lines.join("\n")))
            .collect();
        let view = PageView {
            url,
            title: title.to_string(),
            regions,
            controls: self.controls,
        };
        (view, self.actions)
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn role_text(identity: &Identity) -> String {
    identity
        .roles
        .iter()
        .map(|r| match (r.role, &r.object_id) {
            (Role::Franchisee, Some(id)) => format!("Franchisee on {}", id),
            (role, _) => role.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn price(amount: f64) -> String {
    format!("{:.4} ₿", amount)
}

/// The storefront single-page app, run against a scenario's gateway
pub struct SimulatedStorefront {
    gateway: Gateway,
    origin: Url,
    location: Option<Url>,
    page: Page,
    token: Option<String>,
    user: Option<Identity>,
    cart: Cart,
    after_login: Option<String>,
    fields: HashMap<String, String>,
    loaded: Loaded,
    editing: bool,
    error: Option<String>,
    delivered: Option<(Value, String)>,
    user_filter: String,
    user_page: usize,
    franchise_page: usize,
    closing: Option<Closing>,
    return_to: String,
    store_for: Option<u64>,
}

impl SimulatedStorefront {
    /// Storefront served from the gateway's configured origin
    pub fn new(gateway: Gateway) -> E2eResult<Self> {
        let origin = gateway.config().base_url()?;
        Ok(Self {
            gateway,
            origin,
            location: None,
            page: Page::Blank,
            token: None,
            user: None,
            cart: Cart::default(),
            after_login: None,
            fields: HashMap::new(),
            loaded: Loaded::default(),
            editing: false,
            error: None,
            delivered: None,
            user_filter: String::new(),
            user_page: 0,
            franchise_page: 0,
            closing: None,
            return_to: "/".to_string(),
            store_for: None,
        })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Identity the app currently believes is logged in
    pub fn current_user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    fn is_admin(&self) -> bool {
        self.user.as_ref().map(|u| u.has_role(Role::Admin)).unwrap_or(false)
    }

    fn field(&self, key: &str) -> String {
        self.fields.get(key).cloned().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Backend calls
    // -----------------------------------------------------------------------

    fn api(&self, method: Method, path: &str, body: Option<Value>) -> Option<MockResponse> {
        match self.gateway.call(method, path, body) {
            Ok(Fulfillment::Respond(resp)) => Some(resp),
            Ok(Fulfillment::PassThrough) => {
                warn!("{} {} passed through, no backend behind the simulated storefront", method, path);
                None
            }
            // Recorded in the intercept log; the script runner reports it
            Err(GatewayError::UnhandledRoute { .. }) => None,
            Err(e) => {
                warn!("{} {} failed: {}", method, path, e);
                None
            }
        }
    }

    fn get_ok(&self, path: &str) -> Option<Value> {
        self.api(Method::Get, path, None)
            .filter(MockResponse::is_success)
            .map(|r| r.body)
    }

    /// Success body, or the failure message for display
    fn send(&self, method: Method, path: &str, body: Value) -> Result<Value, String> {
        match self.api(method, path, Some(body)) {
            Some(resp) if resp.is_success() => Ok(resp.body),
            Some(resp) => Err(resp
                .error_message()
                .unwrap_or_else(|| format!("request failed with {}", resp.status))),
            None => Err("network error".to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Full page load: in-memory app state is lost, the token is not
    fn load(&mut self, url: &str) -> E2eResult<()> {
        let target = self.origin.join(url).map_err(|e| E2eError::StepFailed {
            step: format!("navigate:{}", url),
            reason: e.to_string(),
        })?;
        self.cart = Cart::default();
        self.after_login = None;
        self.delivered = None;
        self.closing = None;
        self.store_for = None;
        self.restore_session();
        self.enter(target);
        Ok(())
    }

    fn restore_session(&mut self) {
        if self.token.is_none() {
            self.user = None;
            return;
        }
        let identity = self
            .get_ok("/api/user/me")
            .and_then(|v| serde_json::from_value::<Identity>(v).ok());
        match identity {
            Some(identity) => self.user = Some(identity),
            None => {
                self.token = None;
                self.user = None;
            }
        }
    }

    /// In-app navigation
    fn go(&mut self, path: &str) {
        match self.origin.join(path) {
            Ok(url) => self.enter(url),
            Err(e) => warn!("bad in-app path {}: {}", path, e),
        }
    }

    fn enter(&mut self, url: Url) {
        self.page = Page::from_path(url.path());
        debug!("storefront at {} ({:?})", url, self.page);
        self.location = Some(url);
        self.error = None;
        self.editing = false;
        self.fields.clear();
        self.loaded = Loaded::default();

        match self.page {
            Page::Logout => {
                self.api(Method::Delete, "/api/auth", None);
                self.token = None;
                self.user = None;
                self.go("/");
            }
            Page::Menu => self.load_menu(),
            Page::DinerDashboard => self.load_orders(),
            Page::AdminDashboard => {
                self.load_franchises();
                self.load_users();
            }
            Page::FranchiseDashboard => self.load_franchise_detail(),
            Page::Docs => self.load_docs(),
            _ => {}
        }
    }

    fn load_menu(&mut self) {
        self.loaded.menu = self
            .get_ok("/api/order/menu")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let franchises = self
            .get_ok("/api/franchise?page=0&limit=20&name=*")
            .and_then(|v| v.get("franchises").cloned())
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        self.loaded.stores = franchises
            .iter()
            .flat_map(|f| {
                let franchise_id = f["id"].as_u64().unwrap_or_default();
                f["stores"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |s| StoreChoice {
                        franchise_id,
                        store_id: s["id"].as_u64().unwrap_or_default(),
                        name: value_text(&s["name"]),
                    })
            })
            .collect();
    }

    fn load_orders(&mut self) {
        if self.user.is_none() {
            return;
        }
        // Some backends answer with a bare array
        self.loaded.orders = match self.get_ok("/api/order") {
            Some(Value::Array(orders)) => orders,
            Some(body) => body["orders"].as_array().cloned().unwrap_or_default(),
            None => Vec::new(),
        };
    }

    fn load_franchises(&mut self) {
        if !self.is_admin() {
            return;
        }
        let path = format!(
            "/api/franchise?page={}&limit={}&name=*",
            self.franchise_page, ADMIN_PAGE_SIZE
        );
        let body = self.get_ok(&path).unwrap_or(Value::Null);
        self.loaded.franchises = body["franchises"].as_array().cloned().unwrap_or_default();
        self.loaded.franchises_more = body["more"].as_bool().unwrap_or(false);
    }

    fn load_users(&mut self) {
        if !self.is_admin() {
            return;
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("page", &self.user_page.to_string())
            .append_pair("limit", &ADMIN_PAGE_SIZE.to_string())
            .append_pair("name", &format!("*{}*", self.user_filter))
            .finish();
        let body = self.get_ok(&format!("/api/user?{}", query)).unwrap_or(Value::Null);
        self.loaded.users = body["users"]
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .filter_map(|u| serde_json::from_value(u.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        self.loaded.users_more = body["more"].as_bool().unwrap_or(false);
    }

    fn load_franchise_detail(&mut self) {
        let Some(franchise_id) = self.user.as_ref().and_then(|u| u.franchise_ids().into_iter().next()) else {
            return;
        };
        self.loaded.detail = self
            .get_ok(&format!("/api/franchise/{}", franchise_id))
            .and_then(|v| v.as_array().and_then(|a| a.first().cloned()));
    }

    fn load_docs(&mut self) {
        self.loaded.endpoints = self
            .get_ok("/api/docs")
            .and_then(|v| v["endpoints"].as_array().cloned())
            .unwrap_or_default();
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn authenticated(&mut self, body: &Value) -> bool {
        match serde_json::from_value::<Identity>(body["user"].clone()) {
            Ok(identity) => {
                self.token = body["token"].as_str().map(str::to_string);
                self.user = Some(identity);
                true
            }
            Err(e) => {
                self.error = Some(format!("unexpected auth response: {}", e));
                false
            }
        }
    }

    fn perform(&mut self, action: Action) {
        debug!("storefront action {:?}", action);
        match action {
            Action::Go(path) => self.go(&path),
            Action::Login => {
                let body = json!({
                    "email": self.field("login-email"),
                    "password": self.field("login-password"),
                });
                match self.send(Method::Put, "/api/auth", body) {
                    Ok(body) => {
                        if self.authenticated(&body) {
                            let target = self.after_login.take().unwrap_or_else(|| "/".to_string());
                            self.go(&target);
                        }
                    }
                    Err(msg) => self.error = Some(msg),
                }
            }
            Action::Register => {
                let body = json!({
                    "name": self.field("register-name"),
                    "email": self.field("register-email"),
                    "password": self.field("register-password"),
                });
                match self.send(Method::Post, "/api/auth", body) {
                    Ok(body) => {
                        if self.authenticated(&body) {
                            self.go("/");
                        }
                    }
                    Err(msg) => self.error = Some(msg),
                }
            }
            Action::AddPizza(item) => self.cart.items.push(item),
            Action::Checkout => {
                if self.user.is_some() {
                    self.go("/payment");
                } else {
                    self.after_login = Some("/payment".to_string());
                    self.go("/login");
                }
            }
            Action::Pay => self.pay(),
            Action::OpenEdit => {
                if let Some(user) = &self.user {
                    let (name, email) = (user.name.clone(), user.email.clone());
                    self.fields.insert("edit-name".into(), name);
                    self.fields.insert("edit-email".into(), email);
                    self.fields.insert("edit-password".into(), String::new());
                    self.editing = true;
                    self.error = None;
                }
            }
            Action::CloseEdit => self.editing = false,
            Action::UpdateUser => self.update_user(),
            Action::FilterUsers => {
                self.user_filter = self.field("user-filter");
                self.user_page = 0;
                self.load_users();
            }
            Action::UserPage(page) => {
                self.user_page = page;
                self.load_users();
            }
            Action::FranchisePage(page) => {
                self.franchise_page = page;
                self.load_franchises();
            }
            Action::DeleteUser(id) => {
                if let Err(msg) = self.send(Method::Delete, &format!("/api/user/{}", id), Value::Null) {
                    self.error = Some(msg);
                }
                self.load_users();
                if self.loaded.users.is_empty() && self.user_page > 0 {
                    self.user_page -= 1;
                    self.load_users();
                }
            }
            Action::AskClose(closing) => {
                self.return_to = self
                    .location
                    .as_ref()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "/".to_string());
                let page = match closing {
                    Closing::Franchise { .. } => "/close-franchise",
                    Closing::Store { .. } => "/close-store",
                };
                self.closing = Some(closing);
                self.go(page);
            }
            Action::ConfirmClose => {
                let result = match self.closing.take() {
                    Some(Closing::Franchise { id, .. }) => {
                        self.send(Method::Delete, &format!("/api/franchise/{}", id), Value::Null)
                    }
                    Some(Closing::Store {
                        franchise_id, store_id, ..
                    }) => self.send(
                        Method::Delete,
                        &format!("/api/franchise/{}/store/{}", franchise_id, store_id),
                        Value::Null,
                    ),
                    None => Ok(Value::Null),
                };
                let target = self.return_to.clone();
                self.go(&target);
                if let Err(msg) = result {
                    self.error = Some(msg);
                }
            }
            Action::CreateFranchise => {
                let body = json!({
                    "name": self.field("create-franchise-name"),
                    "admins": [{ "email": self.field("create-franchise-email") }],
                });
                match self.send(Method::Post, "/api/franchise", body) {
                    Ok(_) => self.go("/admin-dashboard"),
                    Err(msg) => self.error = Some(msg),
                }
            }
            Action::StartCreateStore(franchise_id) => {
                self.store_for = Some(franchise_id);
                self.go("/create-store");
            }
            Action::CreateStore => {
                let Some(franchise_id) = self.store_for else {
                    self.error = Some("no franchise selected".to_string());
                    return;
                };
                let body = json!({ "name": self.field("create-store-name") });
                match self.send(Method::Post, &format!("/api/franchise/{}/store", franchise_id), body) {
                    Ok(_) => self.go("/franchise-dashboard"),
                    Err(msg) => self.error = Some(msg),
                }
            }
        }
    }

    fn pay(&mut self) {
        if self.user.is_none() {
            self.after_login = Some("/payment".to_string());
            self.go("/login");
            return;
        }
        let Some(store) = self.cart.store.clone() else {
            self.error = Some("pick a store first".to_string());
            return;
        };
        let items: Vec<Value> = self
            .cart
            .items
            .iter()
            .map(|i| json!({ "menuId": i.id, "description": i.title, "price": i.price }))
            .collect();
        let body = json!({
            "franchiseId": store.franchise_id,
            "storeId": store.store_id,
            "items": items,
        });
        match self.send(Method::Post, "/api/order", body) {
            Ok(body) => {
                let jwt = body["jwt"].as_str().unwrap_or_default().to_string();
                self.delivered = Some((body["order"].clone(), jwt));
                self.cart = Cart::default();
                self.go("/delivery");
            }
            Err(msg) => self.error = Some(msg),
        }
    }

    fn update_user(&mut self) {
        let Some(user) = self.user.clone() else {
            return;
        };
        let mut body = json!({
            "id": user.id,
            "name": self.field("edit-name"),
            "email": self.field("edit-email"),
        });
        let password = self.field("edit-password");
        if !password.is_empty() {
            body["password"] = Value::String(password);
        }
        match self.send(Method::Put, &format!("/api/user/{}", user.id), body) {
            Ok(body) => {
                if self.authenticated(&body) {
                    self.editing = false;
                }
            }
            Err(msg) => self.error = Some(msg),
        }
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn render(&self) -> (PageView, HashMap<String, Action>) {
        let mut s = Screen::default();
        let url = self
            .location
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| "about:blank".to_string());
        if self.page == Page::Blank {
            return s.into_view(url, "");
        }

        s.region = Region::Header;
        self.render_header(&mut s);

        s.region = Region::Main;
        s.controls.push(Control::new("main", AriaRole::Main, ""));
        match self.page {
            Page::Blank | Page::Logout => {}
            Page::Home => self.render_home(&mut s),
            Page::Login => self.render_login(&mut s),
            Page::Register => self.render_register(&mut s),
            Page::Menu => self.render_menu(&mut s),
            Page::Payment => self.render_payment(&mut s),
            Page::Delivery => self.render_delivery(&mut s),
            Page::DinerDashboard => self.render_diner_dashboard(&mut s),
            Page::AdminDashboard => self.render_admin_dashboard(&mut s),
            Page::FranchiseDashboard => self.render_franchise_dashboard(&mut s),
            Page::CreateFranchise => self.render_create_franchise(&mut s),
            Page::CloseFranchise | Page::CloseStore => self.render_close(&mut s),
            Page::CreateStore => self.render_create_store(&mut s),
            Page::About => {
                s.heading("about-title", "The secret sauce");
                s.line("At JWT Pizza, our amazing employees are the secret behind our delicious pizzas.");
            }
            Page::History => {
                s.heading("history-title", "Mama Rucci, my my");
                s.line("It all started in Mama Ricci's kitchen. She would delight all of the cousins with a hot pie in any style they could think of.");
            }
            Page::Docs => self.render_docs(&mut s),
            Page::NotFound => render_not_found(&mut s),
        }
        if let Some(error) = &self.error {
            if !self.editing {
                s.line(error.clone());
            }
        }
        s.into_view(url, TITLE)
    }

    fn render_header(&self, s: &mut Screen) {
        s.link("nav-home", "JWT Pizza", "/");
        s.link("nav-order", "Order", "/menu");
        s.link("nav-franchise", "Franchise", "/franchise-dashboard");
        s.link("nav-about", "About", "/about");
        s.link("nav-history", "History", "/history");
        if self.is_admin() {
            s.link("nav-admin", "Admin", "/admin-dashboard");
        }
        match &self.user {
            Some(user) => {
                s.link("nav-logout", "Logout", "/logout");
                s.link("nav-user", &user.initials(), "/diner-dashboard");
            }
            None => {
                s.link("nav-login", "Login", "/login");
                s.link("nav-register", "Register", "/register");
            }
        }
    }

    fn render_home(&self, s: &mut Screen) {
        s.heading("home-title", "The web's best pizza");
        s.button("home-order", "Order now", true, Action::Go("/menu".into()));
        s.line("Pizza is an absolute delight that brings joy to people of all ages.");
    }

    fn render_login(&self, s: &mut Screen) {
        s.heading("login-title", "Welcome back");
        s.add(Control::textbox("login-email", "Email address", &self.field("login-email")), None);
        s.add(Control::textbox("login-password", "Password", &self.field("login-password")), None);
        s.button("login-submit", "Login", true, Action::Login);
    }

    fn render_register(&self, s: &mut Screen) {
        s.heading("register-title", "Welcome to the party");
        s.add(Control::textbox("register-name", "Full name", &self.field("register-name")), None);
        s.add(Control::textbox("register-email", "Email address", &self.field("register-email")), None);
        s.add(Control::textbox("register-password", "Password", &self.field("register-password")), None);
        s.button("register-submit", "Register", true, Action::Register);
    }

    fn render_menu(&self, s: &mut Screen) {
        s.heading("menu-title", "Awesome is a click away");
        s.line("Pick your store and pizzas from below. Remember to order extra for a midnight party.");

        let mut options = vec![SelectOption {
            value: String::new(),
            label: "choose store".to_string(),
        }];
        options.extend(self.loaded.stores.iter().map(|st| SelectOption {
            value: st.store_id.to_string(),
            label: st.name.clone(),
        }));
        let selected = self
            .cart
            .store
            .as_ref()
            .map(|st| st.store_id.to_string())
            .unwrap_or_default();
        s.add(
            Control::new("menu-store", AriaRole::Combobox, "Store")
                .with_options(options)
                .with_value(selected),
            None,
        );

        for item in &self.loaded.menu {
            s.add(
                Control::link(format!("pizza-{}", item.id), format!("{} {}", item.title, item.description)),
                Some(Action::AddPizza(item.clone())),
            );
        }
        s.line(format!("Selected pizzas: {}", self.cart.items.len()));
        let ready = self.cart.store.is_some() && !self.cart.items.is_empty();
        s.button("menu-checkout", "Checkout", ready, Action::Checkout);
    }

    fn render_payment(&self, s: &mut Screen) {
        s.heading("payment-title", "So worth it");
        if self.cart.items.is_empty() {
            s.line("Your cart is empty.");
        } else {
            s.line(format!("Send me those {} pizzas right now!", self.cart.items.len()));
            if let Some(store) = &self.cart.store {
                s.line(format!("Store: {}", store.name));
            }
            for item in &self.cart.items {
                s.line(format!("{} {}", item.title, price(item.price)));
            }
            s.line(format!("total: {}", price(self.cart.total())));
        }
        s.button("payment-pay", "Pay now", !self.cart.items.is_empty(), Action::Pay);
        s.button("payment-cancel", "Cancel", true, Action::Go("/menu".into()));
    }

    fn render_delivery(&self, s: &mut Screen) {
        s.heading("delivery-title", "Here is your JWT Pizza!");
        match &self.delivered {
            Some((order, jwt)) => {
                let items = order["items"].as_array().cloned().unwrap_or_default();
                let total: f64 = items.iter().filter_map(|i| i["price"].as_f64()).sum();
                s.line(format!("order ID: {}", value_text(&order["id"])));
                s.line(format!("pie count: {}", items.len()));
                s.line(format!("total: {}", price(total)));
                s.line(format!("jwt: {}", jwt));
            }
            None => s.line("order ID: -"),
        }
        s.button("delivery-more", "Order more", true, Action::Go("/menu".into()));
    }

    fn render_diner_dashboard(&self, s: &mut Screen) {
        let Some(user) = &self.user else {
            render_not_found(s);
            return;
        };
        s.heading("dash-title", "Your pizza kitchen");
        s.line(format!("name: {}", user.name));
        s.line(format!("email: {}", user.email));
        s.line(format!("role: {}", role_text(user)));
        s.button("dash-edit", "Edit", true, Action::OpenEdit);

        if self.loaded.orders.is_empty() {
            s.line("How have you lived this long without having a pizza?");
            s.link("dash-buy", "Buy one", "/menu");
        } else {
            s.line("Here is your history of all the good times.");
            for (i, order) in self.loaded.orders.iter().enumerate() {
                let total: f64 = order["items"]
                    .as_array()
                    .map(|items| items.iter().filter_map(|it| it["price"].as_f64()).sum())
                    .unwrap_or_default();
                s.row(
                    &format!("order-{}", i),
                    format!("{} {} {}", value_text(&order["id"]), price(total), value_text(&order["date"])),
                );
            }
        }

        // The edit dialog stays attached and is hidden while closed
        let open = self.editing;
        s.region = Region::Dialog;
        s.add(Control::new("edit-dialog", AriaRole::Dialog, "Edit user").visible(open), None);
        s.add(Control::heading("edit-title", "Edit user").visible(open), None);
        s.add(Control::textbox("edit-name", "Name", &self.field("edit-name")).visible(open), None);
        s.add(Control::textbox("edit-email", "Email", &self.field("edit-email")).visible(open), None);
        s.add(Control::textbox("edit-password", "Password", &self.field("edit-password")).visible(open), None);
        s.add(Control::button("edit-update", "Update").visible(open), Some(Action::UpdateUser));
        s.add(Control::button("edit-cancel", "Cancel").visible(open), Some(Action::CloseEdit));
        if open {
            if let Some(error) = &self.error {
                s.line(error.clone());
            }
        }
        s.region = Region::Main;
    }

    fn render_admin_dashboard(&self, s: &mut Screen) {
        if !self.is_admin() {
            render_not_found(s);
            return;
        }
        s.heading("admin-title", "Mama Ricci's kitchen");
        s.line("Keep the dough rolling and the franchises signing up.");

        s.heading("admin-franchises", "Franchises");
        for franchise in &self.loaded.franchises {
            let id = franchise["id"].as_u64().unwrap_or_default();
            let name = value_text(&franchise["name"]);
            let admins: Vec<String> = franchise["admins"]
                .as_array()
                .map(|a| a.iter().map(|x| value_text(x.get("name").unwrap_or(&x["email"]))).collect())
                .unwrap_or_default();
            s.row(&format!("franchise-{}", id), format!("{} {}", name, admins.join(", ")));
            s.button(
                &format!("close-franchise-{}", id),
                &format!("Close {}", name),
                true,
                Action::AskClose(Closing::Franchise { id, name: name.clone() }),
            );
            for store in franchise["stores"].as_array().cloned().unwrap_or_default() {
                let store_id = store["id"].as_u64().unwrap_or_default();
                let store_name = value_text(&store["name"]);
                s.row(&format!("store-{}-{}", id, store_id), format!("{} / {}", name, store_name));
                s.button(
                    &format!("close-store-{}-{}", id, store_id),
                    &format!("Close {}", store_name),
                    true,
                    Action::AskClose(Closing::Store {
                        franchise_id: id,
                        store_id,
                        name: store_name.clone(),
                    }),
                );
            }
        }
        s.button(
            "franchise-prev",
            "Previous franchises",
            self.franchise_page > 0,
            Action::FranchisePage(self.franchise_page.saturating_sub(1)),
        );
        s.button(
            "franchise-next",
            "Next franchises",
            self.loaded.franchises_more,
            Action::FranchisePage(self.franchise_page + 1),
        );
        s.button("add-franchise", "Add Franchise", true, Action::Go("/create-franchise".into()));

        s.heading("admin-users", "Users");
        s.add(Control::textbox("user-filter", "Filter users", &self.field("user-filter")), None);
        s.button("user-filter-submit", "Submit", true, Action::FilterUsers);
        for user in &self.loaded.users {
            s.row(
                &format!("user-{}", user.id),
                format!("{} {} {}", user.name, user.email, role_text(user)),
            );
            s.button(
                &format!("delete-user-{}", user.id),
                &format!("Delete {}", user.name),
                true,
                Action::DeleteUser(user.id.clone()),
            );
        }
        s.button(
            "user-prev",
            "Previous page",
            self.user_page > 0,
            Action::UserPage(self.user_page.saturating_sub(1)),
        );
        s.button("user-next", "Next page", self.loaded.users_more, Action::UserPage(self.user_page + 1));
    }

    fn render_franchise_dashboard(&self, s: &mut Screen) {
        let Some(detail) = &self.loaded.detail else {
            s.heading("franchise-title", "So you want a piece of the pie?");
            s.line("If you are already a franchisee, please login using your franchise account");
            s.line("Call now 800-555-5555");
            return;
        };
        let franchise_id = detail["id"].as_u64().unwrap_or_default();
        s.heading("franchise-title", &value_text(&detail["name"]));
        s.line("Everything you need to run an JWT Pizza franchise. Your gold is in the stores.");
        for store in detail["stores"].as_array().cloned().unwrap_or_default() {
            let store_id = store["id"].as_u64().unwrap_or_default();
            let name = value_text(&store["name"]);
            let revenue = store["totalRevenue"].as_f64().unwrap_or_default();
            s.row(&format!("store-{}", store_id), format!("{} {} ₿", name, revenue));
            s.button(
                &format!("close-store-{}", store_id),
                &format!("Close {}", name),
                true,
                Action::AskClose(Closing::Store {
                    franchise_id,
                    store_id,
                    name: name.clone(),
                }),
            );
        }
        s.button("create-store", "Create store", true, Action::StartCreateStore(franchise_id));
    }

    fn render_create_franchise(&self, s: &mut Screen) {
        s.heading("create-franchise-title", "Create franchise");
        s.add(
            Control::textbox("create-franchise-name", "franchise name", &self.field("create-franchise-name")),
            None,
        );
        s.add(
            Control::textbox(
                "create-franchise-email",
                "franchisee admin email",
                &self.field("create-franchise-email"),
            ),
            None,
        );
        s.button("create-franchise-submit", "Create", true, Action::CreateFranchise);
        s.button("create-franchise-cancel", "Cancel", true, Action::Go("/admin-dashboard".into()));
    }

    fn render_create_store(&self, s: &mut Screen) {
        s.heading("create-store-title", "Create store");
        s.add(Control::textbox("create-store-name", "store name", &self.field("create-store-name")), None);
        s.button("create-store-submit", "Create", true, Action::CreateStore);
        s.button("create-store-cancel", "Cancel", true, Action::Go("/franchise-dashboard".into()));
    }

    fn render_close(&self, s: &mut Screen) {
        s.heading("close-title", "Sorry to see you go");
        match &self.closing {
            Some(Closing::Franchise { name, .. }) => s.line(format!(
                "Are you sure you want to close the {} franchise? This will close all associated stores and cannot be restored.",
                name
            )),
            Some(Closing::Store { name, .. }) => s.line(format!(
                "Are you sure you want to close the {} store? This cannot be restored.",
                name
            )),
            None => s.line("Nothing selected to close."),
        }
        s.button("close-confirm", "Close", self.closing.is_some(), Action::ConfirmClose);
        s.button("close-cancel", "Cancel", true, Action::Go(self.return_to.clone()));
    }

    fn render_docs(&self, s: &mut Screen) {
        s.heading("docs-title", "JWT Pizza API");
        for endpoint in &self.loaded.endpoints {
            s.line(format!(
                "[{}] {}",
                value_text(&endpoint["method"]),
                value_text(&endpoint["path"])
            ));
            s.line(value_text(&endpoint["description"]));
        }
    }
}

fn render_not_found(s: &mut Screen) {
    s.heading("notfound-title", "Oops");
    s.line("It looks like we have dropped a pizza on the floor. Please try another page.");
}

#[async_trait]
impl AppDriver for SimulatedStorefront {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.load(url)
    }

    async fn click(&mut self, control: &Control) -> E2eResult<()> {
        let (view, mut actions) = self.render();
        let current = view.control(&control.key).filter(|c| c.visible && c.enabled);
        let action = match (current, actions.remove(&control.key)) {
            (Some(_), Some(action)) => action,
            (None, _) => {
                return Err(E2eError::StepFailed {
                    step: format!("click:{} \"{}\"", control.role, control.name),
                    reason: "control is hidden or disabled".to_string(),
                })
            }
            (Some(_), None) => {
                return Err(E2eError::StepFailed {
                    step: format!("click:{} \"{}\"", control.role, control.name),
                    reason: "control does nothing when clicked".to_string(),
                })
            }
        };
        self.perform(action);
        Ok(())
    }

    async fn fill(&mut self, control: &Control, value: &str) -> E2eResult<()> {
        let (view, _) = self.render();
        match view.control(&control.key) {
            Some(c) if c.role.is_editable() && c.visible => {
                self.fields.insert(control.key.clone(), value.to_string());
                Ok(())
            }
            _ => Err(E2eError::StepFailed {
                step: format!("fill:{} \"{}\"", control.role, control.name),
                reason: "not an editable visible field".to_string(),
            }),
        }
    }

    async fn select(&mut self, control: &Control, value: &str) -> E2eResult<()> {
        let (view, _) = self.render();
        let option = view
            .control(&control.key)
            .filter(|c| c.role == AriaRole::Combobox)
            .and_then(|c| c.options.iter().find(|o| o.value == value || o.label == value))
            .cloned()
            .ok_or_else(|| E2eError::StepFailed {
                step: format!("select:{} \"{}\"", control.role, control.name),
                reason: format!("no option {:?}", value),
            })?;
        self.cart.store = self
            .loaded
            .stores
            .iter()
            .find(|st| st.store_id.to_string() == option.value)
            .cloned();
        Ok(())
    }

    async fn snapshot(&mut self) -> E2eResult<PageView> {
        Ok(self.render().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use slicemock_common::Seed;
    use slicemock_gateway::GatewayConfig;

    fn storefront() -> SimulatedStorefront {
        let gateway = Gateway::storefront(GatewayConfig::default(), Seed::storefront()).unwrap();
        SimulatedStorefront::new(gateway).unwrap()
    }

    async fn click(app: &mut SimulatedStorefront, locator: Locator) {
        let view = app.snapshot().await.unwrap();
        let control = locator.resolve(&view).unwrap().unwrap().clone();
        app.click(&control).await.unwrap();
    }

    async fn fill(app: &mut SimulatedStorefront, locator: Locator, value: &str) {
        let view = app.snapshot().await.unwrap();
        let control = locator.resolve(&view).unwrap().unwrap().clone();
        app.fill(&control, value).await.unwrap();
    }

    async fn login(app: &mut SimulatedStorefront, email: &str, password: &str) {
        click(app, Locator::role_named(AriaRole::Link, "Login")).await;
        fill(app, Locator::placeholder("Email address"), email).await;
        fill(app, Locator::placeholder("Password"), password).await;
        click(app, Locator::role_named(AriaRole::Button, "Login")).await;
    }

    #[tokio::test]
    async fn test_blank_until_navigated() {
        let mut app = storefront();
        let view = app.snapshot().await.unwrap();
        assert_eq!(view.url, "about:blank");
        assert!(view.controls.is_empty());

        app.navigate("/").await.unwrap();
        let view = app.snapshot().await.unwrap();
        assert_eq!(view.title, TITLE);
        assert_eq!(view.url, "http://localhost:5173/");
    }

    #[tokio::test]
    async fn test_login_shows_initials() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        login(&mut app, "d@jwt.com", "a").await;

        let view = app.snapshot().await.unwrap();
        assert!(Locator::role_named(AriaRole::Link, "KC").resolve(&view).unwrap().is_some());
        assert!(view.url.ends_with('/'));
        assert!(app.gateway().state().is_authenticated());
    }

    #[tokio::test]
    async fn test_bad_login_stays_on_form() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        login(&mut app, "d@jwt.com", "wrong").await;

        let view = app.snapshot().await.unwrap();
        assert!(view.url.ends_with("/login"));
        assert!(view.text(Region::Main).contains("Unauthorized"));
        assert!(Locator::role_named(AriaRole::Button, "Login").resolve(&view).unwrap().is_some());
        assert!(app.current_user().is_none());
    }

    #[tokio::test]
    async fn test_session_survives_reload() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        login(&mut app, "d@jwt.com", "a").await;
        app.navigate("/diner-dashboard").await.unwrap();

        let view = app.snapshot().await.unwrap();
        assert!(view.text(Region::Main).contains("name: Kai Chen"));
        let me_calls = app
            .gateway()
            .count_intercepts(|r| r.url.ends_with("/api/user/me"));
        assert_eq!(me_calls, 1);
    }

    #[tokio::test]
    async fn test_order_checkout_requires_login() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        click(&mut app, Locator::role_named(AriaRole::Button, "Order now")).await;

        let view = app.snapshot().await.unwrap();
        let checkout = Locator::role_named(AriaRole::Button, "Checkout");
        assert!(!checkout.resolve(&view).unwrap().unwrap().enabled);

        let combo = Locator::role(AriaRole::Combobox).resolve(&view).unwrap().unwrap().clone();
        app.select(&combo, "4").await.unwrap();
        click(&mut app, Locator::role(AriaRole::Link).has_text("Veggie|Pepperoni").nth(0)).await;
        click(&mut app, Locator::role(AriaRole::Link).has_text("Veggie|Pepperoni").nth(1)).await;
        click(&mut app, checkout).await;

        let view = app.snapshot().await.unwrap();
        assert!(view.url.ends_with("/login"));

        fill(&mut app, Locator::placeholder("Email address"), "d@jwt.com").await;
        fill(&mut app, Locator::placeholder("Password"), "a").await;
        click(&mut app, Locator::role_named(AriaRole::Button, "Login")).await;

        let view = app.snapshot().await.unwrap();
        assert!(view.url.ends_with("/payment"));
        assert!(view.text(Region::Main).contains("Send me those 2 pizzas right now!"));

        click(&mut app, Locator::role_named(AriaRole::Button, "Pay now")).await;
        let view = app.snapshot().await.unwrap();
        assert!(view.url.ends_with("/delivery"));
        assert!(view.text(Region::Main).contains("pie count: 2"));
        assert!(view.text(Region::Main).contains("jwt: eyJpYXQ"));
    }

    #[tokio::test]
    async fn test_edit_dialog_hides_after_update() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        login(&mut app, "d@jwt.com", "a").await;
        click(&mut app, Locator::role_named(AriaRole::Link, "KC")).await;
        click(&mut app, Locator::role_named(AriaRole::Button, "Edit")).await;

        let view = app.snapshot().await.unwrap();
        assert!(view.text(Region::Dialog).contains("Edit user"));

        fill(&mut app, Locator::role(AriaRole::Textbox).nth(0), "Kai Chen X").await;
        click(&mut app, Locator::role_named(AriaRole::Button, "Update")).await;

        let view = app.snapshot().await.unwrap();
        assert!(Locator::role(AriaRole::Dialog).visible_in(&view).is_empty());
        assert!(view.text(Region::Main).contains("name: Kai Chen X"));
        assert_eq!(view.text(Region::Dialog), "");
    }

    #[tokio::test]
    async fn test_admin_user_pages() {
        let mut app = storefront();
        app.navigate("/").await.unwrap();
        login(&mut app, "admin@test.com", "a").await;
        app.navigate("/admin-dashboard").await.unwrap();

        let view = app.snapshot().await.unwrap();
        assert!(view.text(Region::Main).contains("Mama Ricci's kitchen"));
        assert!(view.text(Region::Main).contains("Kai Chen"));
        assert!(!view.text(Region::Main).contains("Buddy"));

        click(&mut app, Locator::role_named(AriaRole::Button, "Next page")).await;
        let view = app.snapshot().await.unwrap();
        assert!(view.text(Region::Main).contains("Buddy"));
        assert!(!view.text(Region::Main).contains("Kai Chen"));
    }

    #[tokio::test]
    async fn test_disabled_button_rejects_click() {
        let mut app = storefront();
        app.navigate("/menu").await.unwrap();
        let view = app.snapshot().await.unwrap();
        let checkout = Locator::role_named(AriaRole::Button, "Checkout")
            .resolve(&view)
            .unwrap()
            .unwrap()
            .clone();
        assert!(matches!(app.click(&checkout).await, Err(E2eError::StepFailed { .. })));
    }

    #[tokio::test]
    async fn test_unknown_path_renders_not_found() {
        let mut app = storefront();
        app.navigate("/invalid-route-xyz").await.unwrap();
        let view = app.snapshot().await.unwrap();
        assert_eq!(view.title, TITLE);
        assert!(view.text(Region::Main).contains("Oops"));
        assert!(view.url.ends_with("/invalid-route-xyz"));
    }
}
