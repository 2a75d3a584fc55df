//! Core types for the storefront data model
//!
//! Field names follow the storefront wire format (`menuId`, `totalRevenue`,
//! `objectId`) so records serialize straight into mock response bodies.

use serde::{Deserialize, Serialize};

use crate::collection::Record;

/// Role tag carried by an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Diner,
    Admin,
    Franchisee,
}

impl Default for Role {
    fn default() -> Self {
        Self::Diner
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Diner => write!(f, "diner"),
            Role::Admin => write!(f, "admin"),
            Role::Franchisee => write!(f, "franchisee"),
        }
    }
}

/// One entry of an identity's role set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: Role,
    /// Franchise the role is scoped to (franchisee only)
    #[serde(default, rename = "objectId", skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RoleAssignment {
    pub fn new(role: Role) -> Self {
        Self { role, object_id: None }
    }

    pub fn franchisee(franchise_id: impl Into<String>) -> Self {
        Self {
            role: Role::Franchisee,
            object_id: Some(franchise_id.into()),
        }
    }
}

/// The simulated authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }

    /// Franchise ids this identity administers
    pub fn franchise_ids(&self) -> Vec<String> {
        self.roles
            .iter()
            .filter(|r| r.role == Role::Franchisee)
            .filter_map(|r| r.object_id.clone())
            .collect()
    }

    /// First letter of each word of the display name ("Kai Chen" -> "KC")
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect()
    }
}

/// A stored user: the identity plus the credential the mock checks at login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserRecord {
    pub fn new(id: &str, name: &str, email: &str, password: &str, roles: Vec<RoleAssignment>) -> Self {
        Self {
            identity: Identity {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                roles,
            },
            password: Some(password.to_string()),
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity.clone()
    }

    /// Unknown emails and mismatched credentials both fail
    pub fn check_password(&self, password: &str) -> bool {
        self.password.as_deref() == Some(password)
    }
}

impl Record for UserRecord {
    fn record_id(&self) -> String {
        self.identity.id.clone()
    }

    fn record_name(&self) -> &str {
        &self.identity.name
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u64,
    pub title: String,
    pub image: String,
    pub price: f64,
    pub description: String,
}

impl MenuItem {
    pub fn new(id: u64, title: &str, image: &str, price: f64, description: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            image: image.to_string(),
            price,
            description: description.to_string(),
        }
    }
}

impl Record for MenuItem {
    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn record_name(&self) -> &str {
        &self.title
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub menu_id: u64,
    pub description: String,
    pub price: f64,
}

/// Body of `POST /api/order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub franchise_id: u64,
    pub store_id: u64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diner_id: Option<String>,
    pub franchise_id: u64,
    pub store_id: u64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub date: String,
}

impl Order {
    pub fn total(&self) -> f64 {
        self.items.iter().map(|i| i.price).sum()
    }
}

impl Record for Order {
    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn record_name(&self) -> &str {
        ""
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub total_revenue: f64,
}

impl Store {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            total_revenue: 0.0,
        }
    }

    pub fn with_revenue(mut self, total_revenue: f64) -> Self {
        self.total_revenue = total_revenue;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FranchiseAdmin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Franchise {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub admins: Vec<FranchiseAdmin>,
    #[serde(default)]
    pub stores: Vec<Store>,
}

impl Franchise {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            admins: Vec::new(),
            stores: Vec::new(),
        }
    }

    pub fn with_admin(mut self, admin: FranchiseAdmin) -> Self {
        self.admins.push(admin);
        self
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.stores.push(store);
        self
    }

    pub fn total_revenue(&self) -> f64 {
        self.stores.iter().map(|s| s.total_revenue).sum()
    }
}

impl Record for Franchise {
    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn record_name(&self) -> &str {
        &self.name
    }
}
