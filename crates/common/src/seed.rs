//! Seed fixtures a scenario's state store starts from

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{
    Franchise, FranchiseAdmin, MenuItem, Order, Role, RoleAssignment, Store, UserRecord,
};

/// Initial records for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<UserRecord>,

    #[serde(default)]
    pub menu: Vec<MenuItem>,

    #[serde(default)]
    pub franchises: Vec<Franchise>,

    #[serde(default)]
    pub orders: Vec<Order>,

    /// Timestamp stamped on placed orders, fixed so payloads stay deterministic
    #[serde(default = "default_clock")]
    pub clock: DateTime<Utc>,
}

fn default_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

impl Default for Seed {
    fn default() -> Self {
        Self::storefront()
    }
}

impl Seed {
    /// No records at all
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            menu: Vec::new(),
            franchises: Vec::new(),
            orders: Vec::new(),
            clock: default_clock(),
        }
    }

    /// The pizza storefront fixture set
    pub fn storefront() -> Self {
        Self {
            users: vec![
                UserRecord::new("1", "Admin", "admin@test.com", "a", vec![RoleAssignment::new(Role::Admin)]),
                UserRecord::new("3", "Kai Chen", "d@jwt.com", "a", vec![RoleAssignment::new(Role::Diner)]),
                UserRecord::new(
                    "4",
                    "pizza franchisee",
                    "f@jwt.com",
                    "franchisee",
                    vec![RoleAssignment::new(Role::Diner), RoleAssignment::franchisee("2")],
                ),
                UserRecord::new("5", "Buddy", "buddy@jwt.com", "a", vec![RoleAssignment::new(Role::Diner)]),
            ],
            menu: vec![
                MenuItem::new(1, "Veggie", "pizza1.png", 0.0038, "Garden"),
                MenuItem::new(2, "Pepperoni", "pizza2.png", 0.0042, "Spicy"),
                MenuItem::new(3, "Margarita", "pizza3.png", 0.0014, "Classic"),
                MenuItem::new(4, "Crusty", "pizza4.png", 0.0024, "Dry"),
            ],
            franchises: vec![
                Franchise::new(2, "LotaPizza")
                    .with_admin(FranchiseAdmin {
                        id: Some("4".to_string()),
                        name: Some("pizza franchisee".to_string()),
                        email: "f@jwt.com".to_string(),
                    })
                    .with_store(Store::new(4, "Lehi").with_revenue(1000.0))
                    .with_store(Store::new(5, "Springville").with_revenue(1500.0)),
                Franchise::new(3, "PizzaCorp").with_store(Store::new(7, "Spanish Fork").with_revenue(200.0)),
            ],
            orders: Vec::new(),
            clock: default_clock(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let seed: Self = serde_yaml::from_str(yaml)?;
        seed.validate()?;
        Ok(seed)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded seed from {}", path.display());
        Self::from_yaml(&content)
    }

    /// Reject duplicate user ids or emails and duplicate franchise ids
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut emails = HashSet::new();
        for user in &self.users {
            if !ids.insert(user.identity.id.as_str()) {
                return Err(Error::InvalidSeed(format!("duplicate user id {}", user.identity.id)));
            }
            if !emails.insert(user.identity.email.as_str()) {
                return Err(Error::InvalidSeed(format!("duplicate user email {}", user.identity.email)));
            }
        }

        let mut franchise_ids = HashSet::new();
        for franchise in &self.franchises {
            if !franchise_ids.insert(franchise.id) {
                return Err(Error::InvalidSeed(format!("duplicate franchise id {}", franchise.id)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_seed_is_valid() {
        let seed = Seed::storefront();
        seed.validate().unwrap();
        assert_eq!(seed.menu.len(), 4);
        assert!(seed.users.iter().any(|u| u.identity.email == "d@jwt.com"));
    }

    #[test]
    fn test_parse_seed_yaml() {
        let yaml = r#"
users:
  - id: "42"
    name: pizza diner
    email: diner@jwt.com
    password: diner
    roles:
      - role: diner
franchises:
  - id: 1
    name: Franchise1
    stores:
      - id: 1
        name: Store1
"#;
        let seed = Seed::from_yaml(yaml).unwrap();
        assert_eq!(seed.users[0].identity.name, "pizza diner");
        assert_eq!(seed.users[0].password.as_deref(), Some("diner"));
        assert_eq!(seed.franchises[0].stores[0].total_revenue, 0.0);
        assert!(seed.menu.is_empty());
        assert_eq!(seed.clock, default_clock());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let mut seed = Seed::storefront();
        let mut dup = seed.users[1].clone();
        dup.identity.id = "99".into();
        seed.users.push(dup);
        assert!(matches!(seed.validate(), Err(Error::InvalidSeed(_))));
    }
}
