//! Scenario state store
//!
//! One store per scenario. Clones share the same underlying records, so a
//! handler that renames a user is observed by every later handler reading
//! through any clone. Nothing here outlives the scenario that created it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use slicemock_common::{
    EntityCollection, Error, Franchise, FranchiseAdmin, Identity, MenuItem, NameFilter, Order,
    OrderRequest, Page, PageRequest, Result, Role, RoleAssignment, Seed, Store, UserRecord,
};

/// Authentication lifecycle of a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "identity", rename_all = "snake_case")]
pub enum AuthState {
    Anonymous,
    Authenticated(Identity),
}

/// Fields a profile update may change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Serializable copy of the whole store, for debugging endpoints and reports
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub auth: AuthState,
    pub users: Vec<Identity>,
    pub orders: Vec<Order>,
    pub franchises: Vec<Franchise>,
}

struct StateInner {
    identity: Option<Identity>,
    users: EntityCollection<UserRecord>,
    menu: Vec<MenuItem>,
    orders: EntityCollection<Order>,
    franchises: EntityCollection<Franchise>,
    clock: String,
}

/// Shared handle to one scenario's mutable state
#[derive(Clone)]
pub struct ScenarioState {
    inner: Arc<RwLock<StateInner>>,
}

impl Default for ScenarioState {
    fn default() -> Self {
        Self::new(Seed::default())
    }
}

impl ScenarioState {
    /// Fresh store; starts Anonymous
    pub fn new(seed: Seed) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StateInner {
                identity: None,
                users: seed.users.into(),
                menu: seed.menu,
                orders: seed.orders.into(),
                franchises: seed.franchises.into(),
                clock: seed.clock.to_rfc3339(),
            })),
        }
    }

    /// True when both handles point at the same store
    pub fn same_store(&self, other: &ScenarioState) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    pub fn identity(&self) -> Option<Identity> {
        self.inner.read().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().identity.is_some()
    }

    pub fn auth_state(&self) -> AuthState {
        match self.identity() {
            Some(identity) => AuthState::Authenticated(identity),
            None => AuthState::Anonymous,
        }
    }

    pub fn set_identity(&self, identity: Identity) {
        debug!("identity -> {} ({})", identity.email, identity.id);
        self.inner.write().identity = Some(identity);
    }

    pub fn clear_identity(&self) {
        self.inner.write().identity = None;
    }

    /// Anonymous -> Authenticated on matching credentials; no change otherwise
    pub fn login(&self, email: &str, password: &str) -> Option<Identity> {
        let mut inner = self.inner.write();
        let user = inner
            .users
            .find(|u| u.identity.email == email && u.check_password(password))?
            .identity();
        inner.identity = Some(user.clone());
        info!("login: {} ({})", user.email, user.id);
        Some(user)
    }

    /// Create a diner account and authenticate as it
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<Identity> {
        let mut inner = self.inner.write();
        if inner.users.find(|u| u.identity.email == email).is_some() {
            return Err(Error::AlreadyExists {
                kind: "user".to_string(),
                id: email.to_string(),
            });
        }
        let id = inner.users.next_id().to_string();
        let record = UserRecord::new(&id, name, email, password, vec![RoleAssignment::new(Role::Diner)]);
        let identity = record.identity();
        inner.users.push(record);
        inner.identity = Some(identity.clone());
        info!("register: {} ({})", identity.email, identity.id);
        Ok(identity)
    }

    /// Authenticated -> Anonymous
    pub fn logout(&self) -> Option<Identity> {
        self.inner.write().identity.take()
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        self.inner.read().users.get(id).cloned()
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.inner.read().users.to_vec()
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        self.inner
            .read()
            .users
            .find(|u| u.identity.email == email)
            .cloned()
    }

    pub fn insert_user(&self, user: UserRecord) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.users.contains(&user.identity.id) {
            return Err(Error::AlreadyExists {
                kind: "user".to_string(),
                id: user.identity.id.clone(),
            });
        }
        inner.users.push(user);
        Ok(())
    }

    /// Apply a profile update; the current identity follows if it is the same user
    pub fn update_user(&self, id: &str, update: UserUpdate) -> Result<Identity> {
        let mut inner = self.inner.write();
        if let Some(email) = &update.email {
            if inner
                .users
                .find(|u| &u.identity.email == email && u.identity.id != id)
                .is_some()
            {
                return Err(Error::AlreadyExists {
                    kind: "user".to_string(),
                    id: email.clone(),
                });
            }
        }
        let updated = inner
            .users
            .update(id, |user| {
                if let Some(name) = update.name.clone() {
                    user.identity.name = name;
                }
                if let Some(email) = update.email.clone() {
                    user.identity.email = email;
                }
                if let Some(password) = update.password.clone().filter(|p| !p.is_empty()) {
                    user.password = Some(password);
                }
            })
            .ok_or_else(|| Error::not_found("user", id))?
            .identity();

        if inner.identity.as_ref().map(|i| i.id.as_str()) == Some(id) {
            inner.identity = Some(updated.clone());
        }
        debug!("updated user {}: {} <{}>", id, updated.name, updated.email);
        Ok(updated)
    }

    /// Remove exactly one user; deleting the current identity also logs out
    pub fn delete_user(&self, id: &str) -> Result<UserRecord> {
        let mut inner = self.inner.write();
        let removed = inner
            .users
            .remove(id)
            .ok_or_else(|| Error::not_found("user", id))?;
        if inner.identity.as_ref().map(|i| i.id.as_str()) == Some(id) {
            inner.identity = None;
        }
        debug!("deleted user {}", id);
        Ok(removed)
    }

    pub fn list_users(&self, filter: &NameFilter, page: PageRequest) -> Page<Identity> {
        let page = self.inner.read().users.page(filter, page);
        Page {
            items: page.items.iter().map(UserRecord::identity).collect(),
            more: page.more,
        }
    }

    // ------------------------------------------------------------------
    // Menu and orders
    // ------------------------------------------------------------------

    pub fn menu(&self) -> Vec<MenuItem> {
        self.inner.read().menu.clone()
    }

    pub fn orders_for(&self, diner_id: &str, page: PageRequest) -> Page<Order> {
        let inner = self.inner.read();
        let mine: EntityCollection<Order> = inner
            .orders
            .iter()
            .filter(|o| o.diner_id.as_deref() == Some(diner_id))
            .cloned()
            .collect::<Vec<_>>()
            .into();
        mine.page(&NameFilter::any(), page)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.read().orders.to_vec()
    }

    /// Append an order with a synthesized id for the current identity
    pub fn place_order(&self, request: OrderRequest) -> Result<Order> {
        let mut inner = self.inner.write();
        let diner_id = inner
            .identity
            .as_ref()
            .map(|i| i.id.clone())
            .ok_or_else(|| Error::not_found("identity", "current"))?;
        let order = Order {
            id: inner.orders.next_id(),
            diner_id: Some(diner_id),
            franchise_id: request.franchise_id,
            store_id: request.store_id,
            items: request.items,
            date: inner.clock.clone(),
        };
        inner.orders.push(order.clone());
        info!("placed order {} ({} items)", order.id, order.items.len());
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Franchises and stores
    // ------------------------------------------------------------------

    pub fn franchises(&self) -> Vec<Franchise> {
        self.inner.read().franchises.to_vec()
    }

    pub fn franchise(&self, id: &str) -> Option<Franchise> {
        self.inner.read().franchises.get(id).cloned()
    }

    pub fn list_franchises(&self, filter: &NameFilter, page: PageRequest) -> Page<Franchise> {
        self.inner.read().franchises.page(filter, page)
    }

    /// Create a franchise; each admin email must belong to a known user, who
    /// gains the franchisee role scoped to the new franchise
    pub fn create_franchise(&self, name: &str, admin_emails: &[String]) -> Result<Franchise> {
        let mut inner = self.inner.write();
        if inner.franchises.find(|f| f.name == name).is_some() {
            return Err(Error::AlreadyExists {
                kind: "franchise".to_string(),
                id: name.to_string(),
            });
        }

        // Resolve every admin before touching any record
        let admin_ids = admin_emails
            .iter()
            .map(|email| {
                inner
                    .users
                    .find(|u| &u.identity.email == email)
                    .map(|u| u.identity.id.clone())
                    .ok_or_else(|| Error::not_found("user", email))
            })
            .collect::<Result<Vec<String>>>()?;

        let id = inner.franchises.next_id();
        let mut franchise = Franchise::new(id, name);
        for user_id in &admin_ids {
            let admin = inner
                .users
                .update(user_id, |u| {
                    u.identity.roles.push(RoleAssignment::franchisee(id.to_string()));
                })
                .ok_or_else(|| Error::not_found("user", user_id))?;
            franchise.admins.push(FranchiseAdmin {
                id: Some(admin.identity.id.clone()),
                name: Some(admin.identity.name.clone()),
                email: admin.identity.email.clone(),
            });
        }

        inner.franchises.push(franchise.clone());
        info!("created franchise {} ({})", franchise.name, franchise.id);
        Ok(franchise)
    }

    pub fn delete_franchise(&self, id: &str) -> Result<Franchise> {
        self.inner
            .write()
            .franchises
            .remove(id)
            .ok_or_else(|| Error::not_found("franchise", id))
    }

    /// Add a store; store ids are unique across all franchises
    pub fn create_store(&self, franchise_id: &str, name: &str) -> Result<Store> {
        let mut inner = self.inner.write();
        let next = inner
            .franchises
            .iter()
            .flat_map(|f| f.stores.iter().map(|s| s.id))
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);
        let store = Store::new(next, name);
        let created = store.clone();
        inner
            .franchises
            .update(franchise_id, move |f| f.stores.push(store))
            .ok_or_else(|| Error::not_found("franchise", franchise_id))?;
        Ok(created)
    }

    pub fn delete_store(&self, franchise_id: &str, store_id: &str) -> Result<Store> {
        let mut inner = self.inner.write();
        let franchise = inner
            .franchises
            .get(franchise_id)
            .ok_or_else(|| Error::not_found("franchise", franchise_id))?;
        let store = franchise
            .stores
            .iter()
            .find(|s| s.id.to_string() == store_id)
            .cloned()
            .ok_or_else(|| Error::not_found("store", store_id))?;
        inner
            .franchises
            .update(franchise_id, |f| f.stores.retain(|s| s.id != store.id));
        Ok(store)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read();
        StateSnapshot {
            auth: match &inner.identity {
                Some(identity) => AuthState::Authenticated(identity.clone()),
                None => AuthState::Anonymous,
            },
            users: inner.users.iter().map(UserRecord::identity).collect(),
            orders: inner.orders.to_vec(),
            franchises: inner.franchises.to_vec(),
        }
    }
}

impl std::fmt::Debug for ScenarioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ScenarioState")
            .field("identity", &inner.identity.as_ref().map(|i| &i.email))
            .field("users", &inner.users.len())
            .field("orders", &inner.orders.len())
            .field("franchises", &inner.franchises.len())
            .finish()
    }
}
