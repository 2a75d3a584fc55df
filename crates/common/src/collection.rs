//! Ordered entity collections
//!
//! Records keep insertion order. Mutations touch exactly the record named by
//! id and nothing else; listing supports the storefront's `*name*` filter
//! convention and zero-based pagination with a `more` flag.

use serde::{Deserialize, Serialize};

/// A record addressable by a string id
pub trait Record {
    fn record_id(&self) -> String;

    /// Name used by list filters
    fn record_name(&self) -> &str;
}

/// Case-insensitive substring filter over record names.
///
/// Accepts the storefront wildcard form (`*Kai*`); the asterisks are
/// stripped and an empty remainder matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    needle: String,
}

impl NameFilter {
    pub fn parse(raw: &str) -> Self {
        Self {
            needle: raw.trim().trim_matches('*').to_lowercase(),
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.needle.is_empty() || name.to_lowercase().contains(&self.needle)
    }

    pub fn is_any(&self) -> bool {
        self.needle.is_empty()
    }
}

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    /// A limit of zero is raised to one
    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit: limit.max(1) }
    }

    fn limit(&self) -> usize {
        self.limit.max(1)
    }

    fn offset(&self) -> usize {
        self.page.saturating_mul(self.limit())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, limit: 10 }
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Records remain past this page
    pub more: bool,
}

/// Ordered, mutable sequence of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityCollection<T> {
    records: Vec<T>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<T: Record + Clone> EntityCollection<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.records.clone()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|r| r.record_id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn find<P>(&self, predicate: P) -> Option<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.records.iter().find(|r| predicate(r))
    }

    /// Next synthesized id: one past the largest numeric id present
    pub fn next_id(&self) -> u64 {
        self.records
            .iter()
            .filter_map(|r| r.record_id().parse::<u64>().ok())
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
    }

    pub fn push(&mut self, record: T) {
        self.records.push(record);
    }

    /// Remove the record with `id`, leaving every other record in place
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.records.iter().position(|r| r.record_id() == id)?;
        Some(self.records.remove(index))
    }

    /// Apply `f` to the record with `id` and return the updated copy
    pub fn update<F>(&mut self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let record = self.records.iter_mut().find(|r| r.record_id() == id)?;
        f(record);
        Some(record.clone())
    }

    pub fn filter(&self, filter: &NameFilter) -> Vec<T> {
        self.records
            .iter()
            .filter(|r| filter.matches(r.record_name()))
            .cloned()
            .collect()
    }

    /// Filter, then slice out one page
    pub fn page(&self, filter: &NameFilter, request: PageRequest) -> Page<T> {
        let matching: Vec<&T> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.record_name()))
            .collect();

        let offset = request.offset();
        let items: Vec<T> = matching
            .iter()
            .skip(offset)
            .take(request.limit())
            .map(|r| (*r).clone())
            .collect();
        let more = matching.len() > offset.saturating_add(request.limit());

        Page { items, more }
    }
}

impl<T> From<Vec<T>> for EntityCollection<T> {
    fn from(records: Vec<T>) -> Self {
        Self { records }
    }
}
