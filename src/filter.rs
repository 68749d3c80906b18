//! Filter state for the listing view.
//!
//! The selection is resolved once from the current location, then the
//! persisted snapshot, then defaults (field by field). Every mutation writes
//! the new selection back to the location and the snapshot and publishes it
//! on a watch channel for the post feed.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

use crate::query::{self, QueryParams, QueryValue};
use crate::storage::{KeyValueStore, Location};
use crate::taxonomy::{self, DomainCode, RoleCategory, RoleCode};

pub const SNAPSHOT_KEY: &str = "filterState";

const ROLES_KEY: &str = "positionTypes";
const DOMAINS_KEY: &str = "domains";
const ACTIVE_KEY: &str = "isActive";
const ORDER_KEY: &str = "order";
const PAGE_KEY: &str = "page";

const OWNED_KEYS: [&str; 5] = [ROLES_KEY, DOMAINS_KEY, ACTIVE_KEY, ORDER_KEY, PAGE_KEY];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActiveOnly {
    #[default]
    Unset,
    True,
}

impl ActiveOnly {
    fn from_query(raw: &str) -> Self {
        if raw == "true" { ActiveOnly::True } else { ActiveOnly::Unset }
    }

    pub fn as_filter(self) -> Option<bool> {
        match self {
            ActiveOnly::Unset => None,
            ActiveOnly::True => Some(true),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActiveOnly::Unset => "Any status",
            ActiveOnly::True => "Open only",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Recent,
    DeadlineSoon,
}

impl SortOrder {
    /// Wire value of the `order` parameter.
    pub fn code(self) -> u32 {
        match self {
            SortOrder::Recent => 0,
            SortOrder::DeadlineSoon => 1,
        }
    }

    fn from_code(code: i64) -> Self {
        if code == 1 { SortOrder::DeadlineSoon } else { SortOrder::Recent }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Recent => "Most recent",
            SortOrder::DeadlineSoon => "Deadline soon",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSelection {
    pub roles: Vec<RoleCode>,
    pub domains: Vec<DomainCode>,
    pub active_only: ActiveOnly,
    pub sort_order: SortOrder,
    pub page: u32,
}

impl FilterSelection {
    pub fn roles_changed(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn domains_changed(&self) -> bool {
        !self.domains.is_empty()
    }

    pub fn status_changed(&self) -> bool {
        self.active_only != ActiveOnly::Unset
    }

    pub fn sort_changed(&self) -> bool {
        self.sort_order != SortOrder::Recent
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, QueryValue)> {
        vec![
            (ROLES_KEY, QueryValue::List(self.roles.iter().map(|r| r.to_string()).collect())),
            (DOMAINS_KEY, QueryValue::List(self.domains.iter().map(|d| d.to_string()).collect())),
            (ACTIVE_KEY, self.active_only.as_filter().into()),
            (ORDER_KEY, self.sort_order.code().into()),
            (PAGE_KEY, self.page.into()),
        ]
    }

    pub fn to_query(&self) -> String {
        query::encode(&self.query_pairs())
    }

    #[cfg(test)]
    pub fn from_query(raw: &str) -> Self {
        Self::resolve(Partial::from_params(&query::decode(raw)), Partial::default())
    }

    fn resolve(primary: Partial, fallback: Partial) -> Self {
        Self {
            roles: primary.roles.or(fallback.roles).unwrap_or_default(),
            domains: primary.domains.or(fallback.domains).unwrap_or_default(),
            active_only: primary.active_only.or(fallback.active_only).unwrap_or_default(),
            sort_order: primary.sort_order.or(fallback.sort_order).unwrap_or_default(),
            page: primary.page.or(fallback.page).unwrap_or(0),
        }
    }

    fn snapshot(&self) -> Value {
        json!({
            ROLES_KEY: self.roles,
            DOMAINS_KEY: self.domains,
            ACTIVE_KEY: self.active_only.as_filter(),
            ORDER_KEY: self.sort_order.code(),
        })
    }
}

/// Fields found in one source; `None` means the source is silent about it.
#[derive(Debug, Default)]
struct Partial {
    roles: Option<Vec<RoleCode>>,
    domains: Option<Vec<DomainCode>>,
    active_only: Option<ActiveOnly>,
    sort_order: Option<SortOrder>,
    page: Option<u32>,
}

impl Partial {
    fn from_params(params: &QueryParams) -> Self {
        let roles = params.get_all(ROLES_KEY);
        let domains = params.get_all(DOMAINS_KEY);
        Self {
            roles: (!roles.is_empty()).then(|| dedup(roles.into_iter().map(RoleCode::new))),
            domains: (!domains.is_empty()).then(|| dedup(domains.into_iter().map(DomainCode::new))),
            active_only: params.get(ACTIVE_KEY).map(ActiveOnly::from_query),
            sort_order: params
                .get(ORDER_KEY)
                .map(|raw| SortOrder::from_code(raw.trim().parse().unwrap_or(0))),
            page: params.get(PAGE_KEY).map(|raw| raw.trim().parse().unwrap_or(0)),
        }
    }

    fn from_snapshot(raw: &str) -> Self {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) | Err(_) => {
                tracing::warn!("ignoring malformed filter snapshot");
                return Self::default();
            }
        };
        let present = |key: &str| value.get(key).filter(|v| !v.is_null());

        Self {
            roles: present(ROLES_KEY)
                .and_then(Value::as_array)
                .map(|items| dedup(items.iter().filter_map(Value::as_str).map(RoleCode::new))),
            domains: present(DOMAINS_KEY)
                .and_then(Value::as_array)
                .map(|items| dedup(items.iter().filter_map(Value::as_str).map(DomainCode::new))),
            active_only: present(ACTIVE_KEY).map(|v| {
                if v.as_bool() == Some(true) { ActiveOnly::True } else { ActiveOnly::Unset }
            }),
            sort_order: present(ORDER_KEY).map(|v| SortOrder::from_code(v.as_i64().unwrap_or(0))),
            page: present(PAGE_KEY)
                .map(|v| v.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0)),
        }
    }
}

fn dedup<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn toggle<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if let Some(pos) = items.iter().position(|x| *x == item) {
        items.remove(pos);
    } else {
        items.push(item);
    }
}

/// Removes every member of `group` if all are present, otherwise appends the
/// missing ones in group order.
fn toggle_group<T: PartialEq + Clone>(items: &mut Vec<T>, group: &[T]) {
    let all_selected = group.iter().all(|g| items.contains(g));
    if all_selected {
        items.retain(|x| !group.contains(x));
    } else {
        for g in group {
            if !items.contains(g) {
                items.push(g.clone());
            }
        }
    }
}

pub struct FilterStore {
    selection: FilterSelection,
    location: Arc<dyn Location>,
    storage: Arc<dyn KeyValueStore>,
    changes: watch::Sender<FilterSelection>,
}

impl FilterStore {
    pub fn load(location: Arc<dyn Location>, storage: Arc<dyn KeyValueStore>) -> Self {
        let from_location = match location.query() {
            Ok(raw) => Partial::from_params(&query::decode(&raw)),
            Err(e) => {
                tracing::warn!("failed to read location: {e:#}");
                Partial::default()
            }
        };
        let from_snapshot = match storage.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => Partial::from_snapshot(&raw),
            Ok(None) => Partial::default(),
            Err(e) => {
                tracing::warn!("failed to read filter snapshot: {e:#}");
                Partial::default()
            }
        };

        let selection = FilterSelection::resolve(from_location, from_snapshot);
        tracing::debug!(?selection, "resolved initial filters");
        let (changes, _) = watch::channel(selection.clone());

        Self { selection, location, storage, changes }
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterSelection> {
        self.changes.subscribe()
    }

    pub fn toggle_role(&mut self, code: RoleCode) {
        let mut next = self.selection.clone();
        toggle(&mut next.roles, code);
        self.commit(next);
    }

    pub fn toggle_category_all(&mut self, category: &RoleCategory) {
        let group: Vec<RoleCode> = category.codes().collect();
        let mut next = self.selection.clone();
        toggle_group(&mut next.roles, &group);
        self.commit(next);
    }

    pub fn toggle_domain(&mut self, code: DomainCode) {
        let mut next = self.selection.clone();
        toggle(&mut next.domains, code);
        self.commit(next);
    }

    pub fn toggle_all_domains(&mut self) {
        let group: Vec<DomainCode> = taxonomy::all_domains().collect();
        let mut next = self.selection.clone();
        toggle_group(&mut next.domains, &group);
        self.commit(next);
    }

    /// Returns `false` when there was nothing to clear.
    pub fn clear_domains(&mut self) -> bool {
        if self.selection.domains.is_empty() {
            return false;
        }
        let mut next = self.selection.clone();
        next.domains.clear();
        self.commit(next);
        true
    }

    pub fn set_active_only(&mut self, value: ActiveOnly) {
        let mut next = self.selection.clone();
        next.active_only = value;
        self.commit(next);
    }

    pub fn set_sort_order(&mut self, value: SortOrder) {
        let mut next = self.selection.clone();
        next.sort_order = value;
        self.commit(next);
    }

    /// Clears domains, status and sort. Role selection survives a reset.
    /// Returns `false` (and writes nothing) when already at defaults.
    pub fn reset_all(&mut self) -> bool {
        let current = &self.selection;
        if !current.domains_changed() && !current.status_changed() && !current.sort_changed() {
            return false;
        }
        let next = FilterSelection {
            roles: current.roles.clone(),
            ..FilterSelection::default()
        };
        self.commit(next);
        true
    }

    pub fn set_page(&mut self, page: u32) {
        if self.selection.page == page {
            return;
        }
        self.selection.page = page;
        self.write_location();
        self.changes.send_replace(self.selection.clone());
    }

    fn commit(&mut self, mut next: FilterSelection) {
        next.page = 0;
        self.selection = next;
        self.write_location();
        self.write_snapshot();
        self.changes.send_replace(self.selection.clone());
    }

    fn write_location(&self) {
        let mut params = match self.location.query() {
            Ok(raw) => query::decode(&raw),
            Err(e) => {
                tracing::warn!("failed to read location: {e:#}");
                QueryParams::default()
            }
        };
        for key in OWNED_KEYS {
            params.remove(key);
        }
        for (key, value) in query::decode(&self.selection.to_query()).iter() {
            params.append(key, value);
        }
        if let Err(e) = self.location.replace_query(&params.encode()) {
            tracing::warn!("failed to update location: {e:#}");
        }
    }

    fn write_snapshot(&self) {
        let raw = self.selection.snapshot().to_string();
        if let Err(e) = self.storage.set(SNAPSHOT_KEY, &raw) {
            tracing::warn!("failed to persist filters: {e:#}");
        }
    }
}
