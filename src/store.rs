//! Store service — the mutators over the application state tree.
//!
//! DESIGN
//! ======
//! `AppStore` is an explicit context object: the presentation layer owns
//! one and calls its mutators; tests build isolated instances. Each
//! mutator validates its input, looks up its targets, and only then
//! touches the tree, so a failed call leaves the state exactly as it was.
//!
//! After a successful mutation the store:
//! 1. notifies observers synchronously with the new tree,
//! 2. hands a snapshot to the persistence writer (if attached).
//!
//! Mutators take `&mut self`, so there is one logical writer. Callers that
//! share a store across tasks wrap it in a mutex, which serializes calls.
//!
//! ERROR HANDLING
//! ==============
//! A missing list, item, or group is reported as a `*NotFound` error rather
//! than ignored. Callers that want the old fire-and-forget behavior can
//! discard the result.

use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use crate::clock::MonotonicClock;
use crate::model::{
    Group, GroupPatch, ItemPatch, ListPatch, NewGroup, NewItem, NewList, ShoppingItem, ShoppingList, User,
    ValidationError, latest_item_stamp,
};
use crate::persistence::{self, PersistConfig, PersistError, PersistHandle, PersistHealth};
use crate::state::AppState;
use crate::storage::KeyValueStorage;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("list not found: {0}")]
    ListNotFound(String),
    #[error("item {item_id} not found in list {list_id}")]
    ItemNotFound { list_id: String, item_id: String },
    #[error("group not found: {0}")]
    GroupNotFound(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl StoreError {
    /// Grepable code for diagnostics and UI mapping.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ListNotFound(_) => "E_LIST_NOT_FOUND",
            Self::ItemNotFound { .. } => "E_ITEM_NOT_FOUND",
            Self::GroupNotFound(_) => "E_GROUP_NOT_FOUND",
            Self::Invalid(_) => "E_INVALID",
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// What a successful mutation changed. Passed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CurrentUserSet { user_id: String },
    CurrentUserCleared,
    ActiveGroupSet { group_id: String },
    GroupAdded { group_id: String },
    GroupUpdated { group_id: String },
    GroupDeleted { group_id: String },
    ListAdded { list_id: String },
    ListUpdated { list_id: String },
    ListDeleted { list_id: String },
    ItemAdded { list_id: String, item_id: String },
    ItemUpdated { list_id: String, item_id: String },
    ItemDeleted { list_id: String, item_id: String },
}

impl Mutation {
    /// Short `entity:verb` name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CurrentUserSet { .. } => "user:set",
            Self::CurrentUserCleared => "user:clear",
            Self::ActiveGroupSet { .. } => "group:activate",
            Self::GroupAdded { .. } => "group:add",
            Self::GroupUpdated { .. } => "group:update",
            Self::GroupDeleted { .. } => "group:delete",
            Self::ListAdded { .. } => "list:add",
            Self::ListUpdated { .. } => "list:update",
            Self::ListDeleted { .. } => "list:delete",
            Self::ItemAdded { .. } => "item:add",
            Self::ItemUpdated { .. } => "item:update",
            Self::ItemDeleted { .. } => "item:delete",
        }
    }
}

/// Observer callback. Runs synchronously inside the mutator.
pub type Observer = Box<dyn Fn(&AppState, &Mutation) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// STORE
// =============================================================================

pub struct AppStore {
    state: AppState,
    clock: MonotonicClock,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    persister: Option<PersistHandle>,
    /// Set when `open` could not read the slot and left it alone.
    unpersisted: Option<PersistHealth>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    /// Empty, memory-only store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(AppState::new())
    }

    /// Memory-only store over an existing tree.
    #[must_use]
    pub fn from_state(state: AppState) -> Self {
        let clock = MonotonicClock::starting_after(state.latest_timestamp());
        Self { state, clock, observers: Vec::new(), next_subscription: 0, persister: None, unpersisted: None }
    }

    /// Hydrate from `key` and mirror every later mutation back to it.
    /// Must be called inside a Tokio runtime.
    ///
    /// If the slot cannot be read the store starts empty and memory-only, so
    /// the stored document is never overwritten; the failure shows up in
    /// [`AppStore::persist_health`].
    pub async fn open(storage: Arc<dyn KeyValueStorage>, key: &str, config: PersistConfig) -> Self {
        match persistence::hydrate(storage.as_ref(), key, config).await {
            Ok(state) => {
                let mut store = Self::from_state(state);
                store.persister = Some(persistence::spawn_persistence_worker(storage, key.to_string(), config));
                store
            }
            Err(e) => {
                error!(error = %e, key, "stored state unavailable; running memory-only");
                let mut store = Self::new();
                store.unpersisted = Some(PersistHealth { written: 0, failed: 1, last_error: Some(e.to_string()) });
                store
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Writer health. `None` for a store built without storage; unhealthy
    /// when `open` fell back to memory-only.
    #[must_use]
    pub fn persist_health(&self) -> Option<PersistHealth> {
        match &self.persister {
            Some(persister) => Some(persister.health()),
            None => self.unpersisted.clone(),
        }
    }

    /// Wait for all queued snapshots to be handled. No-op when memory-only.
    ///
    /// # Errors
    ///
    /// Returns `WriterClosed` if the writer task has stopped.
    pub async fn flush(&self) -> Result<(), PersistError> {
        match &self.persister {
            Some(persister) => persister.flush().await,
            None => Ok(()),
        }
    }

    /// Drain pending writes and stop the writer. Returns the final writer health.
    pub async fn shutdown(mut self) -> Option<PersistHealth> {
        match self.persister.take() {
            Some(persister) => Some(persister.shutdown().await),
            None => self.unpersisted.take(),
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&AppState, &Mutation) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    fn commit(&mut self, mutation: Mutation) {
        debug!(mutation = mutation.name(), ?mutation, "state mutated");
        for (_, observer) in &self.observers {
            observer(&self.state, &mutation);
        }
        if let Some(persister) = &self.persister {
            persister.enqueue(self.state.clone());
        }
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    pub fn set_current_user(&mut self, user: User) {
        let user_id = user.id.clone();
        self.state.current_user = Some(user);
        self.commit(Mutation::CurrentUserSet { user_id });
    }

    /// Sign out. Lists and groups stay on the device.
    pub fn clear_current_user(&mut self) {
        self.state.current_user = None;
        self.commit(Mutation::CurrentUserCleared);
    }

    /// No existence check: the id may name a group that arrives later.
    pub fn set_active_group(&mut self, group_id: impl Into<String>) {
        let group_id = group_id.into();
        self.state.active_group_id = Some(group_id.clone());
        self.commit(Mutation::ActiveGroupSet { group_id });
    }

    // -------------------------------------------------------------------------
    // Groups
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `Invalid` for a blank name.
    pub fn add_group(&mut self, data: NewGroup) -> Result<Group, StoreError> {
        data.validate()?;
        let group = data.into_group(new_id(), self.clock.now());
        self.state.groups.push(group.clone());
        self.commit(Mutation::GroupAdded { group_id: group.id.clone() });
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns `GroupNotFound` for an unknown id, `Invalid` for a blank name.
    pub fn update_group(&mut self, group_id: &str, patch: GroupPatch) -> Result<Group, StoreError> {
        patch.validate()?;
        let group = self
            .state
            .group_mut(group_id)
            .ok_or_else(|| StoreError::GroupNotFound(group_id.to_string()))?;
        group.apply(patch);
        let updated = group.clone();
        self.commit(Mutation::GroupUpdated { group_id: updated.id.clone() });
        Ok(updated)
    }

    /// Removes the group; clears the active group if it pointed here. Lists are kept.
    ///
    /// # Errors
    ///
    /// Returns `GroupNotFound` for an unknown id.
    pub fn delete_group(&mut self, group_id: &str) -> Result<Group, StoreError> {
        let idx = self
            .state
            .groups
            .iter()
            .position(|group| group.id == group_id)
            .ok_or_else(|| StoreError::GroupNotFound(group_id.to_string()))?;
        let removed = self.state.groups.remove(idx);
        if self.state.active_group_id.as_deref() == Some(group_id) {
            self.state.active_group_id = None;
        }
        self.commit(Mutation::GroupDeleted { group_id: removed.id.clone() });
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Lists
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `Invalid` for a blank name, a negative amount, or duplicate item ids.
    pub fn add_list(&mut self, data: NewList) -> Result<ShoppingList, StoreError> {
        data.validate()?;
        if let Some(stamp) = latest_item_stamp(&data.items) {
            self.clock.observe(stamp);
        }
        let list = data.into_list(new_id(), self.clock.now());
        self.state.lists.push(list.clone());
        self.commit(Mutation::ListAdded { list_id: list.id.clone() });
        Ok(list)
    }

    /// Merge `patch` into the list and refresh its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` for an unknown id, `Invalid` for bad patch values.
    pub fn update_list(&mut self, list_id: &str, patch: ListPatch) -> Result<ShoppingList, StoreError> {
        patch.validate()?;
        let list = self
            .state
            .list_mut(list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        if let Some(stamp) = patch.items.as_deref().and_then(latest_item_stamp) {
            self.clock.observe(stamp);
        }
        list.apply(patch, self.clock.now());
        let updated = list.clone();
        self.commit(Mutation::ListUpdated { list_id: updated.id.clone() });
        Ok(updated)
    }

    /// Removes the list and drops its id from every group.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` for an unknown id.
    pub fn delete_list(&mut self, list_id: &str) -> Result<ShoppingList, StoreError> {
        let idx = self
            .state
            .lists
            .iter()
            .position(|list| list.id == list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        let removed = self.state.lists.remove(idx);
        for group in &mut self.state.groups {
            group.lists.retain(|id| id != list_id);
        }
        self.commit(Mutation::ListDeleted { list_id: removed.id.clone() });
        Ok(removed)
    }

    /// Set `total_spent` to the sum of bought item prices.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` for an unknown id.
    pub fn recompute_total_spent(&mut self, list_id: &str) -> Result<ShoppingList, StoreError> {
        let total = self
            .state
            .list(list_id)
            .map(ShoppingList::bought_total)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        self.update_list(list_id, ListPatch { total_spent: Some(total), ..ListPatch::default() })
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Append an item to the list and refresh the list's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` for an unknown list, `Invalid` for bad item values.
    pub fn add_item(&mut self, list_id: &str, data: NewItem) -> Result<ShoppingItem, StoreError> {
        data.validate()?;
        let list = self
            .state
            .list_mut(list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        let now = self.clock.now();
        let item = data.into_item(new_id(), now);
        list.items.push(item.clone());
        list.updated_at = now;
        self.commit(Mutation::ItemAdded { list_id: list_id.to_string(), item_id: item.id.clone() });
        Ok(item)
    }

    /// Merge `patch` into the item; refreshes both the item's and the list's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` / `ItemNotFound` for unknown ids, `Invalid` for bad values.
    pub fn update_item(&mut self, list_id: &str, item_id: &str, patch: ItemPatch) -> Result<ShoppingItem, StoreError> {
        patch.validate()?;
        let list = self
            .state
            .list_mut(list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        let item = list.item_mut(item_id).ok_or_else(|| StoreError::ItemNotFound {
            list_id: list_id.to_string(),
            item_id: item_id.to_string(),
        })?;
        let now = self.clock.now();
        item.apply(patch, now);
        let updated = item.clone();
        list.updated_at = now;
        self.commit(Mutation::ItemUpdated { list_id: list_id.to_string(), item_id: item_id.to_string() });
        Ok(updated)
    }

    /// Advance the item's status one step (needed -> in-cart -> bought -> needed).
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` / `ItemNotFound` for unknown ids.
    pub fn cycle_item_status(&mut self, list_id: &str, item_id: &str) -> Result<ShoppingItem, StoreError> {
        let list = self
            .state
            .list(list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        let current = list.item(item_id).map(|item| item.status).ok_or_else(|| StoreError::ItemNotFound {
            list_id: list_id.to_string(),
            item_id: item_id.to_string(),
        })?;
        self.update_item(list_id, item_id, ItemPatch::status(current.next()))
    }

    /// Remove exactly the matching item and refresh the list's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ListNotFound` / `ItemNotFound` for unknown ids.
    pub fn delete_item(&mut self, list_id: &str, item_id: &str) -> Result<ShoppingItem, StoreError> {
        let list = self
            .state
            .list_mut(list_id)
            .ok_or_else(|| StoreError::ListNotFound(list_id.to_string()))?;
        let idx = list.items.iter().position(|item| item.id == item_id).ok_or_else(|| {
            StoreError::ItemNotFound { list_id: list_id.to_string(), item_id: item_id.to_string() }
        })?;
        let removed = list.items.remove(idx);
        list.updated_at = self.clock.now();
        self.commit(Mutation::ItemDeleted { list_id: list_id.to_string(), item_id: item_id.to_string() });
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
