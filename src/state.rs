//! Application state tree.
//!
//! DESIGN
//! ======
//! `AppState` is the full tree the presentation layer reads: the session
//! user, groups, lists (with embedded items), and the active group. It is
//! plain data; every mutation goes through [`crate::store::AppStore`] so
//! timestamps, observers, and persistence stay consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Group, ShoppingItem, ShoppingList, User};

// =============================================================================
// STATE TREE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub current_user: Option<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub lists: Vec<ShoppingList>,
    #[serde(default)]
    pub active_group_id: Option<String>,
}

/// An open item on the shopping run, tagged with the list it came from.
#[derive(Debug, Clone, Copy)]
pub struct QueuedItem<'a> {
    pub list_id: &'a str,
    pub list_name: &'a str,
    pub list_emoji: Option<&'a str>,
    pub item: &'a ShoppingItem,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_user.is_none() && self.groups.is_empty() && self.lists.is_empty()
    }

    #[must_use]
    pub fn list(&self, list_id: &str) -> Option<&ShoppingList> {
        self.lists.iter().find(|list| list.id == list_id)
    }

    pub(crate) fn list_mut(&mut self, list_id: &str) -> Option<&mut ShoppingList> {
        self.lists.iter_mut().find(|list| list.id == list_id)
    }

    #[must_use]
    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub(crate) fn group_mut(&mut self, group_id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|group| group.id == group_id)
    }

    /// The active group, if the id is set and still resolves.
    #[must_use]
    pub fn active_group(&self) -> Option<&Group> {
        self.active_group_id.as_deref().and_then(|id| self.group(id))
    }

    /// Lists referenced by a group, in the group's order. Dangling ids are skipped.
    #[must_use]
    pub fn lists_for_group(&self, group_id: &str) -> Vec<&ShoppingList> {
        let Some(group) = self.group(group_id) else {
            return Vec::new();
        };
        group.lists.iter().filter_map(|id| self.list(id)).collect()
    }

    /// Resolve a user id against the session user and every group roster.
    #[must_use]
    pub fn find_user(&self, user_id: &str) -> Option<&User> {
        self.current_user
            .as_ref()
            .filter(|user| user.id == user_id)
            .or_else(|| self.groups.iter().find_map(|group| group.member(user_id)))
    }

    /// Every needed or in-cart item across all lists, list order then item order.
    #[must_use]
    pub fn shopping_queue(&self) -> Vec<QueuedItem<'_>> {
        self.lists
            .iter()
            .flat_map(|list| {
                list.items.iter().filter(|item| item.status.is_open()).map(move |item| QueuedItem {
                    list_id: &list.id,
                    list_name: &list.name,
                    list_emoji: list.emoji.as_deref(),
                    item,
                })
            })
            .collect()
    }

    /// Newest timestamp anywhere in the tree. Seeds the clock after hydration.
    #[must_use]
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let group_stamps = self.groups.iter().map(|group| group.created_at);
        let list_stamps = self.lists.iter().flat_map(|list| {
            std::iter::once(list.updated_at)
                .chain(std::iter::once(list.created_at))
                .chain(list.items.iter().flat_map(|item| [item.created_at, item.updated_at]))
        });
        group_stamps.chain(list_stamps).max()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
