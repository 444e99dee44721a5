//! Domain entities — users, groups, shopping lists, and their items.
//!
//! DESIGN
//! ======
//! Entities are plain serde structs whose wire names match the persisted
//! document (`camelCase`, status tokens like `in-cart`). Items live inside
//! their owning list's `items` vector; there is no separate item table.
//!
//! Creation inputs (`New*`) omit generated fields. Partial updates (`*Patch`)
//! use `Option<Option<T>>` for clearable fields: outer `None` leaves the
//! field alone, `Some(None)` clears it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// VALIDATION
// =============================================================================

/// Rejected input on create or update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl ValidationError {
    fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be blank"));
    }
    Ok(())
}

fn check_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::new(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }
    Ok(())
}

fn check_optional_amount(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| check_amount(field, v))
}

/// Caller-supplied items get the same checks as `add_item`, plus unique ids.
fn check_items(items: &[ShoppingItem]) -> Result<(), ValidationError> {
    for (idx, item) in items.iter().enumerate() {
        item.validate()?;
        if items[..idx].iter().any(|other| other.id == item.id) {
            return Err(ValidationError::new("items", "duplicate item id"));
        }
    }
    Ok(())
}

// =============================================================================
// USER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// A person taking part in groups. `color` is a display accent token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub color: String,
    pub role: Role,
}

impl User {
    /// First character of the name, used for avatar initials.
    #[must_use]
    pub fn initial(&self) -> Option<char> {
        self.name.chars().next()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// ITEM
// =============================================================================

/// Lifecycle position of an item on a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    #[default]
    Needed,
    InCart,
    Bought,
}

impl ItemStatus {
    /// Toggle order: needed -> in-cart -> bought -> needed.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Needed => Self::InCart,
            Self::InCart => Self::Bought,
            Self::Bought => Self::Needed,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Needed => "Need",
            Self::InCart => "In Cart",
            Self::Bought => "Bought",
        }
    }

    /// Still on the shopping run (not yet bought).
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Needed | Self::InCart)
    }
}

/// A purchasable entry, owned by exactly one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub status: ItemStatus,
    /// Weak reference to a user id; not checked against any group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub added_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding an item. Id and timestamps are generated by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub status: ItemStatus,
    pub assigned_to: Option<String>,
    pub added_by: String,
    pub price: Option<f64>,
    pub category: Option<String>,
}

impl NewItem {
    /// A bare item in the `needed` state.
    #[must_use]
    pub fn needed(name: impl Into<String>, added_by: impl Into<String>) -> Self {
        Self { name: name.into(), added_by: added_by.into(), ..Self::default() }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check_name("name", &self.name)?;
        check_optional_amount("quantity", self.quantity)?;
        check_optional_amount("price", self.price)
    }

    pub(crate) fn into_item(self, id: String, now: DateTime<Utc>) -> ShoppingItem {
        ShoppingItem {
            id,
            name: self.name,
            quantity: self.quantity,
            unit: self.unit,
            status: self.status,
            assigned_to: self.assigned_to,
            added_by: self.added_by,
            price: self.price,
            category: self.category,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial item update. `id` and `created_at` are not patchable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<Option<f64>>,
    pub unit: Option<Option<String>>,
    pub status: Option<ItemStatus>,
    pub assigned_to: Option<Option<String>>,
    pub added_by: Option<String>,
    pub price: Option<Option<f64>>,
    pub category: Option<Option<String>>,
}

impl ItemPatch {
    #[must_use]
    pub fn status(status: ItemStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_name("name", name)?;
        }
        check_optional_amount("quantity", self.quantity.flatten())?;
        check_optional_amount("price", self.price.flatten())
    }
}

impl ShoppingItem {
    fn validate(&self) -> Result<(), ValidationError> {
        check_name("item.id", &self.id)?;
        check_name("item.name", &self.name)?;
        check_optional_amount("item.quantity", self.quantity)?;
        check_optional_amount("item.price", self.price)
    }

    pub(crate) fn apply(&mut self, patch: ItemPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(unit) = patch.unit {
            self.unit = unit;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(assigned_to) = patch.assigned_to {
            self.assigned_to = assigned_to;
        }
        if let Some(added_by) = patch.added_by {
            self.added_by = added_by;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// LIST
// =============================================================================

/// A named, ordered collection of items shared by a set of members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Insertion order is display order.
    #[serde(default)]
    pub items: Vec<ShoppingItem>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    /// Caller-maintained; see [`ShoppingList::bought_total`] for the derived figure.
    #[serde(default)]
    pub total_spent: f64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
    pub items: Vec<ShoppingItem>,
    pub members: Vec<String>,
    pub budget: Option<f64>,
    pub total_spent: f64,
    pub created_by: String,
}

impl NewList {
    #[must_use]
    pub fn named(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        let created_by = created_by.into();
        Self { name: name.into(), members: vec![created_by.clone()], created_by, ..Self::default() }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check_name("name", &self.name)?;
        check_optional_amount("budget", self.budget)?;
        check_amount("totalSpent", self.total_spent)?;
        check_items(&self.items)
    }

    pub(crate) fn into_list(self, id: String, now: DateTime<Utc>) -> ShoppingList {
        ShoppingList {
            id,
            name: self.name,
            description: self.description,
            emoji: self.emoji,
            items: self.items,
            members: self.members,
            budget: self.budget,
            total_spent: self.total_spent,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Newest `created_at`/`updated_at` among `items`.
pub(crate) fn latest_item_stamp(items: &[ShoppingItem]) -> Option<DateTime<Utc>> {
    items.iter().flat_map(|item| [item.created_at, item.updated_at]).max()
}

/// Partial list update. Supplying `items` replaces the whole sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub emoji: Option<Option<String>>,
    pub items: Option<Vec<ShoppingItem>>,
    pub members: Option<Vec<String>>,
    pub budget: Option<Option<f64>>,
    pub total_spent: Option<f64>,
    pub created_by: Option<String>,
}

impl ListPatch {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_name("name", name)?;
        }
        check_optional_amount("budget", self.budget.flatten())?;
        check_optional_amount("totalSpent", self.total_spent)?;
        if let Some(items) = &self.items {
            check_items(items)?;
        }
        Ok(())
    }
}

/// Item tallies for progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    pub total: usize,
    pub completed: usize,
}

impl ItemCounts {
    /// Fraction of items bought, `0.0` for an empty list.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent(self) -> u32 {
        (self.progress() * 100.0).round() as u32
    }
}

/// Items split by status, each bucket in display order.
#[derive(Debug, Default)]
pub struct StatusBuckets<'a> {
    pub needed: Vec<&'a ShoppingItem>,
    pub in_cart: Vec<&'a ShoppingItem>,
    pub bought: Vec<&'a ShoppingItem>,
}

impl ShoppingList {
    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&ShoppingItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub(crate) fn item_mut(&mut self, item_id: &str) -> Option<&mut ShoppingItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    #[must_use]
    pub fn item_counts(&self) -> ItemCounts {
        ItemCounts {
            total: self.items.len(),
            completed: self.items.iter().filter(|item| item.status == ItemStatus::Bought).count(),
        }
    }

    /// Case-insensitive substring match on item names. An empty query matches everything.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&ShoppingItem> {
        let needle = query.to_lowercase();
        self.items
            .iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .collect()
    }

    #[must_use]
    pub fn items_by_status(&self) -> StatusBuckets<'_> {
        let mut buckets = StatusBuckets::default();
        for item in &self.items {
            match item.status {
                ItemStatus::Needed => buckets.needed.push(item),
                ItemStatus::InCart => buckets.in_cart.push(item),
                ItemStatus::Bought => buckets.bought.push(item),
            }
        }
        buckets
    }

    /// Sum of prices over bought items. Unpriced items count as zero.
    #[must_use]
    pub fn bought_total(&self) -> f64 {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Bought)
            .filter_map(|item| item.price)
            .sum()
    }

    /// `budget - total_spent`, negative when over budget.
    #[must_use]
    pub fn budget_remaining(&self) -> Option<f64> {
        self.budget.map(|budget| budget - self.total_spent)
    }

    pub(crate) fn apply(&mut self, patch: ListPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(emoji) = patch.emoji {
            self.emoji = emoji;
        }
        if let Some(items) = patch.items {
            self.items = items;
        }
        if let Some(members) = patch.members {
            self.members = members;
        }
        if let Some(budget) = patch.budget {
            self.budget = budget;
        }
        if let Some(total_spent) = patch.total_spent {
            self.total_spent = total_spent;
        }
        if let Some(created_by) = patch.created_by {
            self.created_by = created_by;
        }
        self.updated_at = now;
    }
}

// =============================================================================
// GROUP
// =============================================================================

/// A set of users sharing a set of lists. Members are stored in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<User>,
    /// List ids.
    #[serde(default)]
    pub lists: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub members: Vec<User>,
    pub lists: Vec<String>,
    pub created_by: String,
}

impl NewGroup {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check_name("name", &self.name)
    }

    pub(crate) fn into_group(self, id: String, now: DateTime<Utc>) -> Group {
        Group {
            id,
            name: self.name,
            members: self.members,
            lists: self.lists,
            created_by: self.created_by,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub members: Option<Vec<User>>,
    pub lists: Option<Vec<String>>,
}

impl GroupPatch {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            check_name("name", name)?;
        }
        Ok(())
    }
}

impl Group {
    #[must_use]
    pub fn member(&self, user_id: &str) -> Option<&User> {
        self.members.iter().find(|user| user.id == user_id)
    }

    pub(crate) fn apply(&mut self, patch: GroupPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(members) = patch.members {
            self.members = members;
        }
        if let Some(lists) = patch.lists {
            self.lists = lists;
        }
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
