//! FetchIt — shared shopping lists for households.
//!
//! ARCHITECTURE
//! ============
//! The crate is a single state container. [`store::AppStore`] owns the
//! [`state::AppState`] tree (session user, groups, lists with embedded
//! items, active group) and exposes the mutators. Every successful mutation
//! notifies observers and is mirrored to durable key-value storage by the
//! [`persistence`] writer; on startup the tree is hydrated from the same slot.

pub mod clock;
pub mod config;
pub mod document;
pub mod model;
pub mod persistence;
pub mod seed;
pub mod state;
pub mod storage;
pub mod store;

pub use model::{
    Group, GroupPatch, ItemPatch, ItemStatus, ListPatch, NewGroup, NewItem, NewList, Role, ShoppingItem, ShoppingList,
    User,
};
pub use state::AppState;
pub use store::{AppStore, Mutation, StoreError, SubscriptionId};
