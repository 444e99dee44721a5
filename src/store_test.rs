use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::Ordering;

use super::*;
use crate::document;
use crate::model::ItemStatus;
use crate::state::test_helpers;
use crate::storage::MemoryStorage;
use crate::storage::test_helpers::FlakyStorage;

fn store_with_list() -> (AppStore, String) {
    let mut store = AppStore::new();
    let list = store.add_list(NewList::named("Groceries", "u1")).unwrap();
    (store, list.id)
}

fn recorder(store: &mut AppStore) -> Arc<Mutex<Vec<Mutation>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |_, mutation| sink.lock().unwrap().push(mutation.clone()));
    seen
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn family_groceries_scenario() {
    let mut store = AppStore::new();
    store
        .add_group(NewGroup { name: "Family".into(), members: vec![], lists: vec![], created_by: "u1".into() })
        .unwrap();
    let list = store
        .add_list(NewList {
            name: "Groceries".into(),
            members: vec!["u1".into()],
            total_spent: 0.0,
            created_by: "u1".into(),
            ..NewList::default()
        })
        .unwrap();
    let item = store.add_item(&list.id, NewItem::needed("Milk", "u1")).unwrap();
    store.update_item(&list.id, &item.id, ItemPatch::status(ItemStatus::Bought)).unwrap();

    let state = store.state();
    assert_eq!(state.groups.len(), 1);
    assert_eq!(state.lists.len(), 1);
    assert_eq!(state.lists[0].items.len(), 1);
    assert_eq!(state.lists[0].items[0].status, ItemStatus::Bought);
}

#[test]
fn add_item_on_unknown_list_leaves_state_unchanged() {
    let (mut store, _) = store_with_list();
    let before = store.state().clone();

    let err = store.add_item("nope", NewItem::needed("Milk", "u1")).unwrap_err();

    assert_eq!(err, StoreError::ListNotFound("nope".into()));
    assert_eq!(err.error_code(), "E_LIST_NOT_FOUND");
    assert_eq!(store.state(), &before);
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn new_store_is_empty() {
    let store = AppStore::new();
    assert!(store.state().is_empty());
    assert!(store.persist_health().is_none());
}

#[test]
fn created_ids_are_unique() {
    let mut store = AppStore::new();
    let mut list_ids = HashSet::new();
    for n in 0..50 {
        let list = store.add_list(NewList::named(format!("List {n}"), "u1")).unwrap();
        assert!(list_ids.insert(list.id));
    }
    let list_id = store.state().lists[0].id.clone();
    let mut item_ids = HashSet::new();
    for n in 0..200 {
        let item = store.add_item(&list_id, NewItem::needed(format!("Item {n}"), "u1")).unwrap();
        assert!(item_ids.insert(item.id));
    }
    assert_eq!(store.state().lists[0].items.len(), 200);
}

#[test]
fn add_list_sets_both_timestamps() {
    let mut store = AppStore::new();
    let list = store.add_list(NewList::named("Groceries", "u1")).unwrap();
    assert_eq!(list.created_at, list.updated_at);
    assert_eq!(store.state().list(&list.id), Some(&list));
}

#[test]
fn add_item_appends_in_order_and_touches_list() {
    let (mut store, list_id) = store_with_list();
    let list_before = store.state().list(&list_id).unwrap().updated_at;

    let first = store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    let second = store.add_item(&list_id, NewItem::needed("Eggs", "u1")).unwrap();

    let list = store.state().list(&list_id).unwrap();
    assert_eq!(list.items[0].id, first.id);
    assert_eq!(list.items[1].id, second.id);
    assert!(list.updated_at > list_before);
    assert_eq!(list.updated_at, second.updated_at);
}

#[test]
fn invalid_input_is_rejected_without_change() {
    let (mut store, list_id) = store_with_list();
    let before = store.state().clone();

    let bad_item = NewItem { price: Some(-3.0), ..NewItem::needed("Milk", "u1") };
    let err = store.add_item(&list_id, bad_item).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(ValidationError { field: "price", .. })));
    assert!(!err.is_not_found());

    assert!(store.add_list(NewList::named(" ", "u1")).is_err());
    assert!(store.add_group(NewGroup::default()).is_err());
    assert_eq!(store.state(), &before);
}

#[test]
fn supplied_items_are_validated_like_added_items() {
    let (mut store, list_id) = store_with_list();
    let before = store.state().clone();

    let blank = test_helpers::dummy_item("i1", "  ", ItemStatus::Needed);
    let err = store.add_list(NewList { items: vec![blank], ..NewList::named("Party", "u1") }).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(ValidationError { field: "item.name", .. })));

    let mut negative = test_helpers::dummy_item("i1", "Cake", ItemStatus::Needed);
    negative.price = Some(-1.0);
    let patch = ListPatch { items: Some(vec![negative]), ..ListPatch::default() };
    let err = store.update_list(&list_id, patch).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(ValidationError { field: "item.price", .. })));

    assert_eq!(store.state(), &before);
}

// =============================================================================
// Updates
// =============================================================================

#[test]
fn update_item_advances_item_and_list_timestamps() {
    let (mut store, list_id) = store_with_list();
    let item = store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    let list_before = store.state().list(&list_id).unwrap().updated_at;

    let updated = store.update_item(&list_id, &item.id, ItemPatch::status(ItemStatus::Bought)).unwrap();

    assert_eq!(updated.status, ItemStatus::Bought);
    assert!(updated.updated_at > item.updated_at);
    assert_eq!(updated.created_at, item.created_at);
    let list = store.state().list(&list_id).unwrap();
    assert!(list.updated_at > list_before);
    assert_eq!(list.item(&item.id).unwrap().status, ItemStatus::Bought);
}

#[test]
fn update_item_unknown_ids_leave_state_unchanged() {
    let (mut store, list_id) = store_with_list();
    let item = store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    let before = store.state().clone();

    let err = store.update_item(&list_id, "ghost", ItemPatch::status(ItemStatus::Bought)).unwrap_err();
    assert_eq!(err, StoreError::ItemNotFound { list_id: list_id.clone(), item_id: "ghost".into() });
    assert_eq!(err.error_code(), "E_ITEM_NOT_FOUND");

    let err = store.update_item("ghost", &item.id, ItemPatch::status(ItemStatus::Bought)).unwrap_err();
    assert_eq!(err, StoreError::ListNotFound("ghost".into()));

    assert_eq!(store.state(), &before);
}

#[test]
fn update_list_merges_and_refreshes() {
    let (mut store, list_id) = store_with_list();
    let before = store.state().list(&list_id).unwrap().clone();

    let patch = ListPatch { budget: Some(Some(150.0)), emoji: Some(Some("🛒".into())), ..ListPatch::default() };
    let updated = store.update_list(&list_id, patch).unwrap();

    assert_eq!(updated.budget, Some(150.0));
    assert_eq!(updated.emoji.as_deref(), Some("🛒"));
    assert_eq!(updated.name, before.name);
    assert_eq!(updated.created_at, before.created_at);
    assert!(updated.updated_at > before.updated_at);
}

#[test]
fn update_list_unknown_id_leaves_state_unchanged() {
    let (mut store, _) = store_with_list();
    let before = store.state().clone();
    let err = store.update_list("ghost", ListPatch { name: Some("X".into()), ..ListPatch::default() }).unwrap_err();
    assert_eq!(err, StoreError::ListNotFound("ghost".into()));
    assert_eq!(store.state(), &before);
}

#[test]
fn cycle_item_status_walks_the_loop() {
    let (mut store, list_id) = store_with_list();
    let item = store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();

    let statuses: Vec<ItemStatus> =
        (0..3).map(|_| store.cycle_item_status(&list_id, &item.id).unwrap().status).collect();
    assert_eq!(statuses, vec![ItemStatus::InCart, ItemStatus::Bought, ItemStatus::Needed]);

    assert!(store.cycle_item_status(&list_id, "ghost").unwrap_err().is_not_found());
}

#[test]
fn recompute_total_spent_uses_bought_prices() {
    let (mut store, list_id) = store_with_list();
    let milk = store.add_item(&list_id, NewItem { price: Some(4.0), ..NewItem::needed("Milk", "u1") }).unwrap();
    store.add_item(&list_id, NewItem { price: Some(9.0), ..NewItem::needed("Cheese", "u1") }).unwrap();
    store.update_item(&list_id, &milk.id, ItemPatch::status(ItemStatus::Bought)).unwrap();

    let list = store.recompute_total_spent(&list_id).unwrap();
    assert!((list.total_spent - 4.0).abs() < f64::EPSILON);
    assert_eq!(store.recompute_total_spent("ghost").unwrap_err(), StoreError::ListNotFound("ghost".into()));
}

#[test]
fn supplied_item_stamps_never_move_backwards() {
    let mut store = AppStore::new();
    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let mut item = test_helpers::dummy_item("i1", "Milk", ItemStatus::Needed);
    item.created_at = future;
    item.updated_at = future;

    let list = store.add_list(NewList { items: vec![item.clone()], ..NewList::named("Groceries", "u1") }).unwrap();
    assert!(list.updated_at > future);
    let updated = store.update_item(&list.id, "i1", ItemPatch::status(ItemStatus::Bought)).unwrap();
    assert!(updated.updated_at > future);

    let later = future + chrono::Duration::hours(1);
    item.updated_at = later;
    let patch = ListPatch { items: Some(vec![item]), ..ListPatch::default() };
    assert!(store.update_list(&list.id, patch).unwrap().updated_at > later);
    let cycled = store.cycle_item_status(&list.id, "i1").unwrap();
    assert!(cycled.updated_at > later);
}

// =============================================================================
// Deletes
// =============================================================================

#[test]
fn delete_item_removes_only_the_match() {
    let (mut store, list_id) = store_with_list();
    let milk = store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    let eggs = store.add_item(&list_id, NewItem { quantity: Some(12.0), ..NewItem::needed("Eggs", "u1") }).unwrap();
    let bread = store.add_item(&list_id, NewItem::needed("Bread", "u1")).unwrap();
    let list_before = store.state().list(&list_id).unwrap().updated_at;

    let removed = store.delete_item(&list_id, &eggs.id).unwrap();

    assert_eq!(removed, eggs);
    let list = store.state().list(&list_id).unwrap();
    assert_eq!(list.items, vec![milk, bread]);
    assert!(list.updated_at > list_before);
}

#[test]
fn delete_item_unknown_leaves_state_unchanged() {
    let (mut store, list_id) = store_with_list();
    store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    let before = store.state().clone();
    assert!(store.delete_item(&list_id, "ghost").is_err());
    assert!(store.delete_item("ghost", "ghost").is_err());
    assert_eq!(store.state(), &before);
}

#[test]
fn delete_list_unlinks_from_groups() {
    let (mut store, list_id) = store_with_list();
    let keep = store.add_list(NewList::named("Party", "u1")).unwrap();
    let group = store
        .add_group(NewGroup {
            name: "Family".into(),
            lists: vec![list_id.clone(), keep.id.clone()],
            created_by: "u1".into(),
            ..NewGroup::default()
        })
        .unwrap();

    store.delete_list(&list_id).unwrap();

    assert!(store.state().list(&list_id).is_none());
    assert_eq!(store.state().group(&group.id).unwrap().lists, vec![keep.id]);
    assert_eq!(store.delete_list(&list_id).unwrap_err(), StoreError::ListNotFound(list_id));
}

// =============================================================================
// Groups and session
// =============================================================================

#[test]
fn group_update_and_delete() {
    let mut store = AppStore::new();
    let group = store
        .add_group(NewGroup { name: "Family".into(), created_by: "u1".into(), ..NewGroup::default() })
        .unwrap();
    store.set_active_group(group.id.clone());

    let sarah = test_helpers::dummy_user("u1", "Sarah");
    let patch = GroupPatch { name: Some("The Smiths".into()), members: Some(vec![sarah]), ..GroupPatch::default() };
    let updated = store.update_group(&group.id, patch).unwrap();
    assert_eq!(updated.name, "The Smiths");
    assert_eq!(updated.created_at, group.created_at);
    assert_eq!(store.state().find_user("u1").unwrap().name, "Sarah");

    store.delete_group(&group.id).unwrap();
    assert!(store.state().groups.is_empty());
    assert!(store.state().active_group_id.is_none());
    assert_eq!(store.update_group(&group.id, GroupPatch::default()).unwrap_err().error_code(), "E_GROUP_NOT_FOUND");
}

#[test]
fn set_active_group_does_not_check_existence() {
    let mut store = AppStore::new();
    store.set_active_group("g-later");
    assert_eq!(store.state().active_group_id.as_deref(), Some("g-later"));
    assert!(store.state().active_group().is_none());
}

#[test]
fn set_and_clear_current_user() {
    let mut store = AppStore::new();
    store.set_current_user(test_helpers::dummy_user("u1", "Sarah"));
    assert_eq!(store.state().current_user.as_ref().unwrap().id, "u1");
    store.set_current_user(test_helpers::dummy_user("u2", "Mike"));
    assert_eq!(store.state().current_user.as_ref().unwrap().id, "u2");
    store.clear_current_user();
    assert!(store.state().current_user.is_none());
}

// =============================================================================
// Observers
// =============================================================================

#[test]
fn observers_see_every_successful_mutation_in_order() {
    let mut store = AppStore::new();
    let seen = recorder(&mut store);

    let list = store.add_list(NewList::named("Groceries", "u1")).unwrap();
    let item = store.add_item(&list.id, NewItem::needed("Milk", "u1")).unwrap();
    let _ = store.add_item("ghost", NewItem::needed("Eggs", "u1"));
    store.delete_item(&list.id, &item.id).unwrap();

    let names: Vec<&str> = seen.lock().unwrap().iter().map(Mutation::name).collect();
    assert_eq!(names, vec!["list:add", "item:add", "item:delete"]);
}

#[test]
fn observers_receive_updated_tree() {
    let (mut store, list_id) = store_with_list();
    let counts = Arc::new(Mutex::new(Vec::new()));
    let sink = counts.clone();
    let target = list_id.clone();
    store.subscribe(move |state, _| {
        let len = state.list(&target).map_or(0, |l| l.items.len());
        sink.lock().unwrap().push(len);
    });

    store.add_item(&list_id, NewItem::needed("Milk", "u1")).unwrap();
    store.add_item(&list_id, NewItem::needed("Eggs", "u1")).unwrap();
    assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
}

#[test]
fn unsubscribe_stops_notifications() {
    let mut store = AppStore::new();
    let seen = Arc::new(Mutex::new(0_u32));
    let sink = seen.clone();
    let id = store.subscribe(move |_, _| *sink.lock().unwrap() += 1);

    store.set_active_group("g1");
    assert!(store.unsubscribe(id));
    assert!(!store.unsubscribe(id));
    store.set_active_group("g2");
    assert_eq!(*seen.lock().unwrap(), 1);
}

// =============================================================================
// Hydration + persistence
// =============================================================================

#[test]
fn from_state_keeps_timestamps_monotonic() {
    let mut state = AppState::new();
    let mut list = test_helpers::dummy_list("l1", "Groceries");
    let future = chrono::Utc::now() + chrono::Duration::hours(2);
    list.updated_at = future;
    state.lists.push(list);

    let mut store = AppStore::from_state(state);
    let updated = store.update_list("l1", ListPatch { name: Some("Food".into()), ..ListPatch::default() }).unwrap();
    assert!(updated.updated_at > future);
}

#[tokio::test]
async fn open_persists_mutations_and_reopens_equal() {
    let storage = MemoryStorage::new();
    let config = PersistConfig { retries: 1, retry_base_ms: 1 };

    let mut store = AppStore::open(Arc::new(storage.clone()), "slot", config).await;
    assert!(store.state().is_empty());
    store.set_current_user(test_helpers::dummy_user("u1", "Sarah"));
    let list = store.add_list(NewList::named("Groceries", "u1")).unwrap();
    let item = store.add_item(&list.id, NewItem::needed("Milk", "u1")).unwrap();
    store.update_item(&list.id, &item.id, ItemPatch::status(ItemStatus::InCart)).unwrap();
    store.flush().await.unwrap();
    let expected = store.state().clone();
    let health = store.shutdown().await.unwrap();
    assert_eq!(health.failed, 0);
    assert!(health.written >= 1);

    let stored = document::decode(&storage.snapshot("slot").unwrap()).unwrap();
    assert_eq!(stored, expected);

    let reopened = AppStore::open(Arc::new(storage), "slot", config).await;
    assert_eq!(reopened.state(), &expected);
    assert_eq!(reopened.state().lists[0].items[0].updated_at, expected.lists[0].items[0].updated_at);
}

#[tokio::test]
async fn failed_mutation_writes_nothing() {
    let storage = MemoryStorage::new();
    let store_storage: Arc<dyn KeyValueStorage> = Arc::new(storage.clone());
    let mut store = AppStore::open(store_storage, "slot", PersistConfig::default()).await;

    assert!(store.update_list("ghost", ListPatch::default()).is_err());
    store.flush().await.unwrap();

    assert_eq!(storage.snapshot("slot"), None);
    assert_eq!(store.persist_health().unwrap().written, 0);
}

#[tokio::test]
async fn memory_only_flush_and_shutdown_are_noops() {
    let store = AppStore::new();
    store.flush().await.unwrap();
    assert!(store.shutdown().await.is_none());
}

async fn stored_with_lists(names: &[&str], config: PersistConfig) -> MemoryStorage {
    let storage = MemoryStorage::new();
    let mut store = AppStore::open(Arc::new(storage.clone()), "slot", config).await;
    for name in names {
        store.add_list(NewList::named(*name, "u1")).unwrap();
    }
    store.shutdown().await.unwrap();
    storage
}

#[tokio::test]
async fn open_recovers_from_transient_read_failure() {
    let config = PersistConfig { retries: 3, retry_base_ms: 1 };
    let inner = stored_with_lists(&["Groceries", "Party", "Hardware"], config).await;
    let storage = Arc::new(FlakyStorage::failing_reads(inner.clone(), 1));

    let mut store = AppStore::open(storage, "slot", config).await;
    assert_eq!(store.state().lists.len(), 3);
    store.set_active_group("g1");
    let health = store.shutdown().await.unwrap();
    assert!(health.is_healthy());

    let stored = document::decode(&inner.snapshot("slot").unwrap()).unwrap();
    assert_eq!(stored.lists.len(), 3);
    assert_eq!(stored.active_group_id.as_deref(), Some("g1"));
}

#[tokio::test]
async fn open_never_overwrites_a_slot_it_could_not_read() {
    let config = PersistConfig { retries: 2, retry_base_ms: 1 };
    let inner = stored_with_lists(&["Groceries", "Party", "Hardware"], config).await;
    let storage = Arc::new(FlakyStorage::failing_reads(inner.clone(), usize::MAX));

    let mut store = AppStore::open(storage.clone(), "slot", config).await;
    assert!(store.state().is_empty());
    assert!(!store.persist_health().unwrap().is_healthy());

    store.set_active_group("g1");
    store.flush().await.unwrap();
    let health = store.shutdown().await.unwrap();
    assert_eq!(health.failed, 1);
    assert_eq!(health.written, 0);

    assert_eq!(storage.writes.load(Ordering::SeqCst), 0);
    let stored = document::decode(&inner.snapshot("slot").unwrap()).unwrap();
    assert_eq!(stored.lists.len(), 3);
}
