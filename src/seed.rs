//! First-run sample content.
//!
//! Not part of the store contract: this only fills an empty store so a new
//! install has something to show.

use tracing::info;

use crate::model::{NewGroup, NewItem, NewList, Role, User};
use crate::store::{AppStore, StoreError};

struct SampleItem {
    name: &'static str,
    quantity: Option<f64>,
    unit: Option<&'static str>,
    price: Option<f64>,
    category: &'static str,
    assigned_to: Option<&'static str>,
}

struct SampleList {
    name: &'static str,
    description: &'static str,
    emoji: &'static str,
    budget: Option<f64>,
    members: &'static [&'static str],
    items: &'static [SampleItem],
}

const fn item(
    name: &'static str,
    quantity: f64,
    unit: Option<&'static str>,
    price: Option<f64>,
    category: &'static str,
    assigned_to: Option<&'static str>,
) -> SampleItem {
    SampleItem { name, quantity: Some(quantity), unit, price, category, assigned_to }
}

const GROCERY_ITEMS: &[SampleItem] = &[
    item("Organic Milk", 1.0, Some("gallon"), Some(5.49), "Dairy", Some("1")),
    item("Greek Yogurt", 4.0, Some("cups"), Some(6.0), "Dairy", None),
    item("Sourdough Bread", 1.0, Some("loaf"), Some(4.99), "Bakery", Some("2")),
    item("Bananas", 6.0, None, Some(1.79), "Produce", None),
    item("Chicken Breast", 2.0, Some("lb"), Some(11.98), "Meat", Some("1")),
];

const PARTY_ITEMS: &[SampleItem] = &[
    item("Balloons", 24.0, None, Some(7.99), "Party", Some("3")),
    item("Marshmallows", 2.0, Some("bags"), Some(3.58), "Snacks", None),
    item("Birthday Cake", 1.0, None, None, "Bakery", Some("2")),
];

const SAMPLE_LISTS: &[SampleList] = &[
    SampleList {
        name: "Weekly Groceries",
        description: "Regular household shopping",
        emoji: "🛒",
        budget: Some(150.0),
        members: &["1", "2", "3"],
        items: GROCERY_ITEMS,
    },
    SampleList {
        name: "Emma's Birthday",
        description: "Party supplies for Saturday",
        emoji: "🎉",
        budget: Some(80.0),
        members: &["1", "2"],
        items: PARTY_ITEMS,
    },
];

/// The sample household. The first user becomes the session user.
#[must_use]
pub fn sample_users() -> Vec<User> {
    let user = |id: &str, name: &str, email: &str, color: &str, role: Role| User {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        color: color.into(),
        role,
    };
    vec![
        user("1", "Sarah Johnson", "sarah@example.com", "#4CAF50", Role::Admin),
        user("2", "Mike Johnson", "mike@example.com", "#2196F3", Role::Member),
        user("3", "Emma Johnson", "emma@example.com", "#FF9800", Role::Member),
        user("4", "Alex Chen", "alex@example.com", "#9C27B0", Role::Admin),
    ]
}

/// Populate an empty store.
///
/// Sets the session user when none is set. When the store also has no
/// lists, adds the sample lists and items, then groups pointing at the
/// generated list ids, and activates the first group.
///
/// Returns `true` if anything was added.
///
/// # Errors
///
/// Propagates store errors; none occur with the built-in data.
pub fn seed_if_empty(store: &mut AppStore) -> Result<bool, StoreError> {
    if store.state().current_user.is_some() {
        return Ok(false);
    }

    let users = sample_users();
    let owner = users[0].clone();
    store.set_current_user(owner.clone());

    if !store.state().lists.is_empty() {
        info!(user = %owner.name, "seeded session user");
        return Ok(true);
    }

    let mut list_ids = Vec::with_capacity(SAMPLE_LISTS.len());
    for sample in SAMPLE_LISTS {
        let list = store.add_list(NewList {
            name: sample.name.into(),
            description: Some(sample.description.into()),
            emoji: Some(sample.emoji.into()),
            members: sample.members.iter().map(|id| (*id).to_string()).collect(),
            budget: sample.budget,
            created_by: owner.id.clone(),
            ..NewList::default()
        })?;
        for item in sample.items {
            store.add_item(
                &list.id,
                NewItem {
                    quantity: item.quantity,
                    unit: item.unit.map(str::to_string),
                    price: item.price,
                    category: Some(item.category.into()),
                    assigned_to: item.assigned_to.map(str::to_string),
                    ..NewItem::needed(item.name, owner.id.clone())
                },
            )?;
        }
        list_ids.push(list.id);
    }

    let family = store.add_group(NewGroup {
        name: "Johnson Family".into(),
        members: users[..3].to_vec(),
        lists: list_ids,
        created_by: owner.id.clone(),
    })?;
    store.add_group(NewGroup {
        name: "Office Snacks".into(),
        members: vec![owner.clone(), users[3].clone()],
        lists: Vec::new(),
        created_by: users[3].id.clone(),
    })?;
    store.set_active_group(family.id);

    info!(
        user = %owner.name,
        lists = store.state().lists.len(),
        groups = store.state().groups.len(),
        "seeded sample data"
    );
    Ok(true)
}
