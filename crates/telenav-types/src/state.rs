//! State items and the four scopes they live in.
//!
//! A value is addressed by a [`StateKey`]: the declared value type tag plus an
//! optional name, so two handlers asking for "a `String` named `filter`" see the
//! same slot. Values are kept serialized as JSON; [`StateValue`] bridges them
//! back to Rust types.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{MessageId, PageId, UserId};

/// Which scope a state value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum StateKind {
    /// One page.
    Local,
    /// One block, keyed by its message id.
    Shared,
    /// One user.
    User,
    /// Everybody.
    Global,
}

impl StateKind {
    pub const ALL: [StateKind; 4] = [
        StateKind::Local,
        StateKind::Shared,
        StateKind::User,
        StateKind::Global,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Local => "local",
            StateKind::Shared => "shared",
            StateKind::User => "user",
            StateKind::Global => "global",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage address of one state set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateScope {
    Local(PageId),
    Shared { user: UserId, message: MessageId },
    User(UserId),
    Global,
}

impl StateScope {
    pub fn kind(&self) -> StateKind {
        match self {
            StateScope::Local(_) => StateKind::Local,
            StateScope::Shared { .. } => StateKind::Shared,
            StateScope::User(_) => StateKind::User,
            StateScope::Global => StateKind::Global,
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateScope::Local(page) => write!(f, "local(page={page})"),
            StateScope::Shared { user, message } => {
                write!(f, "shared(user={user}, message={message})")
            }
            StateScope::User(user) => write!(f, "user({user})"),
            StateScope::Global => f.write_str("global"),
        }
    }
}

// ============================================================================
// Typed values
// ============================================================================

/// A Rust type that can live in a state scope.
///
/// `TYPE_TAG` is persisted, so it must stay stable across releases.
pub trait StateValue: Serialize + DeserializeOwned {
    const TYPE_TAG: &'static str;
}

/// Implement [`StateValue`] for a serde type with the given stable tag.
///
/// ```
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Cursor { offset: u32 }
/// telenav_types::state_value!(Cursor, "cursor");
/// ```
#[macro_export]
macro_rules! state_value {
    ($T:ty, $tag:literal) => {
        impl $crate::StateValue for $T {
            const TYPE_TAG: &'static str = $tag;
        }
    };
}

state_value!(String, "string");
state_value!(bool, "bool");
state_value!(i32, "i32");
state_value!(i64, "i64");
state_value!(u32, "u32");
state_value!(u64, "u64");
state_value!(f64, "f64");
state_value!(Vec<String>, "string_list");
state_value!(Vec<i64>, "i64_list");

// ============================================================================
// Keys and items
// ============================================================================

/// Address of one value inside a scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StateKey {
    pub fn new(type_tag: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            type_tag: type_tag.into(),
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
        }
    }

    /// Key for a typed value, optionally named.
    pub fn of<T: StateValue>(name: Option<&str>) -> Self {
        Self::new(T::TYPE_TAG, name)
    }

    pub fn named<T: StateValue>(name: &str) -> Self {
        Self::of::<T>(Some(name))
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.type_tag, name),
            None => f.write_str(&self.type_tag),
        }
    }
}

/// One serialized value with its key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateItem {
    pub key: StateKey,
    pub value: serde_json::Value,
}

impl StateItem {
    pub fn new(key: StateKey, value: serde_json::Value) -> Self {
        Self { key, value }
    }

    /// Serialize a typed value under its derived key.
    pub fn of<T: StateValue>(name: Option<&str>, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            key: StateKey::of::<T>(name),
            value: serde_json::to_value(value)?,
        })
    }

    /// Decode the value as `T`.
    pub fn decode<T: StateValue>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

/// Ordered set of state items with unique keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDef {
    items: Vec<StateItem>,
}

impl StateDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from items; a repeated key overwrites the earlier value in place.
    pub fn from_items(items: impl IntoIterator<Item = StateItem>) -> Self {
        let mut def = Self::new();
        for item in items {
            def.insert(item);
        }
        def
    }

    /// Single typed value.
    pub fn single<T: StateValue>(name: Option<&str>, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_items([StateItem::of(name, value)?]))
    }

    pub fn with_item(mut self, item: StateItem) -> Self {
        self.insert(item);
        self
    }

    /// Insert or replace; returns the previous value for the key.
    pub fn insert(&mut self, item: StateItem) -> Option<serde_json::Value> {
        match self.items.iter_mut().find(|i| i.key == item.key) {
            Some(existing) => Some(std::mem::replace(&mut existing.value, item.value)),
            None => {
                self.items.push(item);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &StateKey) -> Option<serde_json::Value> {
        let pos = self.items.iter().position(|i| &i.key == key)?;
        Some(self.items.remove(pos).value)
    }

    pub fn get(&self, key: &StateKey) -> Option<&serde_json::Value> {
        self.items.iter().find(|i| &i.key == key).map(|i| &i.value)
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.get(key).is_some()
    }

    pub fn items(&self) -> &[StateItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<StateItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<StateItem> for StateDef {
    fn from_iter<I: IntoIterator<Item = StateItem>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

/// Merge two state sets; on a shared key `priority1` wins.
///
/// Keys of `priority1` come first in their original order, followed by the
/// keys only `priority2` has.
pub fn merge(priority1: &StateDef, priority2: &StateDef) -> StateDef {
    let mut merged = priority1.clone();
    for item in priority2.items() {
        if !merged.contains(&item.key) {
            merged.items.push(item.clone());
        }
    }
    merged
}
