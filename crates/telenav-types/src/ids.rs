//! Typed identifiers for users, messages, blocks and pages.
//!
//! All ID types wrap an `i64`. Storage backends hand them out; `0` is the
//! "none" sentinel (the root call runs with block and page both `NONE`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A chat user identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

/// A chat message identifier, assigned by the messenger.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

/// A block identifier, assigned by the store.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(i64);

/// A page identifier, assigned by the store.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(i64);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// The "none" sentinel.
            pub const NONE: Self = Self(0);

            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw integer value.
            pub const fn get(&self) -> i64 {
                self.0
            }

            pub const fn is_none(&self) -> bool {
                self.0 == 0
            }

            /// True for ids a store could have assigned (strictly positive).
            pub const fn is_assigned(&self) -> bool {
                self.0 > 0
            }

            /// `Some(self)` unless this is the sentinel.
            pub fn non_zero(self) -> Option<Self> {
                if self.is_none() { None } else { Some(self) }
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for i64 {
            fn from(id: $T) -> i64 {
                id.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(MessageId, "MessageId");
impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(PageId, "PageId");
