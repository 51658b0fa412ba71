//! Execution order tiers.
//!
//! All constants are built from one fixed [`Order::STEP`]:
//!
//! ```text
//! ROOT            0
//! SYSTEM range    [STEP, 10 * STEP)     privileged only
//! USER range      [10 * STEP, ...)      FIRST .. LAST
//! ```
//!
//! Named points are spaced widely enough that callers can offset from
//! them without colliding with the adjacent tier.

use serde::{Deserialize, Serialize};

/// Execution order of a task. Smaller runs earlier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Order(pub i32);

impl Order {
    /// Distance between adjacent tiers.
    pub const STEP: i32 = 1000;

    /// Reserved lowest value.
    pub const ROOT: Order = Order(0);

    /// First value of the system range.
    pub const SYSTEM_FIRST: Order = Order(Self::STEP);
    /// Built-in clock.
    pub const SYSTEM_CLOCK: Order = Order(2 * Self::STEP);
    /// Built-in event pump.
    pub const SYSTEM_EVENTS: Order = Order(3 * Self::STEP);
    /// Last named point of the system range.
    pub const SYSTEM_LAST: Order = Order(9 * Self::STEP);

    /// First value available to user tasks.
    pub const FIRST: Order = Order(10 * Self::STEP);
    pub const HIGHEST: Order = Order(20 * Self::STEP);
    pub const HIGH: Order = Order(30 * Self::STEP);
    pub const NORMAL: Order = Order(50 * Self::STEP);
    pub const LOW: Order = Order(70 * Self::STEP);
    pub const LOWEST: Order = Order(80 * Self::STEP);
    pub const LAST: Order = Order(90 * Self::STEP);

    /// Get the inner value.
    #[inline]
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Order relative to this one, saturating at the `i32` bounds.
    #[inline]
    pub fn offset(
        self,
        delta: i32,
    ) -> Order {
        Order(self.0.saturating_add(delta))
    }

    /// Check if this order lies in the reserved range (below [`Order::FIRST`]).
    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.0 < Self::FIRST.0
    }
}

impl From<i32> for Order {
    fn from(val: i32) -> Self {
        Order(val)
    }
}

impl std::fmt::Display for Order {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
