//! Deterministic budget allocation across batch items.
//!
//! Both allocators are total functions: floor division, a non-negative
//! per-item share, and no redistribution of the remainder.

use serde::Serialize;

/// A fixed token budget split evenly across N items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenAllocation {
    /// The total budget being divided.
    pub total: u32,
    /// Floor share per item.
    pub per_item: u32,
    /// Number of items the budget was split across.
    pub n_items: usize,
}

impl TokenAllocation {
    /// Split `total` across `n_items`.
    ///
    /// With `n_items == 0` the degenerate share is `total` itself; the
    /// caller has nothing to iterate, so the value is only ever displayed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn split(total: u32, n_items: usize) -> Self {
        let divisor = n_items.max(1) as u32;
        Self {
            total,
            per_item: total / divisor,
            n_items,
        }
    }
}

/// A comment budget split across N posts, additionally capped by the
/// provider's per-request ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentAllocation {
    /// The total budget being divided.
    pub total: u32,
    /// Floor share per post, before the request cap. This is the value
    /// shown in user-facing accounting.
    pub per_item: u32,
    /// The share actually requested from the provider.
    pub per_item_capped: u32,
    /// Number of posts the budget was split across.
    pub n_items: usize,
}

impl CommentAllocation {
    /// Split `total` across `n_items`, capping each share at `request_cap`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn split(total: u32, n_items: usize, request_cap: u32) -> Self {
        let divisor = n_items.max(1) as u32;
        let per_item = total / divisor;
        Self {
            total,
            per_item,
            per_item_capped: per_item.min(request_cap),
            n_items,
        }
    }
}
