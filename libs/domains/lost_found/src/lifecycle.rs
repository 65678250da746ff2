//! Status transition table.
//!
//! | from \ to | lost          | found         | returned        |
//! |-----------|---------------|---------------|-----------------|
//! | lost      | no-op         | direct        | requires link   |
//! | found     | direct        | no-op         | link only       |
//! | returned  | unlink only   | unlink only   | no-op           |
//!
//! `direct` edits are applied when asked for but never offered by
//! [`menu`].

use crate::models::ItemStatus;

/// What a requested status edit means for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRule {
    /// Same state, rejected
    NoOp,
    /// `lost -> returned`: the caller must pick a found counterpart
    RequiresLink,
    /// `found -> returned`: only reachable as a side effect of linking
    LinkOnly,
    /// `returned -> lost|found`: only reachable through unlink
    UnlinkOnly,
    /// Plain status write
    Direct,
}

impl TransitionRule {
    /// Explanation used when the rule rejects a bare status edit.
    pub fn rejection_hint(self) -> Option<&'static str> {
        match self {
            Self::NoOp => Some("item already has this status"),
            Self::LinkOnly => Some("found items become returned only by linking to a lost item"),
            Self::UnlinkOnly => Some("returned items go back only by unlinking"),
            Self::RequiresLink | Self::Direct => None,
        }
    }
}

pub fn rule(from: ItemStatus, to: ItemStatus) -> TransitionRule {
    use ItemStatus::*;

    match (from, to) {
        (a, b) if a == b => TransitionRule::NoOp,
        (Lost, Returned) => TransitionRule::RequiresLink,
        (Found, Returned) => TransitionRule::LinkOnly,
        (Returned, _) => TransitionRule::UnlinkOnly,
        (Lost, Found) | (Found, Lost) => TransitionRule::Direct,
        _ => TransitionRule::NoOp,
    }
}

/// Transitions offered to an admin for an item in `from`.
pub fn menu(from: ItemStatus) -> &'static [ItemStatus] {
    match from {
        ItemStatus::Lost => &[ItemStatus::Returned],
        ItemStatus::Found | ItemStatus::Returned => &[],
    }
}
