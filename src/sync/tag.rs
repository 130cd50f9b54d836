//! Control tag detection.
//!
//! A card is managed by mbs when its native query (usually inside a SQL
//! comment) or its description contains the control tag. Matching is an
//! exact substring search: no case folding, no whitespace normalization.

use crate::model::Card;

/// Marker that puts a card under mbs control.
pub const CONTROL_TAG: &str = "## mbs_controlled ##";

/// Whether `text` contains the control tag anywhere.
#[must_use]
pub fn contains_control_tag(text: &str) -> bool {
    text.contains(CONTROL_TAG)
}

/// Whether a card is managed by mbs.
///
/// Checks the native query first, then the description.
#[must_use]
pub fn is_controlled(card: &Card) -> bool {
    card.native_query().is_some_and(contains_control_tag)
        || card.description().is_some_and(contains_control_tag)
}
