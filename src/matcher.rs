use std::num::NonZeroU32;

use crate::normalize::{normalize_text, SearchResultEntry};

pub type Rank = NonZeroU32;

/// Two places sharing a display name can match each other in the name pass;
/// that ambiguity is accepted.
pub fn find_rank(results: &[SearchResultEntry], target_id: &str, target_name: &str) -> Option<Rank> {
    let target_id = target_id.trim();
    if !target_id.is_empty() {
        if let Some(index) = results
            .iter()
            .position(|entry| entry.has_id() && entry.id == target_id)
        {
            return to_rank(index);
        }
    }

    let target_name = normalize_text(target_name);
    if target_name.is_empty() {
        return None;
    }
    results
        .iter()
        .position(|entry| normalize_text(&entry.name) == target_name)
        .and_then(to_rank)
}

fn to_rank(index: usize) -> Option<Rank> {
    u32::try_from(index + 1).ok().and_then(NonZeroU32::new)
}
