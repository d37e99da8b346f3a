use super::error::{PlanError, PlanResult};
use super::models::{PlanEntry, SegmentKey, SegmentRef};

/// Expands explanation variants and repeat counts into playback order.
///
/// For each mergeable entry: the explanation segment (when requested), then the
/// main segment `max(repeat_count, 1)` times.
pub fn flatten(entries: &[PlanEntry]) -> PlanResult<Vec<SegmentRef>> {
    let mut flat = Vec::new();
    for entry in entries.iter().filter(|entry| entry.is_mergeable()) {
        let code = entry.asana_code.trim();
        if entry.show_explanation_video {
            flat.push(SegmentKey::explanation(code));
        }
        for _ in 0..entry.effective_repeat() {
            flat.push(SegmentKey::main(code));
        }
    }
    if flat.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(flat
        .into_iter()
        .enumerate()
        .map(|(position, key)| SegmentRef { key, position })
        .collect())
}

/// Distinct fetch keys in first-occurrence order.
pub fn unique_keys(segments: &[SegmentRef]) -> Vec<SegmentKey> {
    let mut seen = std::collections::HashSet::new();
    segments
        .iter()
        .filter(|segment| seen.insert(segment.key.clone()))
        .map(|segment| segment.key.clone())
        .collect()
}
