//! Delta normalization and application.

use std::collections::BTreeMap;

use crate::content::{Delta, StepType};
use crate::state::TraitId;

/// Per-delta magnitude cap, before the per-step budget applies.
const DELTA_CAP: i32 = 2;

/// At most this many declared deltas are honored per turn.
const MAX_DELTAS: usize = 2;

/// Trait values are clamped to this inclusive range.
pub(crate) fn clamp_trait(value: i32) -> i32 {
    value.clamp(0, 10)
}

/// Normalizes declared deltas for one turn.
///
/// Keeps at most two deltas, clamps each to `[-2, 2]`, zeroes negative core
/// deltas when they come from a choice (free-text-driven deltas may go
/// negative), then reduces magnitudes in order until the sum of absolute
/// deltas fits the step's budget. Deltas reduced to zero are dropped.
///
/// The second return value reports whether anything was altered or dropped
/// relative to the declared list.
#[must_use]
pub fn normalize_deltas(
    deltas: &[Delta],
    step_type: StepType,
    from_choice: bool,
) -> (Vec<Delta>, bool) {
    let mut normalized: Vec<Delta> = deltas
        .iter()
        .take(MAX_DELTAS)
        .map(|d| {
            let mut value = d.delta.clamp(-DELTA_CAP, DELTA_CAP);
            if from_choice && d.trait_id.is_core() && value < 0 {
                value = 0;
            }
            Delta {
                trait_id: d.trait_id,
                delta: value,
            }
        })
        .collect();

    let budget = step_type.delta_budget();
    let sum_abs: i32 = normalized.iter().map(|d| d.delta.abs()).sum();
    if sum_abs > budget {
        let mut remaining = budget;
        for entry in &mut normalized {
            let value = entry.delta;
            let adjusted = if remaining <= 0 || value == 0 {
                0
            } else {
                let magnitude = value.abs().min(remaining);
                if value < 0 { -magnitude } else { magnitude }
            };
            entry.delta = adjusted;
            remaining -= adjusted.abs();
        }
    }

    normalized.retain(|d| d.delta != 0);
    let clamped = normalized != deltas;
    (normalized, clamped)
}

/// Applies deltas to a trait vector, clamping each result to `[0, 10]`.
#[must_use]
pub fn apply_deltas(traits: &BTreeMap<TraitId, i32>, deltas: &[Delta]) -> BTreeMap<TraitId, i32> {
    let mut updated = traits.clone();
    for delta in deltas {
        let current = updated.get(&delta.trait_id).copied().unwrap_or(0);
        updated.insert(delta.trait_id, clamp_trait(current + delta.delta));
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(trait_id: TraitId, value: i32) -> Delta {
        Delta {
            trait_id,
            delta: value,
        }
    }

    #[test]
    fn test_untouched_deltas_are_not_flagged() {
        let declared = vec![delta(TraitId::T1, 1)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Normal, true);

        assert_eq!(applied, declared);
        assert!(!clamped);
    }

    #[test]
    fn test_per_delta_magnitude_cap() {
        let declared = vec![delta(TraitId::T1, 4)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Heavy, true);

        assert_eq!(applied, vec![delta(TraitId::T1, 2)]);
        assert!(clamped);
    }

    #[test]
    fn test_choice_cannot_lower_core_traits() {
        let declared = vec![delta(TraitId::T2, -2)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Normal, true);

        assert!(applied.is_empty());
        assert!(clamped);
    }

    #[test]
    fn test_choice_may_lower_chaos_trait() {
        let declared = vec![delta(TraitId::T6, -2)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Normal, true);

        assert_eq!(applied, vec![delta(TraitId::T6, -2)]);
        assert!(!clamped);
    }

    #[test]
    fn test_free_text_deltas_may_go_negative() {
        let declared = vec![delta(TraitId::T2, -2)];

        let (applied, _) = normalize_deltas(&declared, StepType::Normal, false);

        assert_eq!(applied, vec![delta(TraitId::T2, -2)]);
    }

    #[test]
    fn test_heavy_budget_keeps_two_full_deltas() {
        let declared = vec![delta(TraitId::T1, 2), delta(TraitId::T2, 2)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Heavy, true);

        assert_eq!(applied, declared);
        assert!(!clamped);
    }

    #[test]
    fn test_normal_budget_reduces_sum_of_magnitudes() {
        let declared = vec![delta(TraitId::T1, 2), delta(TraitId::T2, 2)];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Normal, true);

        let sum: i32 = applied.iter().map(|d| d.delta.abs()).sum();
        assert!(sum <= StepType::Normal.delta_budget());
        assert!(clamped);
    }

    #[test]
    fn test_third_delta_is_ignored() {
        let declared = vec![
            delta(TraitId::T1, 1),
            delta(TraitId::T2, 1),
            delta(TraitId::T3, 1),
        ];

        let (applied, clamped) = normalize_deltas(&declared, StepType::Heavy, true);

        assert_eq!(applied.len(), 2);
        assert!(clamped);
    }

    #[test]
    fn test_apply_deltas_clamps_to_trait_range() {
        let mut traits: BTreeMap<TraitId, i32> =
            TraitId::ALL.iter().map(|t| (*t, 5)).collect();
        traits.insert(TraitId::T1, 10);
        traits.insert(TraitId::T2, 0);

        let updated = apply_deltas(
            &traits,
            &[delta(TraitId::T1, 2), delta(TraitId::T2, -2)],
        );

        assert_eq!(updated[&TraitId::T1], 10);
        assert_eq!(updated[&TraitId::T2], 0);
    }
}
