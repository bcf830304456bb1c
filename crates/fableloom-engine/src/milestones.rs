//! Milestone step placement.

use crate::state::MilestoneId;

/// The three milestone steps of a story with a fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestones {
    pub m2: i32,
    pub m6: i32,
    pub m7: i32,
}

impl Milestones {
    /// Computes milestone placement for an `n`-step story.
    ///
    /// `m6` and `m7` land at 65% and 80% of the way through, rounded
    /// half-to-even; when they collide, `m7` is bumped one step later but
    /// never past the last step.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn for_total_steps(n: i32) -> Self {
        let last = f64::from(n - 1);
        let m6 = (0.65 * last).round_ties_even() as i32;
        let mut m7 = (0.80 * last).round_ties_even() as i32;
        if m6 == m7 {
            m7 = (n - 1).min(m7 + 1);
        }
        Self { m2: 2, m6, m7 }
    }

    /// The milestone at the given step, if any. `m2` wins if placements
    /// overlap.
    #[must_use]
    pub fn milestone_at(self, step0: i32) -> Option<MilestoneId> {
        if step0 == self.m2 {
            Some(MilestoneId::M2)
        } else if step0 == self.m6 {
            Some(MilestoneId::M6)
        } else if step0 == self.m7 {
            Some(MilestoneId::M7)
        } else {
            None
        }
    }
}
