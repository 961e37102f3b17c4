use crate::domain::model::Amount;
use std::collections::BTreeSet;

/// Periodic milestone granularity: one million won.
pub const MILESTONE_UNIT: Amount = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingEvent {
    Milestone(Amount),
    Threshold(Amount),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub events: Vec<FundingEvent>,
    pub new_initial_funding: Amount,
    pub remaining_thresholds: BTreeSet<Amount>,
}

impl Evaluation {
    pub fn milestone(&self) -> Option<Amount> {
        self.events.iter().find_map(|event| match event {
            FundingEvent::Milestone(value) => Some(*value),
            FundingEvent::Threshold(_) => None,
        })
    }

    pub fn crossed_thresholds(&self) -> impl Iterator<Item = Amount> + '_ {
        self.events.iter().filter_map(|event| match event {
            FundingEvent::Threshold(value) => Some(*value),
            FundingEvent::Milestone(_) => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdEngine {
    unit: Amount,
}

impl Default for ThresholdEngine {
    fn default() -> Self {
        Self { unit: MILESTONE_UNIT }
    }
}

impl ThresholdEngine {
    pub fn new(unit: Amount) -> Self {
        Self { unit: unit.max(1) }
    }

    pub fn unit(&self) -> Amount {
        self.unit
    }

    /// At most one milestone fires per call, even when funding jumped past several.
    /// Crossed thresholds are consumed and never re-armed.
    pub fn evaluate(
        &self,
        previous_initial_funding: Amount,
        current_funding: Amount,
        thresholds: &BTreeSet<Amount>,
    ) -> Evaluation {
        let mut events = Vec::new();
        let mut new_initial_funding = previous_initial_funding;

        if current_funding > previous_initial_funding {
            let base = (previous_initial_funding / self.unit) * self.unit;
            let next = base.saturating_add(self.unit);
            if current_funding >= next && next > previous_initial_funding {
                events.push(FundingEvent::Milestone(next));
                new_initial_funding = next;
            }
        }

        let mut remaining_thresholds = BTreeSet::new();
        for &threshold in thresholds {
            if current_funding >= threshold {
                events.push(FundingEvent::Threshold(threshold));
            } else {
                remaining_thresholds.insert(threshold);
            }
        }

        Evaluation {
            events,
            new_initial_funding,
            remaining_thresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[Amount]) -> BTreeSet<Amount> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_crossing_next_milestone() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(900_000, 1_050_000, &BTreeSet::new());

        assert_eq!(result.events, vec![FundingEvent::Milestone(1_000_000)]);
        assert_eq!(result.new_initial_funding, 1_000_000);
    }

    #[test]
    fn test_custom_threshold_consumed() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(2_900_000, 3_000_000, &set(&[2_000_000, 5_000_000]));

        assert_eq!(result.events, vec![FundingEvent::Threshold(2_000_000)]);
        assert_eq!(result.remaining_thresholds, set(&[5_000_000]));
        assert_eq!(result.new_initial_funding, 2_900_000);
    }

    #[test]
    fn test_only_one_milestone_per_call_on_large_jump() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(900_000, 4_500_000, &BTreeSet::new());

        assert_eq!(result.events, vec![FundingEvent::Milestone(1_000_000)]);
        assert_eq!(result.new_initial_funding, 1_000_000);

        let second = engine.evaluate(result.new_initial_funding, 4_500_000, &BTreeSet::new());
        assert_eq!(second.events, vec![FundingEvent::Milestone(2_000_000)]);
    }

    #[test]
    fn test_no_milestone_when_funding_flat_or_down() {
        let engine = ThresholdEngine::default();
        assert!(engine.evaluate(1_000_000, 1_000_000, &BTreeSet::new()).events.is_empty());
        assert!(engine.evaluate(1_500_000, 1_200_000, &BTreeSet::new()).events.is_empty());
    }

    #[test]
    fn test_exact_milestone_start_does_not_refire() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(1_000_000, 1_999_999, &BTreeSet::new());
        assert!(result.events.is_empty());
        assert_eq!(result.new_initial_funding, 1_000_000);
    }

    #[test]
    fn test_thresholds_fire_even_when_funding_dropped() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(3_000_000, 2_500_000, &set(&[2_000_000]));
        assert_eq!(result.events, vec![FundingEvent::Threshold(2_000_000)]);
        assert!(result.remaining_thresholds.is_empty());
    }

    #[test]
    fn test_milestone_and_thresholds_in_same_cycle() {
        let engine = ThresholdEngine::default();
        let result = engine.evaluate(950_000, 1_200_000, &set(&[1_100_000, 1_150_000, 9_000_000]));

        assert_eq!(result.milestone(), Some(1_000_000));
        assert_eq!(
            result.crossed_thresholds().collect::<Vec<_>>(),
            vec![1_100_000, 1_150_000]
        );
        assert_eq!(result.remaining_thresholds, set(&[9_000_000]));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let engine = ThresholdEngine::default();
        let thresholds = set(&[1_000_000, 2_000_000, 7_000_000]);
        let first = engine.evaluate(900_000, 1_400_000, &thresholds);
        assert_eq!(first.milestone(), Some(1_000_000));
        assert_eq!(first.crossed_thresholds().collect::<Vec<_>>(), vec![1_000_000]);

        let second = engine.evaluate(
            first.new_initial_funding,
            1_400_000,
            &first.remaining_thresholds,
        );
        assert!(second.events.is_empty());
        assert_eq!(second.new_initial_funding, first.new_initial_funding);
        assert_eq!(second.remaining_thresholds, set(&[2_000_000, 7_000_000]));
    }

    #[test]
    fn test_removed_threshold_never_rearms() {
        let engine = ThresholdEngine::default();
        let first = engine.evaluate(0, 2_100_000, &set(&[2_000_000, 3_000_000]));
        assert_eq!(first.remaining_thresholds, set(&[3_000_000]));

        let dipped = engine.evaluate(first.new_initial_funding, 1_500_000, &first.remaining_thresholds);
        let recovered = engine.evaluate(dipped.new_initial_funding, 2_100_000, &dipped.remaining_thresholds);
        assert!(recovered.crossed_thresholds().next().is_none());
    }

    #[test]
    fn test_milestone_value_property() {
        let engine = ThresholdEngine::default();
        let samples = [
            (0, 1),
            (0, 999_999),
            (1, 1_000_000),
            (999_999, 1_000_000),
            (1_000_000, 2_000_000),
            (1_234_567, 2_345_678),
            (5_500_000, 80_000_000),
        ];

        for (previous, current) in samples {
            let result = engine.evaluate(previous, current, &BTreeSet::new());
            let expected = (previous / MILESTONE_UNIT) * MILESTONE_UNIT + MILESTONE_UNIT;
            let milestones: Vec<_> = result
                .events
                .iter()
                .filter(|e| matches!(e, FundingEvent::Milestone(_)))
                .collect();
            assert!(milestones.len() <= 1);
            if let Some(FundingEvent::Milestone(value)) = milestones.first() {
                assert_eq!(*value, expected);
            } else {
                assert!(current < expected);
            }
        }
    }

    #[test]
    fn test_custom_unit() {
        let engine = ThresholdEngine::new(500);
        let result = engine.evaluate(700, 1_020, &BTreeSet::new());
        assert_eq!(result.milestone(), Some(1_000));
    }
}
