//! Per-pair measurement event state machine shared by A3/A4/A5/D2.
//!
//! Each event type supplies a `TriggerCondition` that answers "is the entry
//! condition satisfied at this sample index"; the state machine itself only
//! knows about time-to-trigger (TTT) and the four states from spec.md §4.6.
//! Generalizing this way means A3/A4/A5/D2 share one state machine instead
//! of four near-identical copies.

use chrono::{DateTime, Utc};

/// Implemented once per event type. `is_entered` evaluates the raw
/// condition (offset/threshold comparison, or the D2 distance test); the
/// state machine handles timing and hysteresis by re-polling it every
/// sample rather than requiring the condition itself to be stateful.
pub trait TriggerCondition {
    fn is_entered(&self, index: usize) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Idle,
    PendingEnter,
    Active,
    PendingLeave,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TriggerRecord {
    pub trigger_time: DateTime<Utc>,
    pub trigger_index: usize,
    pub release_time: Option<DateTime<Utc>>,
    pub release_index: Option<usize>,
}

/// Runs the four-state machine across `times`, consulting `condition` at
/// every index. A condition that has held continuously for at least
/// `time_to_trigger_ms` confirms the event (`Active`); once the condition
/// stops holding, a release is recorded only after it has continuously
/// failed for the same TTT window (symmetric hysteresis), matching 3GPP's
/// time-to-trigger semantics for both entry and leaving conditions.
pub fn run_state_machine<C: TriggerCondition>(
    times: &[DateTime<Utc>],
    condition: &C,
    time_to_trigger_ms: i64,
) -> Vec<TriggerRecord> {
    let mut records = Vec::new();
    let mut state = PairState::Idle;
    let mut pending_since_index = 0usize;
    let mut active_record: Option<TriggerRecord> = None;

    for (index, &time) in times.iter().enumerate() {
        let entered = condition.is_entered(index);

        state = match (state, entered) {
            (PairState::Idle, true) => {
                pending_since_index = index;
                PairState::PendingEnter
            }
            (PairState::Idle, false) => PairState::Idle,

            (PairState::PendingEnter, true) => {
                let elapsed_ms = (time - times[pending_since_index]).num_milliseconds();
                if elapsed_ms >= time_to_trigger_ms {
                    active_record = Some(TriggerRecord {
                        trigger_time: time,
                        trigger_index: index,
                        release_time: None,
                        release_index: None,
                    });
                    PairState::Active
                } else {
                    PairState::PendingEnter
                }
            }
            (PairState::PendingEnter, false) => PairState::Idle,

            (PairState::Active, true) => PairState::Active,
            (PairState::Active, false) => {
                pending_since_index = index;
                PairState::PendingLeave
            }

            (PairState::PendingLeave, false) => {
                let elapsed_ms = (time - times[pending_since_index]).num_milliseconds();
                if elapsed_ms >= time_to_trigger_ms {
                    if let Some(mut record) = active_record.take() {
                        record.release_time = Some(time);
                        record.release_index = Some(index);
                        records.push(record);
                    }
                    PairState::Idle
                } else {
                    PairState::PendingLeave
                }
            }
            (PairState::PendingLeave, true) => PairState::Active,
        };
    }

    if let Some(record) = active_record {
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FixedCondition {
        entered: Vec<bool>,
    }

    impl TriggerCondition for FixedCondition {
        fn is_entered(&self, index: usize) -> bool {
            self.entered[index]
        }
    }

    fn times(count: usize, step_seconds: i64) -> Vec<DateTime<Utc>> {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        (0..count).map(|i| base + Duration::seconds(i as i64 * step_seconds)).collect()
    }

    #[test]
    fn confirms_at_sample_index_three_with_ttt_of_three_samples() {
        // 30s samples, TTT = 90s (3 samples): condition true from index 0.
        let times = times(6, 30);
        let condition = FixedCondition {
            entered: vec![true, true, true, true, true, true],
        };
        let records = run_state_machine(&times, &condition, 90_000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger_index, 3);
    }

    #[test]
    fn never_confirms_if_condition_drops_before_ttt_elapses() {
        let times = times(6, 30);
        let condition = FixedCondition {
            entered: vec![true, true, false, true, true, true],
        };
        let records = run_state_machine(&times, &condition, 90_000);
        // Condition restarts at index 3, needs to hold through index 6 which
        // does not exist in this 6-sample window (0..=5), so it never
        // accumulates a full 90s of continuous holding after the reset.
        assert!(records.is_empty());
    }

    #[test]
    fn release_requires_condition_to_fail_for_full_ttt() {
        let times = times(8, 30);
        let condition = FixedCondition {
            entered: vec![true, true, true, true, false, true, false, false],
        };
        let records = run_state_machine(&times, &condition, 90_000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger_index, 3);
        assert_eq!(records[0].release_index, Some(7));
    }

    #[test]
    fn still_active_record_without_release_is_still_reported() {
        let times = times(4, 30);
        let condition = FixedCondition {
            entered: vec![true, true, true, true],
        };
        let records = run_state_machine(&times, &condition, 90_000);
        assert_eq!(records.len(), 1);
        assert!(records[0].release_time.is_none());
    }
}
