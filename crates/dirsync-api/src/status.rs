//! Observed status: phase, observed generation and condition records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse lifecycle status of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Ready,
    Failed,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Pending, Phase::Ready, Phase::Failed];

    /// Condition type that mirrors this phase.
    pub fn condition_type(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.condition_type())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single timestamped observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

/// Status block owned by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// DN last applied to the directory, used for cleanup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinguished_name: Option<String>,
}

impl Status {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or update a condition.
    ///
    /// The transition time only moves when the truth value changes; reason,
    /// message and generation are always refreshed. Returns `true` if anything
    /// changed.
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        observed_generation: i64,
        now: DateTime<Utc>,
    ) -> bool {
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                let mut changed = false;
                if existing.status != status {
                    existing.status = status;
                    existing.last_transition_time = now;
                    changed = true;
                }
                if existing.reason != reason {
                    existing.reason = reason.to_string();
                    changed = true;
                }
                if existing.message != message {
                    existing.message = message.to_string();
                    changed = true;
                }
                if existing.observed_generation != observed_generation {
                    existing.observed_generation = observed_generation;
                    changed = true;
                }
                changed
            }
            None => {
                self.conditions.push(Condition {
                    type_: type_.to_string(),
                    status,
                    reason: reason.to_string(),
                    message: message.to_string(),
                    observed_generation,
                    last_transition_time: now,
                });
                true
            }
        }
    }

    /// Move to `phase` for `generation`.
    ///
    /// Sets the phase, records the generation and flips the phase conditions so
    /// that only the current phase's condition is `True`. Returns `true` if the
    /// status changed.
    pub fn mark(&mut self, phase: Phase, generation: i64, reason: &str, message: &str) -> bool {
        let now = Utc::now();
        let mut changed = self.phase != Some(phase) || self.observed_generation != generation;
        self.phase = Some(phase);
        self.observed_generation = generation;

        for other in Phase::ALL {
            if other == phase {
                changed |= self.set_condition(
                    phase.condition_type(),
                    ConditionStatus::True,
                    reason,
                    message,
                    generation,
                    now,
                );
            } else if let Some(existing) = self
                .conditions
                .iter()
                .find(|c| c.type_ == other.condition_type())
            {
                let reason = existing.reason.clone();
                let message = existing.message.clone();
                changed |= self.set_condition(
                    other.condition_type(),
                    ConditionStatus::False,
                    &reason,
                    &message,
                    generation,
                    now,
                );
            }
        }
        changed
    }

    /// Whether this status reports `Ready` for `generation`.
    pub fn is_ready_for(&self, generation: i64) -> bool {
        self.phase == Some(Phase::Ready) && self.observed_generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_sets_phase_and_condition() {
        let mut status = Status::default();
        assert!(status.mark(Phase::Pending, 1, "Pending", "waiting for directory"));

        assert_eq!(status.phase, Some(Phase::Pending));
        assert_eq!(status.observed_generation, 1);
        let pending = status.condition("Pending").unwrap();
        assert_eq!(pending.status, ConditionStatus::True);
        assert_eq!(pending.message, "waiting for directory");
    }

    #[test]
    fn test_mark_flips_previous_phase_condition() {
        let mut status = Status::default();
        status.mark(Phase::Pending, 1, "Pending", "waiting");
        status.mark(Phase::Ready, 1, "Ready", "entry is ready");

        assert_eq!(
            status.condition("Pending").unwrap().status,
            ConditionStatus::False
        );
        assert_eq!(
            status.condition("Ready").unwrap().status,
            ConditionStatus::True
        );
        assert!(status.condition("Failed").is_none());
        assert!(status.is_ready_for(1));
        assert!(!status.is_ready_for(2));
    }

    #[test]
    fn test_mark_is_idempotent() {
        let mut status = Status::default();
        assert!(status.mark(Phase::Ready, 3, "Ready", "entry is ready"));
        let first = status.condition("Ready").unwrap().last_transition_time;

        assert!(!status.mark(Phase::Ready, 3, "Ready", "entry is ready"));
        assert_eq!(
            status.condition("Ready").unwrap().last_transition_time,
            first
        );
    }

    #[test]
    fn test_transition_time_only_moves_on_status_change() {
        let mut status = Status::default();
        let t0 = Utc::now();
        status.set_condition("Failed", ConditionStatus::True, "Failed", "a", 1, t0);

        let t1 = t0 + chrono::Duration::seconds(10);
        assert!(status.set_condition("Failed", ConditionStatus::True, "Failed", "b", 1, t1));
        assert_eq!(status.condition("Failed").unwrap().last_transition_time, t0);

        assert!(status.set_condition("Failed", ConditionStatus::False, "Failed", "b", 1, t1));
        assert_eq!(status.condition("Failed").unwrap().last_transition_time, t1);
    }

    #[test]
    fn test_condition_serializes_type_field() {
        let mut status = Status::default();
        status.mark(Phase::Failed, 2, "Failed", "boom");
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["phase"], "Failed");
        assert_eq!(json["observedGeneration"], 2);
        assert_eq!(json["conditions"][0]["type"], "Failed");
        assert_eq!(json["conditions"][0]["status"], "True");
    }
}
