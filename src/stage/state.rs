use serde::{Deserialize, Serialize};

/// Stage lifecycle states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    Unconfigured,
    /// Configured, no edges
    Ready,
    /// Configured, at least one edge
    Bound,
    Stopping,
    Stopped,
    /// Transform returned failure; the stage no longer processes data
    Failed { reason: String },
    /// Configure failed; never bindable
    Invalid { reason: String },
}

impl StageState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &StageState) -> bool {
        use StageState::*;

        matches!(
            (self, target),
            // From Unconfigured
            (Unconfigured, Ready) |
            (Unconfigured, Invalid { .. }) |

            // Edges come and go
            (Ready, Bound) |
            (Bound, Ready) |

            // Failure from either live state
            (Ready, Failed { .. }) |
            (Bound, Failed { .. }) |

            // Teardown
            (Ready, Stopping) |
            (Bound, Stopping) |
            (Failed { .. }, Stopping) |
            (Unconfigured, Stopping) |
            (Stopping, Stopped)
        )
    }

    /// Stages in these states accept new edges
    pub fn is_bindable(&self) -> bool {
        matches!(self, Self::Ready | Self::Bound)
    }

    /// Stages in these states accept pushes
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Bound)
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Unconfigured => "Unconfigured",
            Self::Ready => "Ready",
            Self::Bound => "Bound",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Failed { .. } => "Failed",
            Self::Invalid { .. } => "Invalid",
        }
    }
}

impl Default for StageState {
    fn default() -> Self {
        Self::Unconfigured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let unconfigured = StageState::Unconfigured;
        assert!(unconfigured.can_transition_to(&StageState::Ready));
        assert!(!StageState::Ready.can_transition_to(&StageState::Unconfigured));
    }

    #[test]
    fn test_bound_cycles_with_ready() {
        assert!(StageState::Ready.can_transition_to(&StageState::Bound));
        assert!(StageState::Bound.can_transition_to(&StageState::Ready));
        assert!(StageState::Bound.is_bindable());
    }

    #[test]
    fn test_invalid_is_terminal() {
        let invalid = StageState::Invalid {
            reason: "duplicate slot".to_string(),
        };
        assert!(!invalid.is_bindable());
        assert!(!invalid.can_transition_to(&StageState::Ready));
        assert!(!invalid.can_transition_to(&StageState::Stopping));
    }

    #[test]
    fn test_stopped_only_after_stopping() {
        assert!(!StageState::Ready.can_transition_to(&StageState::Stopped));
        assert!(StageState::Stopping.can_transition_to(&StageState::Stopped));
        assert!(!StageState::Stopped.can_transition_to(&StageState::Ready));
    }
}
