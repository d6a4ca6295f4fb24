//! Run status enumeration.
//!
//! Statuses are stored as short strings constrained by a CHECK in
//! `geo_grid_runs`. Only values produced by [`RunStatus::as_str`] are ever
//! written, so unexpected strings cannot reach the column.

/// Lifecycle status of a geo-grid run.
///
/// Transitions are monotonic: `queued -> running -> {done, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl RunStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [RunStatus; 4] = [Self::Queued, Self::Running, Self::Done, Self::Error];

    /// Statuses the orchestrator picks up on each sweep.
    pub const ACTIVE: [RunStatus; 2] = [Self::Queued, Self::Running];

    /// String representation for database storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Parse a stored status; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// `done` and `error` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Statuses from which a run may move to `self`.
    ///
    /// Re-marking a running run as running is allowed so that a run left
    /// `running` by an interrupted sweep can be resumed.
    pub fn allowed_predecessors(self) -> &'static [RunStatus] {
        match self {
            Self::Queued => &[],
            Self::Running => &[Self::Queued, Self::Running],
            Self::Done => &[Self::Running],
            Self::Error => &[Self::Queued, Self::Running],
        }
    }

    /// Whether a run in status `self` may move to `next`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        next.allowed_predecessors().contains(&self)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for status in RunStatus::ALL {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse(" Running "), Some(RunStatus::Running));
        assert_eq!(RunStatus::parse("completed"), None);
    }

    #[test]
    fn transitions_are_monotonic() {
        use RunStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Done));
        assert!(Running.can_transition_to(Error));
        assert!(Queued.can_transition_to(Error));

        assert!(!Running.can_transition_to(Queued));
        assert!(!Done.can_transition_to(Running));
        assert!(!Done.can_transition_to(Error));
        assert!(!Error.can_transition_to(Done));
        assert!(!Queued.can_transition_to(Done));
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for from in RunStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in RunStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }
}
