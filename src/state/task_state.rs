/// Download task state definitions
use std::fmt;

/// Lifecycle of one (file, mirror) transfer
///
/// `Queued -> Admitted -> Transferring -> Completed | Failed`, or
/// `Queued -> Cancelling -> Cancelled` when the stop signal arrives before the
/// task is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for a slot on its mirror
    Queued,

    /// Holds a mirror slot, transfer not yet started
    Admitted,

    /// Bytes are moving
    Transferring,

    /// File written to its destination
    Completed,

    /// Transfer failed (network, status, timeout or I/O)
    Failed,

    /// Stop signal observed, abandoning before transfer
    Cancelling,

    /// Abandoned without transferring
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task occupies a mirror admission slot
    pub fn holds_slot(&self) -> bool {
        matches!(self, Self::Admitted | Self::Transferring)
    }

    /// Returns true for outcomes that count toward the rotation interval
    pub fn counts_as_completion(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, next),
            (Queued, Admitted)
                | (Admitted, Transferring)
                | (Transferring, Completed)
                | (Transferring, Failed)
                | (Admitted, Failed)
                | (Queued, Cancelling)
                | (Cancelling, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
