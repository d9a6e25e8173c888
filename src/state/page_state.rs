/// Unit-of-work state definitions for the crawl
///
/// Every page the crawl touches (product, version, download page) moves
/// through these states exactly once.
use std::fmt;

/// Represents the current state of a crawl unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageState {
    // ===== Active States =====
    /// Link has been discovered but not yet requested
    Discovered,

    /// Page request is in flight
    Fetching,

    /// Page was fetched and its identity established
    Resolved,

    /// Child links or table rows have been extracted
    Expanded,

    // ===== Terminal States =====
    /// All children have been handled
    Done,

    /// Fetch failed or the page duplicated one already handled
    Skipped,

    /// Stop signal observed before the unit finished
    Cancelled,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Cancelled)
    }

    /// Returns true if this is an active state (unit may still be processed)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the transition `self -> next` is legal
    ///
    /// Forward progress is linear; any active state may end in `Skipped` or
    /// `Cancelled`. Terminal states never change.
    pub fn can_transition_to(&self, next: PageState) -> bool {
        use PageState::*;

        match (self, next) {
            (Discovered, Fetching)
            | (Fetching, Resolved)
            | (Resolved, Expanded)
            | (Expanded, Done) => true,
            (Resolved, Done) => true,
            (from, Skipped | Cancelled) => from.is_active(),
            _ => false,
        }
    }

    /// Returns the lowercase name used in logs and statistics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Fetching => "fetching",
            Self::Resolved => "resolved",
            Self::Expanded => "expanded",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a state from its lowercase name
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "fetching" => Some(Self::Fetching),
            "resolved" => Some(Self::Resolved),
            "expanded" => Some(Self::Expanded),
            "done" => Some(Self::Done),
            "skipped" => Some(Self::Skipped),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Discovered,
            Self::Fetching,
            Self::Resolved,
            Self::Expanded,
            Self::Done,
            Self::Skipped,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
