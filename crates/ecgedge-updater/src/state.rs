use std::fmt;

/// Position of the updater in one update cycle.
///
/// `Idle → Downloading → Validating → BackingUp → Promoting → Logged → Idle`.
/// A failure in any working state jumps straight to `Logged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Downloading,
    Validating,
    BackingUp,
    Promoting,
    Logged,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::BackingUp => "backing-up",
            Self::Promoting => "promoting",
            Self::Logged => "logged",
        }
    }

    /// Whether a cycle is in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
