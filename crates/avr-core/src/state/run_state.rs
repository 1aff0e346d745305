use crate::fault::Fault;

/// Execution state of the core between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Running,
    /// Stopped by `SLEEP` until an interrupt is taken.
    Sleeping,
    /// Stopped by `BREAK`; only a host resume or reset continues.
    Stopped,
    /// Fault is latched and no further progress is possible without reset.
    Faulted(Fault),
}

impl RunState {
    /// Returns the currently latched fault, if any.
    #[must_use]
    pub const fn latched_fault(self) -> Option<Fault> {
        match self {
            Self::Faulted(cause) => Some(cause),
            Self::Running | Self::Sleeping | Self::Stopped => None,
        }
    }
}
