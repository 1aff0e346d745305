//! CPU state primitives: status register flags and run state.

/// Status register flag set.
pub mod registers;
/// Run-state machine.
pub mod run_state;

pub use registers::{Sreg, SREG_BITS};
pub use run_state::RunState;
