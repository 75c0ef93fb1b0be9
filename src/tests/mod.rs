//! Crate-level tests of the scheduler state machine.
//!
//! Nothing here arms the timer or installs the signal handler; the
//! integration binaries under `tests/` cover real switching.

mod property;
