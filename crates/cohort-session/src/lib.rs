//! Execution session bookkeeping.
//!
//! A [`Session`] records one execution attempt of a task against one
//! provider. A task can accumulate several sessions across retries and
//! failovers before it reaches a terminal status.

pub mod manager;
pub mod session;

pub use manager::{InMemorySessionManager, SessionManager};
pub use session::{Session, SessionHandle, SessionOutcome};
