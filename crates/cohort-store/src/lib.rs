//! Persistence gateway for Cohort.
//!
//! The orchestrator only talks to storage through [`TeamStore`]. This crate
//! also ships [`MemoryStore`], a reference implementation that keeps
//! dependency edges in one normalized collection, and [`TeamFixture`] for
//! seeding a store from a TOML or JSON file.

/// Team fixture files.
pub mod fixture;
/// In-memory reference store.
pub mod memory;
/// The persistence gateway trait.
pub mod store;

pub use fixture::{SeededTeam, TaskFixture, TeamFixture, TeammateFixture};
pub use memory::MemoryStore;
pub use store::TeamStore;
