//! Provider clients for Cohort.
//!
//! A provider is an external AI model backend. The orchestrator never talks
//! to a vendor directly: it asks a [`ProviderClientFactory`] for a
//! [`ProviderClient`] by provider name and calls `run` on it.
//!
//! # Main types
//!
//! - [`ProviderClient`]: Health check + run, implemented per backend.
//! - [`ProviderClientFactory`]: Registry of constructors keyed by provider name.
//! - [`RetryPolicy`]: Typed retry overrides parsed from task metadata.

pub mod backends;
pub mod client;
pub mod config;
pub mod factory;
pub mod retry;

pub use backends::{CommandClient, EchoClient, UnavailableClient};
pub use client::{ProviderClient, RunRequest, RunResponse};
pub use config::{ClientKind, ProviderConfig};
pub use factory::{ClientConstructor, ProviderClientFactory};
pub use retry::RetryPolicy;
