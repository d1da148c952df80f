//! Core components of the client.
//!
//! This module contains the foundational building blocks of the library:
//! - The main [`ApiClient`] and its builder.
//! - The primary [`ApiError`] type and failure classification.
//! - Telemetry hooks and internal networking plumbing.

/// The main client (`ApiClient`), builder, and per-call configuration.
pub mod client;
/// The primary error type (`ApiError`) for the crate.
pub mod error;
/// Monitoring hooks (`TelemetrySink`) for resilience events.
pub mod telemetry;

pub(crate) mod net;

// convenient re-exports so most code can just `use crate::core::ApiClient`
pub use client::{ApiClient, ApiClientBuilder, ApiResponse};
pub use error::ApiError;
pub use telemetry::{NoopTelemetry, Severity, TelemetrySink};
