//! `meridian-http` is an async HTTP client for the Meridian platform API.
//!
//! The crate owns the resilient request pipeline every Meridian service
//! wrapper goes through: dispatch, normalization of failures into one
//! [`MeridianError`] shape, and automatic retry with capped exponential
//! backoff. The main entry points:
//! - [`MeridianClient::send`] and the typed verb helpers
//!   ([`MeridianClient::get`], [`MeridianClient::post`], ...)
//! - [`MeridianClient::ping`]
//! - [`RetryPolicy`] for tuning attempts, delays, and the retry predicate

mod client;
mod config;
mod error;
mod pipeline;
mod request;
mod retry;

pub use client::{ClientBuilder, MeridianClient};
pub use config::ClientConfig;
pub use error::{ConfigError, ErrorKind, MeridianError};
pub use request::{ApiRequest, ApiResponse};
pub use retry::RetryPolicy;

/// Re-exported so callers can cancel in-flight calls without depending on
/// `tokio-util` themselves.
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, MeridianError>;
