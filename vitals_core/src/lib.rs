#![forbid(unsafe_code)]

//! Core domain model and platform plumbing for the vitals health toolkit.
//!
//! This crate provides:
//! - Canonical health records and permission types
//! - Native record codecs and the multi-strategy unit decoder
//! - Permission negotiation and the query engine
//! - Workout session tracking
//! - Platform selection, simulated stores, and CSV export

pub mod types;
pub mod error;
pub mod activity;
pub mod time_range;
pub mod units;
pub mod codec;
pub mod permissions;
pub mod query;
pub mod aggregate;
pub mod session;
pub mod service;
pub mod platform;
pub mod simulator;
pub mod export;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{Cancelled, Error, Result};
pub use types::*;
pub use activity::ActivityType;
pub use time_range::HealthTimeRange;
pub use config::Config;
pub use platform::{select_service, HostPlatform};
pub use service::{HealthService, HealthServiceExt, ServiceSettings};
pub use session::SessionState;
pub use export::write_csv;
