//! Portrait API Library
//!
//! HTTP handlers, the acquisition and maintenance services behind them, and
//! application setup.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use error::{ErrorResponse, HttpAppError, StatusKind, StatusMessage};
pub use services::{AcquisitionService, MaintenanceService};
pub use state::AppState;
