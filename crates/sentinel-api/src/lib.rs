//! # sentinel-api
//!
//! Axum surface of the hub: the `/ws` upgrade agents connect to and the
//! operator JSON API under `/api`.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server, serve};
pub use error::{ApiError, ApiErrorResponse};
pub use state::AppState;
