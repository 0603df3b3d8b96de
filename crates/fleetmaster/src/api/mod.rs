//! API route handlers

pub mod allocate;
pub mod docs;
pub mod error;
pub mod fleet;
pub mod servers;
pub mod system;
pub mod ws;

pub use error::{ApiError, AppError};
