//! HTTP surface: REST handlers, request/response types, error envelope.

pub mod error;
pub mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
