//! REST API client module for the textbook content service.
//!
//! This module provides the `RemoteSource` trait that sync routines and
//! repositories fetch through, and `ApiClient`, its HTTP implementation.
//!
//! Every fetch returns a whole collection or fails; there are no partial
//! results.

pub mod client;
pub mod error;

pub use client::{ApiClient, RemoteSource};
pub use error::ApiError;
