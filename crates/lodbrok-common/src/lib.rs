//! Common types for Lodbrok.

pub mod error;

pub use error::{BrokerError, Error, Result};
