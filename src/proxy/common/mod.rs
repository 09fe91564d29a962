// Common utilities for the relay

pub mod error;

pub use error::RelayError;
