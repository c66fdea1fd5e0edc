//! Shared types for the Graph mail workspace
//!
//! Configuration errors used by the service config loader, and the
//! `Secret` wrapper that keeps client secrets out of logs.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, SecretString};
