//! Common types shared by the account pool crates

mod error;
mod secret;
mod telemetry;

pub use error::{Error, Result};
pub use secret::Secret;
pub use telemetry::init_tracing;
