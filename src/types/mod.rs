//! Shared types for Usher

mod error;

pub use error::{Result, UsherError};
