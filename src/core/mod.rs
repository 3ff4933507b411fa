//! Core types shared by every stage of the update pipeline.
//!
//! Currently this is the error taxonomy and its user-facing rendering; see
//! [`error`] for details.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};
