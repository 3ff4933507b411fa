//! Integration test suite for devx
//!
//! End-to-end tests that drive the self-update pipeline against a local
//! wiremock server and run the compiled binary with `assert_cmd`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pipeline**: `SelfUpdater` install flows (happy path, integrity failures, resume, deadlines)
//! - **github**: the GitHub release listing feeding a full install
//! - **cli**: the `devx update` command surface

mod cli;
mod common;
mod github;
mod pipeline;
