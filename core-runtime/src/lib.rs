//! # Core Runtime Module
//!
//! Provides the ambient infrastructure the destructor tracker is built on:
//! - Logging and tracing infrastructure
//! - Tracker configuration
//! - Event bus for tracker notifications
//!
//! ## Overview
//!
//! Nothing in this crate knows how resources are tracked. It establishes the
//! logging conventions, validated configuration, and event broadcasting used
//! by `core-lifecycle` and by test suites observing it.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
