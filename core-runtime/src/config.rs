//! # Tracker Configuration Module
//!
//! Provides configuration for the destructor tracker.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `TrackerConfig`. Every setting has a default, so `TrackerConfig::default()`
//! is always valid; the builder only exists to override them and validates
//! the result before handing it out.
//!
//! ## Settings
//!
//! - `collection_interval` - How often the collection pump asks the host to
//!   reclaim memory (default: 1 ms, i.e. as often as the timer allows)
//! - `additional_ignored_types` - Resource kinds to ignore on top of the
//!   built-in list of host housekeeping types
//! - `event_buffer_size` - Capacity of the tracker's event bus (default: 100)
//! - `enable_events` - Whether tracker events are broadcast at all
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::TrackerConfig;
//! use std::time::Duration;
//!
//! let config = TrackerConfig::builder()
//!     .collection_interval(Duration::from_millis(5))
//!     .ignore_type("FILEHANDLE")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.collection_interval, Duration::from_millis(5));
//! ```
//!
//! ## Error Handling
//!
//! Invalid values are rejected with an actionable message:
//!
//! ```should_panic
//! use core_runtime::config::TrackerConfig;
//! use std::time::Duration;
//!
//! let config = TrackerConfig::builder()
//!     .collection_interval(Duration::ZERO)
//!     .build()
//!     .expect("Should fail - zero interval");
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

/// Default pause between two collection requests.
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_millis(1);

/// Longest accepted pause between two collection requests.
pub const MAX_COLLECTION_INTERVAL: Duration = Duration::from_secs(60);

/// Default capacity of the tracker event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Configuration for a destructor tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Pause between two collection requests issued by the pump
    pub collection_interval: Duration,

    /// Resource type names ignored in addition to the built-in list
    pub additional_ignored_types: Vec<String>,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Broadcast tracker events
    pub enable_events: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            additional_ignored_types: Vec::new(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            enable_events: true,
        }
    }
}

impl TrackerConfig {
    /// Creates a new builder for constructing a `TrackerConfig`.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The collection interval is non-zero and at most 60 seconds
    /// - The event buffer can hold at least one event
    /// - No additional ignored type name is blank
    pub fn validate(&self) -> Result<()> {
        if self.collection_interval.is_zero() {
            return Err(Error::Config(
                "Collection interval must be greater than 0. \
                 Use Duration::from_millis(1) to collect as often as possible."
                    .to_string(),
            ));
        }

        if self.collection_interval > MAX_COLLECTION_INTERVAL {
            return Err(Error::Config(format!(
                "Collection interval exceeds maximum of {} seconds",
                MAX_COLLECTION_INTERVAL.as_secs()
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0. \
                 Disable events with .enable_events(false) instead."
                    .to_string(),
            ));
        }

        if let Some(blank) = self
            .additional_ignored_types
            .iter()
            .find(|name| name.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "Ignored type names cannot be blank (got {:?})",
                blank
            )));
        }

        Ok(())
    }
}

/// Builder for constructing [`TrackerConfig`] instances.
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    collection_interval: Option<Duration>,
    additional_ignored_types: Vec<String>,
    event_buffer_size: Option<usize>,
    enable_events: Option<bool>,
}

impl TrackerConfigBuilder {
    /// Sets the pause between collection requests.
    ///
    /// Default: 1 ms
    pub fn collection_interval(mut self, interval: Duration) -> Self {
        self.collection_interval = Some(interval);
        self
    }

    /// Ignores resources reported under `type_name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::TrackerConfig;
    ///
    /// let config = TrackerConfig::builder()
    ///     .ignore_type("FILEHANDLE")
    ///     .ignore_type("HTTP2SESSION")
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(config.additional_ignored_types.len(), 2);
    /// ```
    pub fn ignore_type(mut self, type_name: impl Into<String>) -> Self {
        self.additional_ignored_types.push(type_name.into());
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables tracker events.
    pub fn enable_events(mut self, enabled: bool) -> Self {
        self.enable_events = Some(enabled);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<TrackerConfig> {
        let defaults = TrackerConfig::default();

        let config = TrackerConfig {
            collection_interval: self
                .collection_interval
                .unwrap_or(defaults.collection_interval),
            additional_ignored_types: self.additional_ignored_types,
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            enable_events: self.enable_events.unwrap_or(defaults.enable_events),
        };

        config.validate()?;

        Ok(config)
    }
}
