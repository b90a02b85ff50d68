// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use roaming_sync::{Family, Feature, SyncEngineConfig};
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = SyncEngineConfig::default();
//! assert_eq!(config.flush_interval(Family::FastStatus), Duration::from_secs(3));
//!
//! // Tuned config
//! let mut config = SyncEngineConfig {
//!     data_flush_ms: 5_000,
//!     cdr_flush_ms: 2_000,
//!     ..Default::default()
//! };
//! config.features.set(Feature::ChargeRecords, true);
//! assert!(config.features.is_disabled(Feature::ChargeRecords));
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;
use crate::model::{Family, Feature};

/// Configuration for the sync engine.
///
/// All fields have defaults. Every value can be replaced at runtime by
/// sending a new config through the watch channel given to
/// [`crate::SyncEngine::new`]; intervals apply from the next arm.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncEngineConfig {
    /// Quiet period before entity data (and delayed status) is pushed
    #[serde(default = "default_data_flush_ms")]
    pub data_flush_ms: u64,

    /// Quiet period before fast status updates are pushed
    #[serde(default = "default_fast_status_flush_ms")]
    pub fast_status_flush_ms: u64,

    /// Quiet period before charge detail records are pushed
    #[serde(default = "default_cdr_flush_ms")]
    pub cdr_flush_ms: u64,

    /// Upper bound for a single uploader call (0 = wait forever)
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,

    /// Buffer size of the lifecycle notification channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Run one last round per family during shutdown
    #[serde(default = "default_flush_on_shutdown")]
    pub flush_on_shutdown: bool,

    /// Administrative kill switches
    #[serde(default)]
    pub features: FeatureFlags,
}

fn default_data_flush_ms() -> u64 { 31_000 }
fn default_fast_status_flush_ms() -> u64 { 3_000 }
fn default_cdr_flush_ms() -> u64 { 15_000 }
fn default_upload_timeout_ms() -> u64 { 30_000 }
fn default_event_capacity() -> usize { 256 }
fn default_flush_on_shutdown() -> bool { true }

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            data_flush_ms: default_data_flush_ms(),
            fast_status_flush_ms: default_fast_status_flush_ms(),
            cdr_flush_ms: default_cdr_flush_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            event_capacity: default_event_capacity(),
            flush_on_shutdown: default_flush_on_shutdown(),
            features: FeatureFlags::default(),
        }
    }
}

impl SyncEngineConfig {
    /// Debounce window of a flush family.
    #[must_use]
    pub fn flush_interval(&self, family: Family) -> Duration {
        let ms = match family {
            Family::Data => self.data_flush_ms,
            Family::FastStatus => self.fast_status_flush_ms,
            Family::ChargeRecords => self.cdr_flush_ms,
        };
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn upload_timeout(&self) -> Option<Duration> {
        (self.upload_timeout_ms > 0).then(|| Duration::from_millis(self.upload_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        for family in Family::ALL {
            if self.flush_interval(family).is_zero() {
                return Err(SyncError::InvalidConfig(format!(
                    "flush interval for {} must be greater than zero",
                    family
                )));
            }
        }
        if self.event_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-feature disable flags.
///
/// A disabled feature makes the matching enqueue calls return
/// [`crate::EnqueueResult::AdminDown`] without touching any queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub disable_push_data: bool,
    #[serde(default)]
    pub disable_push_status: bool,
    #[serde(default)]
    pub disable_push_cdr: bool,
    #[serde(default)]
    pub disable_authentication: bool,
}

impl FeatureFlags {
    #[must_use]
    pub fn is_disabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Data => self.disable_push_data,
            Feature::Status => self.disable_push_status,
            Feature::ChargeRecords => self.disable_push_cdr,
            Feature::Authentication => self.disable_authentication,
        }
    }

    pub fn set(&mut self, feature: Feature, disabled: bool) {
        let flag = match feature {
            Feature::Data => &mut self.disable_push_data,
            Feature::Status => &mut self.disable_push_status,
            Feature::ChargeRecords => &mut self.disable_push_cdr,
            Feature::Authentication => &mut self.disable_authentication,
        };
        *flag = disabled;
    }
}
