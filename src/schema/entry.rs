//! Raw CGM entries
//!
//! Entries come from a separate endpoint than treatments and carry sensor
//! glucose values keyed by an epoch-millisecond `date`.

use serde::{Deserialize, Serialize};

/// A raw entry record. Non-SGV entries (calibrations, device events) carry
/// no `sgv` and are skipped by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEntry {
    /// Epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<f64>,
    /// Sensor glucose value (mg/dL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sgv: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
}
