//! Raw treatment records and their field-resolution rules
//!
//! Treatment records are the catch-all event stream of the diary service:
//! temp basals, combo boluses, profile switches, boluses, and carb entries
//! all arrive through the same endpoint, distinguished only by their
//! `eventType` text and whichever optional fields happen to be set.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A JSON value that servers sometimes record as a number and sometimes as a
/// numeric string (durations and epoch timestamps in particular).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexNum {
    Num(f64),
    Text(String),
}

impl FlexNum {
    /// Numeric value, if the content is a finite number or parses as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlexNum::Num(n) => Some(*n).filter(|v| v.is_finite()),
            FlexNum::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

/// A raw treatment record as returned by the diary service.
///
/// Every field is optional; which ones are meaningful depends on the event
/// type. Unknown fields are ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTreatment {
    #[serde(rename = "eventType", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "_created_at", skip_serializing_if = "Option::is_none")]
    pub created_at_legacy: Option<String>,
    /// Epoch milliseconds; some installations record this as a string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<FlexNum>,
    /// Epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mills: Option<f64>,
    #[serde(
        rename = "durationInMilliseconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_in_milliseconds: Option<FlexNum>,
    /// Minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<FlexNum>,
    #[serde(rename = "durationMinutes", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<FlexNum>,
    /// Absolute temp-basal rate (units/hour)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute: Option<f64>,
    /// Raw pump rate (units/hour); fallback for `absolute`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Signed temp-basal percentage delta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Profile-switch percentage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(
        rename = "profilePercentage",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_percentage: Option<f64>,
    /// Combo/extended bolus additive rate (units/hour)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative: Option<f64>,
    /// Immediate bolus units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insulin: Option<f64>,
    /// Extended bolus units
    #[serde(rename = "insulinExtended", skip_serializing_if = "Option::is_none")]
    pub insulin_extended: Option<f64>,
    /// Carbohydrate grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    /// Target profile name for switches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Inline profile definition carried by some switch records; either a
    /// JSON object or a JSON-encoded string
    #[serde(rename = "profileJson", skip_serializing_if = "Option::is_none")]
    pub profile_json: Option<serde_json::Value>,
    #[serde(rename = "isValid", skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RawTreatment {
    /// Best available timestamp in epoch milliseconds.
    ///
    /// Precedence: `mills`, then `date`, then the `created_at` variants.
    pub fn timestamp_ms(&self) -> Option<i64> {
        if let Some(ms) = self.mills.filter(|v| v.is_finite()) {
            return Some(ms as i64);
        }
        if let Some(ms) = self.date.as_ref().and_then(FlexNum::as_f64) {
            return Some(ms as i64);
        }
        self.created_at
            .as_deref()
            .or(self.created_at_legacy.as_deref())
            .and_then(parse_iso_ms)
    }

    /// Resolved duration in milliseconds.
    ///
    /// An explicit millisecond field wins; otherwise minutes-based fields are
    /// converted. Callers drop records whose duration is not positive.
    pub fn duration_ms(&self) -> Option<i64> {
        if let Some(ms) = self
            .duration_in_milliseconds
            .as_ref()
            .and_then(FlexNum::as_f64)
        {
            return Some(ms as i64);
        }
        self.duration_minutes
            .as_ref()
            .or(self.duration.as_ref())
            .and_then(FlexNum::as_f64)
            .map(|minutes| (minutes * 60_000.0).round() as i64)
    }

    fn event_type_lower(&self) -> String {
        self.event_type.as_deref().unwrap_or("").to_lowercase()
    }

    /// Temp-basal candidates mention "temp" together with one of "basal",
    /// "target", or "rate".
    pub fn is_temp_basal(&self) -> bool {
        let kind = self.event_type_lower();
        kind.contains("temp")
            && (kind.contains("basal") || kind.contains("target") || kind.contains("rate"))
    }

    /// Combo/extended bolus candidates mention "combo" or "extended".
    pub fn is_combo_bolus(&self) -> bool {
        let kind = self.event_type_lower();
        kind.contains("combo") || kind.contains("extended")
    }

    pub fn is_profile_switch(&self) -> bool {
        self.event_type_lower().contains("profile switch")
    }

    /// Switch percentage across the field variants servers use, defaulting
    /// to 100 and clamped to be non-negative.
    pub fn switch_percentage(&self) -> f64 {
        let raw = self
            .percentage
            .filter(|v| v.is_finite())
            .or(self.percent.filter(|v| v.is_finite()))
            .or(self.profile_percentage.filter(|v| v.is_finite()))
            .unwrap_or(100.0);
        raw.max(0.0)
    }

    /// Target profile name for a switch: the explicit field, else the name
    /// embedded in the inline profile JSON.
    pub fn switch_profile_name(&self) -> Option<String> {
        if let Some(name) = self.profile.as_deref() {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        let json = self.profile_json.as_ref()?;
        for key in ["defaultProfile", "name"] {
            if let Some(name) = json.get(key).and_then(|v| v.as_str()) {
                let trimmed = name.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }
}

fn parse_iso_ms(iso: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(iso)
        .ok()
        .map(|dt| dt.timestamp_millis())
}
