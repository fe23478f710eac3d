//! Raw profile documents
//!
//! A profile document maps profile names to parameter sets; only the basal
//! step table and the timezone matter here. Servers disagree on how a step's
//! start time is written, so all three spellings are modeled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::FlexNum;

/// One raw basal step. The start time arrives as explicit minutes, as
/// seconds-of-day, or as an "HH:MM" string; `value` is the rate in
/// units/hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBasalStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<f64>,
    #[serde(rename = "timeAsSeconds", skip_serializing_if = "Option::is_none")]
    pub time_as_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FlexNum>,
}

/// One named profile inside a document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basal: Option<Vec<RawBasalStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A raw profile document. Older servers flatten the store into the document
/// root, so unmatched fields are retained for the normalizer's fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfileDocument {
    #[serde(rename = "defaultProfile", skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    #[serde(rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_legacy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<BTreeMap<String, RawProfile>>,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub rest: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_store_document() {
        let doc: RawProfileDocument = serde_json::from_str(
            r#"{
                "defaultProfile": "Default",
                "store": {
                    "Default": {
                        "timezone": "Europe/Brussels",
                        "basal": [
                            {"timeAsSeconds": 0, "value": 0.9},
                            {"time": "06:00", "value": 1.1}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(doc.default_profile.as_deref(), Some("Default"));
        let store = doc.store.unwrap();
        let profile = store.get("Default").unwrap();
        assert_eq!(profile.timezone.as_deref(), Some("Europe/Brussels"));
        assert_eq!(profile.basal.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn retains_unmatched_root_fields() {
        let doc: RawProfileDocument = serde_json::from_str(
            r#"{"Night": {"basal": [{"minutes": 0, "value": 0.7}]}}"#,
        )
        .unwrap();
        assert!(doc.store.is_none());
        assert!(doc.rest.contains_key("Night"));
    }
}
