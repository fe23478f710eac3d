//! Per-window series extraction
//!
//! Pure filters that turn pre-fetched raw records into the CGM, bolus, and
//! carb series of a day report. Window bounds are inclusive on both ends;
//! records outside them, or failing the per-kind validity rules, are
//! dropped. Each series is deduplicated and sorted ascending by timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::schema::{RawEntry, RawTreatment};
use crate::types::{BolusEntry, CarbEntry, CgmEntry};

/// Sensor glucose readings within `[start, end]`. Entries without a numeric
/// `sgv` (calibrations, device status) are skipped; duplicate timestamps
/// keep the last record seen.
pub fn extract_cgm(
    entries: &[RawEntry],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CgmEntry> {
    let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
    let mut by_time: BTreeMap<i64, CgmEntry> = BTreeMap::new();
    for entry in entries {
        let Some(ms) = entry.date.filter(|v| v.is_finite()).map(|v| v as i64) else {
            continue;
        };
        let Some(mg_dl) = entry.sgv.filter(|v| v.is_finite()) else {
            continue;
        };
        if ms < start_ms || ms > end_ms {
            continue;
        }
        let t = ms.div_euclid(1000);
        by_time.insert(t, CgmEntry { t, mg_dl });
    }
    by_time.into_values().collect()
}

/// Insulin bolus events within `[start, end]`: the immediate and extended
/// portions summed. Records flagged invalid or totalling zero are skipped;
/// duplicates are collapsed by (timestamp, milliunits).
pub fn extract_bolus(
    treatments: &[RawTreatment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<BolusEntry> {
    let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
    let mut by_key: BTreeMap<(i64, i64), BolusEntry> = BTreeMap::new();
    for treatment in treatments {
        if treatment.is_valid == Some(false) {
            continue;
        }
        let units = treatment.insulin.filter(|v| v.is_finite()).unwrap_or(0.0)
            + treatment
                .insulin_extended
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
        if units <= 0.0 {
            continue;
        }
        let Some(ms) = treatment.timestamp_ms() else {
            continue;
        };
        if ms < start_ms || ms > end_ms {
            continue;
        }
        let t = ms.div_euclid(1000);
        by_key.insert((t, milliunits(units)), BolusEntry { t, units });
    }
    by_key.into_values().collect()
}

/// Carbohydrate intake events within `[start, end]`; only records with
/// positive grams count. Duplicates are collapsed by (timestamp, milligrams).
pub fn extract_carbs(
    treatments: &[RawTreatment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CarbEntry> {
    let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
    let mut by_key: BTreeMap<(i64, i64), CarbEntry> = BTreeMap::new();
    for treatment in treatments {
        let Some(grams) = treatment.carbs.filter(|v| v.is_finite() && *v > 0.0) else {
            continue;
        };
        let Some(ms) = treatment.timestamp_ms() else {
            continue;
        };
        if ms < start_ms || ms > end_ms {
            continue;
        }
        let t = ms.div_euclid(1000);
        by_key.insert((t, milliunits(grams)), CarbEntry { t, grams });
    }
    by_key.into_values().collect()
}

fn milliunits(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}
