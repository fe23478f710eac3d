//! Temp-basal and combo-bolus overlay extraction
//!
//! Scans the raw treatment stream for the two overlay families that modify
//! delivery on top of the baseline: temporary basal overrides (absolute or
//! percent) and combo/extended boluses (additive). Records with no usable
//! timestamp or a non-positive duration are dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration};
use tracing::debug;

use crate::schema::RawTreatment;
use crate::types::{ComboBolusOverlay, Overlays, TempBasalOverlay};

/// Two temp records closer together than this are treated as one continuous
/// override; pump clocks round duration and start independently, leaving
/// micro gaps between consecutive records.
const SNAP_GAP_MS: i64 = 65_000;

/// Extract both overlay sets, each sorted ascending by start.
pub fn parse_overlays(treatments: &[RawTreatment]) -> Overlays {
    let mut temps_by_start: BTreeMap<i64, TempBasalOverlay> = BTreeMap::new();
    let mut combos: Vec<ComboBolusOverlay> = Vec::new();

    for treatment in treatments {
        let Some(start_ms) = treatment.timestamp_ms().filter(|ms| *ms != 0) else {
            continue;
        };
        let Some(start) = DateTime::from_timestamp_millis(start_ms) else {
            continue;
        };

        if treatment.is_temp_basal() {
            let Some(duration_ms) = treatment.duration_ms().filter(|ms| *ms > 0) else {
                debug!(id = ?treatment.id, "dropping temp basal without a positive duration");
                continue;
            };
            let end = start + Duration::milliseconds(duration_ms);
            let absolute = treatment
                .absolute
                .filter(|v| v.is_finite())
                .or(treatment.rate.filter(|v| v.is_finite()));
            let percent = treatment.percent.filter(|v| v.is_finite());
            let incoming = TempBasalOverlay {
                start,
                end,
                absolute,
                percent,
                id: treatment.id.clone(),
            };

            temps_by_start
                .entry(start_ms)
                .and_modify(|prev| *prev = merge_temps(prev, &incoming))
                .or_insert(incoming);
            continue;
        }

        if treatment.is_combo_bolus() {
            let Some(duration_ms) = treatment.duration_ms().filter(|ms| *ms > 0) else {
                continue;
            };
            let Some(relative) = treatment
                .relative
                .filter(|v| v.is_finite() && *v != 0.0)
            else {
                debug!(id = ?treatment.id, "dropping combo bolus without a usable rate");
                continue;
            };
            combos.push(ComboBolusOverlay {
                start,
                end: start + Duration::milliseconds(duration_ms),
                relative_u_per_h: relative,
                id: treatment.id.clone(),
            });
        }
    }

    let mut temps: Vec<TempBasalOverlay> = temps_by_start.into_values().collect();
    snap_adjacent_temps(&mut temps);

    combos.sort_by_key(|c| c.start);
    Overlays { temps, combos }
}

/// Merge two temp records sharing the same start instant. Absolute rates win
/// over percent deltas; the merged interval spans both.
fn merge_temps(prev: &TempBasalOverlay, next: &TempBasalOverlay) -> TempBasalOverlay {
    let absolute = prev.absolute.or(next.absolute);
    TempBasalOverlay {
        start: prev.start.min(next.start),
        end: prev.end.max(next.end),
        absolute,
        percent: if absolute.is_some() {
            None
        } else {
            next.percent.or(prev.percent)
        },
        id: prev.id.clone().or_else(|| next.id.clone()),
    }
}

/// Close sub-snap gaps between consecutive temps by pulling the later
/// interval's start back to the earlier interval's end.
fn snap_adjacent_temps(temps: &mut [TempBasalOverlay]) {
    for i in 1..temps.len() {
        let gap = (temps[i].start - temps[i - 1].end).num_milliseconds();
        if gap > 0 && gap <= SNAP_GAP_MS {
            temps[i].start = temps[i - 1].end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn temp(ms: i64, minutes: f64, extra: serde_json::Value) -> RawTreatment {
        let mut value = json!({
            "eventType": "Temp Basal",
            "mills": ms,
            "duration": minutes
        });
        value
            .as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn extracts_absolute_and_percent_temps() {
        let treatments = vec![
            temp(0, 30.0, json!({"absolute": 0.0})),
            temp(3_600_000, 60.0, json!({"percent": -50})),
        ];
        let overlays = parse_overlays(&treatments);

        assert_eq!(overlays.temps.len(), 2);
        assert_eq!(overlays.temps[0].absolute, Some(0.0));
        assert_eq!(overlays.temps[0].percent, None);
        assert_eq!(
            overlays.temps[0].end - overlays.temps[0].start,
            Duration::minutes(30)
        );
        assert_eq!(overlays.temps[1].absolute, None);
        assert_eq!(overlays.temps[1].percent, Some(-50.0));
    }

    #[test]
    fn rate_field_backs_up_absolute() {
        let overlays = parse_overlays(&[temp(0, 30.0, json!({"rate": 1.3}))]);
        assert_eq!(overlays.temps[0].absolute, Some(1.3));
    }

    #[test]
    fn non_positive_duration_is_dropped() {
        let treatments = vec![
            temp(0, 0.0, json!({"absolute": 1.0})),
            temp(1000, -5.0, json!({"absolute": 1.0})),
            serde_json::from_value(json!({
                "eventType": "Temp Basal", "mills": 2000, "absolute": 1.0
            }))
            .unwrap(),
        ];
        assert!(parse_overlays(&treatments).temps.is_empty());
    }

    #[test]
    fn duplicate_starts_merge_with_absolute_winning() {
        let treatments = vec![
            temp(0, 30.0, json!({"percent": 40})),
            temp(0, 60.0, json!({"absolute": 0.75})),
        ];
        let overlays = parse_overlays(&treatments);

        assert_eq!(overlays.temps.len(), 1);
        let merged = &overlays.temps[0];
        assert_eq!(merged.absolute, Some(0.75));
        // percent is only kept when no absolute is present
        assert_eq!(merged.percent, None);
        assert_eq!(merged.end - merged.start, Duration::minutes(60));
    }

    #[test]
    fn duplicate_starts_keep_percent_when_no_absolute() {
        let treatments = vec![
            temp(0, 30.0, json!({})),
            temp(0, 30.0, json!({"percent": 25})),
        ];
        let overlays = parse_overlays(&treatments);
        assert_eq!(overlays.temps[0].percent, Some(25.0));
    }

    #[test]
    fn short_gap_snaps_long_gap_does_not() {
        // 30 s gap between the first pair, 90 s between the second.
        let treatments = vec![
            temp(0, 10.0, json!({"absolute": 1.0})),
            temp(630_000, 10.0, json!({"absolute": 2.0})),
            temp(1_320_000, 10.0, json!({"absolute": 3.0})),
        ];
        let overlays = parse_overlays(&treatments);

        assert_eq!(overlays.temps[1].start, overlays.temps[0].end);
        assert!(overlays.temps[2].start > overlays.temps[1].end);
    }

    #[test]
    fn extracts_combos_and_drops_zero_relative() {
        let treatments = vec![
            serde_json::from_value::<RawTreatment>(json!({
                "eventType": "Combo Bolus", "mills": 0,
                "duration": 120, "relative": 0.8
            }))
            .unwrap(),
            serde_json::from_value::<RawTreatment>(json!({
                "eventType": "Extended Bolus", "mills": 1000,
                "duration": 60, "relative": 0
            }))
            .unwrap(),
        ];
        let overlays = parse_overlays(&treatments);

        assert_eq!(overlays.combos.len(), 1);
        assert_eq!(overlays.combos[0].relative_u_per_h, 0.8);
        assert_eq!(
            overlays.combos[0].end - overlays.combos[0].start,
            Duration::minutes(120)
        );
    }

    #[test]
    fn non_overlay_events_are_ignored() {
        let treatments = vec![serde_json::from_value::<RawTreatment>(json!({
            "eventType": "Meal Bolus", "mills": 0, "insulin": 4.0
        }))
        .unwrap()];
        let overlays = parse_overlays(&treatments);
        assert!(overlays.temps.is_empty());
        assert!(overlays.combos.is_empty());
    }
}
