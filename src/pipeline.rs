//! Pipeline orchestration
//!
//! This module provides the public API of diaflux. The engine itself is a
//! pure function of pre-fetched records; `DayExporter` wires it to a
//! caller-supplied `DiaryService` that does the actual fetching. Keeping the
//! service behind a trait means the engine and its tests never depend on
//! hidden global state or live HTTP.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::baseline::{build_baseline, extract_switches};
use crate::error::ExportError;
use crate::extract::{extract_bolus, extract_carbs, extract_cgm};
use crate::overlay::parse_overlays;
use crate::profiles::normalize;
use crate::report::ReportBuilder;
use crate::schema::{RawEntry, RawTreatment};
use crate::timeline::assemble;
use crate::types::{BasalDay, BasalDayCounts};
use crate::window::{parse_date_strict, parse_timezone, resolve_window};

/// The remote diary collaborator.
///
/// Implementations own transport, authentication, pagination, and retries.
/// Treatments must be returned in ascending time order; ties keep server
/// order, which the engine preserves for its tie-breaks.
pub trait DiaryService {
    /// The raw profile document (or array of documents).
    fn fetch_profile_document(&self) -> Result<serde_json::Value, ExportError>;

    /// Treatment records overlapping `[start, end)`.
    fn fetch_treatments(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawTreatment>, ExportError>;

    /// The most recent profile-switch treatment at or before `at`, if any.
    /// Used to recover the switch that was active at day start when it
    /// predates the fetch window.
    fn fetch_latest_profile_switch_before(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<RawTreatment>, ExportError>;

    /// CGM entries overlapping `[start, end]`.
    fn fetch_entries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawEntry>, ExportError>;
}

/// Compute the basal timeline for one local day from pre-fetched records.
///
/// This is the pure entry point: no clock, no I/O. `treatments` should cover
/// the padded fetch window of the day, in ascending time order.
pub fn compute_basal_day_from_records(
    date: &str,
    timezone: &str,
    profile_doc: &serde_json::Value,
    treatments: &[RawTreatment],
) -> Result<BasalDay, ExportError> {
    let window = resolve_window(date, timezone)?;
    let zone = parse_timezone(timezone)?;

    let store = normalize(profile_doc).ok_or(ExportError::NoProfileStore)?;
    let switches = extract_switches(treatments);
    let overlays = parse_overlays(treatments);

    let baseline = build_baseline(zone, window.day_start, window.day_end, &store, &switches);
    if baseline.is_empty() {
        return Err(ExportError::EmptyBaseline(date.to_string()));
    }

    let segments = assemble(window.day_start, window.day_end, &baseline, &overlays);
    if segments.is_empty() {
        return Err(ExportError::NoSegmentsProduced(date.to_string()));
    }

    let total_units = segments.iter().map(|s| s.total_units).sum();
    let counts = BasalDayCounts {
        treatments: treatments.len(),
        baseline_segments: baseline.len(),
        segments: segments.len(),
    };
    debug!(
        date,
        timezone,
        segments = counts.segments,
        total_units,
        "computed basal day"
    );

    Ok(BasalDay {
        date: date.to_string(),
        timezone: timezone.to_string(),
        segments,
        total_units,
        counts,
        window,
    })
}

/// Per-day and multi-day export orchestration over a `DiaryService`.
pub struct DayExporter<S: DiaryService> {
    service: S,
}

impl<S: DiaryService> DayExporter<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Compute the basal timeline for one local day, fetching what it needs.
    pub fn compute_basal_day(&self, date: &str, timezone: &str) -> Result<BasalDay, ExportError> {
        let window = resolve_window(date, timezone)?;
        let profile_doc = self.service.fetch_profile_document()?;
        let mut treatments = self
            .service
            .fetch_treatments(window.fetch_start, window.fetch_end)?;

        // The switch that governs day start may predate the fetch window;
        // pull it in unless an equally-timed switch is already present.
        if let Some(latest) = self
            .service
            .fetch_latest_profile_switch_before(window.day_start)?
        {
            let latest_ms = latest.timestamp_ms();
            let already = treatments
                .iter()
                .any(|t| t.is_profile_switch() && t.timestamp_ms() == latest_ms);
            if !already {
                treatments.push(latest);
            }
        }
        treatments.sort_by_key(|t| t.timestamp_ms().unwrap_or(0));

        compute_basal_day_from_records(date, timezone, &profile_doc, &treatments)
    }

    /// Export an inclusive date range as a structured report.
    ///
    /// The timezone comes from the diary's default profile. Days failing
    /// with `EmptyBaseline` are skipped with a warning; any other failure
    /// aborts the export.
    pub fn export(&self, start: &str, end: &str) -> Result<crate::types::ExportReport, ExportError> {
        let start_date = parse_date_strict(start)?;
        let end_date = parse_date_strict(end)?;
        if start_date > end_date {
            return Err(ExportError::InvalidRange(
                "start must be <= end".to_string(),
            ));
        }

        let profile_doc = self.service.fetch_profile_document()?;
        let store = normalize(&profile_doc).ok_or(ExportError::NoProfileStore)?;
        let timezone = store.timezone.clone().unwrap_or_else(|| "UTC".to_string());

        let mut builder = ReportBuilder::new();
        builder.add_profiles(&store);

        let mut day = start_date;
        while day <= end_date {
            let date = day.format("%Y-%m-%d").to_string();
            let window = resolve_window(&date, &timezone)?;

            let basal = match self.compute_basal_day(&date, &timezone) {
                Ok(basal) => basal,
                Err(ExportError::EmptyBaseline(_)) => {
                    warn!(date = %date, "skipping day with empty baseline");
                    day += chrono::Duration::days(1);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let entries = self.service.fetch_entries(window.day_start, window.day_end)?;
            let treatments = self
                .service
                .fetch_treatments(window.day_start, window.day_end)?;
            let cgm = extract_cgm(&entries, window.day_start, window.day_end);
            let carbs = extract_carbs(&treatments, window.day_start, window.day_end);
            let bolus = extract_bolus(&treatments, window.day_start, window.day_end);

            builder.add_day(&basal, cgm, carbs, bolus);
            day += chrono::Duration::days(1);
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// In-memory diary for tests: a profile document plus canned records.
    struct FixtureDiary {
        profile_doc: serde_json::Value,
        treatments: Vec<RawTreatment>,
        entries: Vec<RawEntry>,
        earlier_switch: Option<RawTreatment>,
    }

    impl FixtureDiary {
        fn new(profile_doc: serde_json::Value, treatments: serde_json::Value) -> Self {
            Self {
                profile_doc,
                treatments: serde_json::from_value(treatments).unwrap(),
                entries: Vec::new(),
                earlier_switch: None,
            }
        }
    }

    impl DiaryService for FixtureDiary {
        fn fetch_profile_document(&self) -> Result<serde_json::Value, ExportError> {
            Ok(self.profile_doc.clone())
        }

        fn fetch_treatments(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<RawTreatment>, ExportError> {
            let (a, b) = (start.timestamp_millis(), end.timestamp_millis());
            Ok(self
                .treatments
                .iter()
                .filter(|t| t.timestamp_ms().is_some_and(|ms| ms >= a && ms < b))
                .cloned()
                .collect())
        }

        fn fetch_latest_profile_switch_before(
            &self,
            _at: DateTime<Utc>,
        ) -> Result<Option<RawTreatment>, ExportError> {
            Ok(self.earlier_switch.clone())
        }

        fn fetch_entries(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<RawEntry>, ExportError> {
            let (a, b) = (start.timestamp_millis(), end.timestamp_millis());
            Ok(self
                .entries
                .iter()
                .filter(|e| {
                    e.date
                        .is_some_and(|ms| (ms as i64) >= a && (ms as i64) <= b)
                })
                .cloned()
                .collect())
        }
    }

    fn flat_profile_doc() -> serde_json::Value {
        json!({
            "defaultProfile": "Default",
            "store": {
                "Default": {
                    "timezone": "Europe/Brussels",
                    "basal": [{"timeAsSeconds": 0, "value": 0.9}]
                }
            }
        })
    }

    // 2025-08-20 local midnight in Brussels, as epoch milliseconds.
    const DAY_START_MS: i64 = 1_755_640_800_000;

    fn local(hours: f64) -> i64 {
        DAY_START_MS + (hours * 3_600_000.0) as i64
    }

    #[test]
    fn full_day_with_switch_and_suspend() {
        // Flat 0.9 U/h profile, 08:00 switch to 120%, suspend from 10:00
        // to 10:30.
        let treatments = json!([
            {
                "eventType": "Profile Switch",
                "mills": local(8.0),
                "profile": "Default",
                "percentage": 120
            },
            {
                "eventType": "Temp Basal",
                "mills": local(10.0),
                "duration": 30,
                "absolute": 0.0
            }
        ]);
        let diary = FixtureDiary::new(flat_profile_doc(), treatments);
        let exporter = DayExporter::new(diary);

        let day = exporter
            .compute_basal_day("2025-08-20", "Europe/Brussels")
            .unwrap();

        assert_eq!(day.counts.treatments, 2);
        assert_eq!(day.segments.len(), 4);

        let rates: Vec<f64> = day.segments.iter().map(|s| s.rate_u_per_h).collect();
        assert_eq!(rates, vec![0.9, 1.08, 0.0, 1.08]);

        let suspend = &day.segments[2];
        assert_eq!(suspend.total_units, 0.0);
        assert_eq!(suspend.label.as_str(), "temp-absolute");

        // 8h*0.9 + 2h*1.08 + 0 + 13.5h*1.08
        let expected = 7.2 + 2.16 + 0.0 + 14.58;
        assert!((day.total_units - expected).abs() < 1e-9);
    }

    #[test]
    fn switch_before_fetch_window_is_recovered() {
        let mut diary = FixtureDiary::new(flat_profile_doc(), json!([]));
        let mut doc = diary.profile_doc.clone();
        doc["store"]["Night"] = json!({"basal": [{"timeAsSeconds": 0, "value": 0.5}]});
        diary.profile_doc = doc;
        diary.earlier_switch = Some(
            serde_json::from_value(json!({
                "eventType": "Profile Switch",
                "mills": DAY_START_MS - 3 * 86_400_000,
                "profile": "Night"
            }))
            .unwrap(),
        );
        let exporter = DayExporter::new(diary);

        let day = exporter
            .compute_basal_day("2025-08-20", "Europe/Brussels")
            .unwrap();
        assert_eq!(day.segments.len(), 1);
        assert_eq!(day.segments[0].rate_u_per_h, 0.5);
    }

    #[test]
    fn empty_profile_store_fails_the_day() {
        let diary = FixtureDiary::new(json!({}), json!([]));
        let exporter = DayExporter::new(diary);
        assert!(matches!(
            exporter.compute_basal_day("2025-08-20", "UTC"),
            Err(ExportError::NoProfileStore)
        ));
    }

    #[test]
    fn missing_default_schedule_is_an_empty_baseline() {
        let doc = json!({
            "defaultProfile": "Ghost",
            "store": {"Ghost": {"basal": []}, "Other": {"basal": [{"minutes": 0, "value": 1.0}]}}
        });
        let diary = FixtureDiary::new(doc, json!([]));
        let exporter = DayExporter::new(diary);
        assert!(matches!(
            exporter.compute_basal_day("2025-08-20", "UTC"),
            Err(ExportError::EmptyBaseline(_))
        ));
    }

    #[test]
    fn pure_entry_point_is_deterministic() {
        let doc = flat_profile_doc();
        let treatments: Vec<RawTreatment> = serde_json::from_value(json!([
            {
                "eventType": "Temp Basal",
                "mills": local(2.0),
                "duration": 45,
                "percent": -30
            }
        ]))
        .unwrap();

        let a =
            compute_basal_day_from_records("2025-08-20", "Europe/Brussels", &doc, &treatments)
                .unwrap();
        let b =
            compute_basal_day_from_records("2025-08-20", "Europe/Brussels", &doc, &treatments)
                .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn dst_short_day_tiles_23_hours() {
        // Brussels springs forward on 2025-03-30; the day is 23 hours long
        // and the flat profile integrates to 23 * 0.9 units.
        let day = compute_basal_day_from_records(
            "2025-03-30",
            "Europe/Brussels",
            &flat_profile_doc(),
            &[],
        )
        .unwrap();

        assert_eq!(day.segments.len(), 1);
        assert_eq!(day.segments[0].start, day.window.day_start);
        assert_eq!(day.segments[0].end, day.window.day_end);
        assert!((day.total_units - 20.7).abs() < 1e-9);
    }

    #[test]
    fn multi_day_export_builds_a_report() {
        let treatments = json!([
            {
                "eventType": "Meal Bolus",
                "mills": local(7.0),
                "insulin": 4.5,
                "carbs": 60
            }
        ]);
        let mut diary = FixtureDiary::new(flat_profile_doc(), treatments);
        diary.entries = serde_json::from_value(json!([
            {"date": local(7.0), "sgv": 120},
            {"date": local(7.1), "sgv": 125}
        ]))
        .unwrap();
        let exporter = DayExporter::new(diary);

        let report = exporter.export("2025-08-20", "2025-08-21").unwrap();

        assert_eq!(report.days.len(), 2);
        assert_eq!(report.profiles.len(), 1);

        let first = &report.days[0];
        assert_eq!(first.date.timezone, "Europe/Brussels");
        assert_eq!(first.cgm.len(), 2);
        assert_eq!(first.carbs.len(), 1);
        assert_eq!(first.bolus.len(), 1);
        assert_eq!(first.bolus[0].units, 4.5);
        assert_eq!(first.basal.len(), 1);
        assert_eq!(first.basal[0].iu_h, 0.9);

        // Day two has no records at all but still a full baseline.
        let second = &report.days[1];
        assert!(second.cgm.is_empty());
        assert_eq!(second.basal.len(), 1);
    }

    #[test]
    fn export_rejects_inverted_range() {
        let diary = FixtureDiary::new(flat_profile_doc(), json!([]));
        let exporter = DayExporter::new(diary);
        assert!(matches!(
            exporter.export("2025-08-21", "2025-08-20"),
            Err(ExportError::InvalidRange(_))
        ));
    }
}
