//! Core types for the diaflux engine
//!
//! This module defines the data structures that flow through each stage of the
//! per-day computation: the normalized profile store, baseline segments,
//! overlay intervals, resolved output segments, and the structured report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One step of a basal schedule.
///
/// Schedules are ordered ascending by `minute_of_day` and wrap: the last
/// entry's rate applies until midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalStep {
    /// Minutes since local midnight, in `[0, 1440]`
    pub minute_of_day: u32,
    /// Delivery rate while this step is active (units/hour)
    pub rate_u_per_h: f64,
}

/// Named basal schedules normalized out of a raw profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStore {
    /// Name of the profile that applies when no switch says otherwise
    pub default_profile: String,
    /// IANA timezone carried by the default profile, when the document has one
    pub timezone: Option<String>,
    /// Schedules keyed by profile name; profiles with no usable steps are
    /// dropped during normalization
    pub schedules: BTreeMap<String, Vec<BasalStep>>,
}

/// UTC boundaries for one local calendar day, plus the padded fetch window.
///
/// The fetch window reaches 24 hours before the day and 1 hour past it so
/// that overlays starting the previous day, or switches recorded slightly
/// after midnight, are still visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
    pub fetch_start: DateTime<Utc>,
    pub fetch_end: DateTime<Utc>,
}

/// A profile-switch event extracted from the treatment stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSwitch {
    pub at: DateTime<Utc>,
    /// Target profile name, with any trailing "(<n>%)" annotation stripped
    pub profile: String,
    /// Percentage multiplier; 100 when the record carries none
    pub percentage: f64,
    /// Ad-hoc schedule embedded in the switch record, if any
    pub inline_schedule: Option<Vec<BasalStep>>,
}

/// A slice of the scheduled (profile) delivery rate.
///
/// Segments for a given day are contiguous, non-overlapping, and together
/// cover exactly `[day_start, day_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineSegment {
    pub start: DateTime<Utc>,
    /// Exclusive
    pub end: DateTime<Utc>,
    /// Scheduled rate before the profile percentage is applied (units/hour)
    pub base_rate: f64,
    /// Active profile percentage as a multiplier (1.0 == 100%)
    pub pct_multiplier: f64,
}

/// A temporary basal override interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TempBasalOverlay {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Absolute replacement rate (units/hour); wins over `percent`
    pub absolute: Option<f64>,
    /// Signed percentage delta relative to the scheduled rate
    pub percent: Option<f64>,
    pub id: Option<String>,
}

/// A combo/extended bolus interval, layered on top of basal as a rate
/// addition rather than a replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct ComboBolusOverlay {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Additional delivery rate (units/hour)
    pub relative_u_per_h: f64,
    pub id: Option<String>,
}

/// The two overlay sets extracted from the treatment stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    /// Ascending by start
    pub temps: Vec<TempBasalOverlay>,
    /// Ascending by start
    pub combos: Vec<ComboBolusOverlay>,
}

/// Classification of a resolved segment.
///
/// The combo variants exist because a combo contribution can ride on top of
/// any non-suspended base classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentLabel {
    #[serde(rename = "baseline")]
    Baseline,
    #[serde(rename = "temp-absolute")]
    TempAbsolute,
    #[serde(rename = "temp-percent")]
    TempPercent,
    #[serde(rename = "temp-unknown")]
    TempUnknown,
    #[serde(rename = "combo-relative")]
    ComboRelative,
    #[serde(rename = "temp-absolute+combo")]
    TempAbsoluteCombo,
    #[serde(rename = "temp-percent+combo")]
    TempPercentCombo,
    #[serde(rename = "temp-unknown+combo")]
    TempUnknownCombo,
}

impl SegmentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentLabel::Baseline => "baseline",
            SegmentLabel::TempAbsolute => "temp-absolute",
            SegmentLabel::TempPercent => "temp-percent",
            SegmentLabel::TempUnknown => "temp-unknown",
            SegmentLabel::ComboRelative => "combo-relative",
            SegmentLabel::TempAbsoluteCombo => "temp-absolute+combo",
            SegmentLabel::TempPercentCombo => "temp-percent+combo",
            SegmentLabel::TempUnknownCombo => "temp-unknown+combo",
        }
    }

    /// The label this classification takes once a combo contribution is
    /// added on top of it.
    pub fn with_combo(self) -> SegmentLabel {
        match self {
            SegmentLabel::Baseline => SegmentLabel::ComboRelative,
            SegmentLabel::TempAbsolute => SegmentLabel::TempAbsoluteCombo,
            SegmentLabel::TempPercent => SegmentLabel::TempPercentCombo,
            SegmentLabel::TempUnknown => SegmentLabel::TempUnknownCombo,
            other => other,
        }
    }
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved slice of the delivery timeline.
///
/// Output segments are sorted, contiguous, cover exactly
/// `[day_start, day_end)`, and no two adjacent segments share both the same
/// rounded rate and the same label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSegment {
    pub start: DateTime<Utc>,
    /// Exclusive
    pub end: DateTime<Utc>,
    /// Effective rate, rounded to 4 decimal places (units/hour)
    pub rate_u_per_h: f64,
    /// `rate × duration_hours`, rounded to 4 decimal places
    pub total_units: f64,
    pub label: SegmentLabel,
}

/// Record counts reported alongside a computed day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasalDayCounts {
    pub treatments: usize,
    pub baseline_segments: usize,
    pub segments: usize,
}

/// The complete basal reconstruction for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalDay {
    /// The requested date (YYYY-MM-DD)
    pub date: String,
    /// The IANA zone the day was resolved in
    pub timezone: String,
    pub segments: Vec<ResolvedSegment>,
    /// Sum of all segment `total_units`
    pub total_units: f64,
    pub counts: BasalDayCounts,
    pub window: DayWindow,
}

/// A CGM reading (sensor glucose value).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgmEntry {
    /// Epoch seconds
    pub t: i64,
    pub mg_dl: f64,
}

/// An insulin bolus event (immediate plus extended portion).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BolusEntry {
    /// Epoch seconds
    pub t: i64,
    pub units: f64,
}

/// A carbohydrate intake event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbEntry {
    /// Epoch seconds
    pub t: i64,
    pub grams: f64,
}

/// Report metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    /// Epoch seconds at which the report was assembled
    pub generated_at: i64,
    pub producer: String,
    pub version: String,
    /// Unique id for this export run
    pub export_id: String,
}

/// A basal block inside a report profile definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileBlock {
    /// Minutes since local midnight
    pub m: u32,
    /// Units per hour while this block is active
    pub iu_h: f64,
}

/// A flattened profile definition as exported in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDef {
    pub id: String,
    pub name: String,
    pub tz: String,
    pub blocks: Vec<ProfileBlock>,
}

/// The day anchor inside a report: a local midnight plus its zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDate {
    pub timezone: String,
    /// Epoch seconds of local midnight
    pub t: i64,
}

/// One basal segment as exported in the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalSpan {
    /// Epoch seconds at which the segment becomes active
    pub t: i64,
    /// Total units delivered during the segment
    pub iu_sum: f64,
    /// Units per hour during the segment
    pub iu_h: f64,
    /// Duration in seconds
    pub d: i64,
    #[serde(rename = "type")]
    pub kind: SegmentLabel,
}

/// Everything exported for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub date: DayDate,
    pub cgm: Vec<CgmEntry>,
    pub carbs: Vec<CarbEntry>,
    pub bolus: Vec<BolusEntry>,
    pub basal: Vec<BasalSpan>,
}

/// The complete multi-day export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub meta: ReportMeta,
    pub profiles: Vec<ProfileDef>,
    pub days: Vec<DayReport>,
}
