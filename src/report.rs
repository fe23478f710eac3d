//! Report assembly
//!
//! Collects profile definitions and per-day results into the structured
//! export value. This module builds the serde-serializable report only;
//! writing it to disk, stdout, or a database belongs to the caller.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{
    BasalDay, BasalSpan, BolusEntry, CarbEntry, CgmEntry, DayDate, DayReport, ExportReport,
    ProfileBlock, ProfileDef, ProfileStore, ReportMeta,
};
use crate::{DIAFLUX_VERSION, PRODUCER_NAME};

/// Current report schema version
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Accumulates days and profiles, then stamps metadata on `build`.
#[derive(Debug)]
pub struct ReportBuilder {
    export_id: String,
    profiles: Vec<ProfileDef>,
    days: Vec<DayReport>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    /// Create a builder with a unique export id.
    pub fn new() -> Self {
        Self {
            export_id: Uuid::new_v4().to_string(),
            profiles: Vec::new(),
            days: Vec::new(),
        }
    }

    /// Create a builder with a specific export id.
    pub fn with_export_id(export_id: String) -> Self {
        Self {
            export_id,
            profiles: Vec::new(),
            days: Vec::new(),
        }
    }

    /// Register every schedule of a normalized store as a report profile
    /// definition.
    pub fn add_profiles(&mut self, store: &ProfileStore) {
        let tz = store.timezone.as_deref().unwrap_or("UTC");
        for (name, steps) in &store.schedules {
            let blocks: Vec<ProfileBlock> = steps
                .iter()
                .map(|step| ProfileBlock {
                    m: step.minute_of_day.min(1440),
                    iu_h: step.rate_u_per_h,
                })
                .collect();
            if blocks.is_empty() {
                continue;
            }
            self.profiles.push(ProfileDef {
                id: name.clone(),
                name: name.clone(),
                tz: tz.to_string(),
                blocks,
            });
        }
    }

    /// Append one computed day together with its extracted series.
    pub fn add_day(
        &mut self,
        basal: &BasalDay,
        cgm: Vec<CgmEntry>,
        carbs: Vec<CarbEntry>,
        bolus: Vec<BolusEntry>,
    ) {
        let spans: Vec<BasalSpan> = basal
            .segments
            .iter()
            .map(|seg| BasalSpan {
                t: seg.start.timestamp(),
                iu_sum: seg.total_units,
                iu_h: seg.rate_u_per_h,
                d: (seg.end - seg.start).num_seconds(),
                kind: seg.label,
            })
            .collect();
        self.days.push(DayReport {
            date: DayDate {
                timezone: basal.timezone.clone(),
                t: basal.window.day_start.timestamp(),
            },
            cgm,
            carbs,
            bolus,
            basal: spans,
        });
    }

    /// Finalize the report, stamping generation time and producer metadata.
    pub fn build(self) -> ExportReport {
        ExportReport {
            meta: ReportMeta {
                schema_version: REPORT_SCHEMA_VERSION,
                generated_at: Utc::now().timestamp(),
                producer: PRODUCER_NAME.to_string(),
                version: DIAFLUX_VERSION.to_string(),
                export_id: self.export_id,
            },
            profiles: self.profiles,
            days: self.days,
        }
    }
}
