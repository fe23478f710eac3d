//! Diaflux - Deterministic compute engine for insulin-pump and CGM diary exports
//!
//! Diaflux reconstructs what an insulin pump actually delivered on a given
//! calendar day from the partially-overlapping records a remote diary
//! service keeps: scheduled basal profiles, profile switches, temporary
//! basal overrides, and combo/extended boluses. The result is a minimal,
//! gap-free sequence of rate segments whose integral reproduces total
//! delivered insulin, plus the CGM, carb, and bolus series needed for a
//! structured day-by-day export.
//!
//! ## Modules
//!
//! - **Basal engine**: window resolution → profile normalization → baseline
//!   building → overlay parsing → timeline assembly
//! - **Series extraction**: CGM, bolus, and carb series per day
//! - **Report**: assembly of the structured multi-day export

pub mod baseline;
pub mod error;
pub mod extract;
pub mod overlay;
pub mod pipeline;
pub mod profiles;
pub mod report;
pub mod schema;
pub mod timeline;
pub mod types;
pub mod window;

pub use error::ExportError;
pub use pipeline::{compute_basal_day_from_records, DayExporter, DiaryService};
pub use report::ReportBuilder;

// Schema exports
pub use schema::{RawEntry, RawTreatment};

// Core result types
pub use types::{BasalDay, ExportReport, ResolvedSegment, SegmentLabel};

/// Diaflux version embedded in report metadata
pub const DIAFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report metadata
pub const PRODUCER_NAME: &str = "diaflux";
