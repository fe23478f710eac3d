//! Timeline assembly
//!
//! Composes the baseline with both overlay sets using the sweep-line
//! cut-point technique: every interval boundary inside the day becomes a cut
//! point, the effective rate is resolved once per resulting sub-interval,
//! and equal-rate neighbours are coalesced afterwards.
//!
//! Priority inside a sub-interval: an active temp with an absolute rate wins
//! outright; an active temp with a percent delta scales the baseline; any
//! other active temp keeps the baseline rate. A combo contribution is added
//! on top unless the active temp is an absolute-zero suspend, because a
//! suspended pump cannot also be delivering an extended bolus.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::types::{
    BaselineSegment, ComboBolusOverlay, Overlays, ResolvedSegment, SegmentLabel, TempBasalOverlay,
};

/// Round half away from zero at 4 decimal places. Applied to both rates and
/// unit totals so that re-summing coalesced segments never drifts from the
/// pre-merge list by more than floating-point epsilon.
pub(crate) fn round4(n: f64) -> f64 {
    (n * 10_000.0).round() / 10_000.0
}

/// Resolve the full day into rate segments. An empty result is a broken
/// invariant (the baseline already covered the day); the caller surfaces it
/// as `NoSegmentsProduced`.
pub fn assemble(
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    baseline: &[BaselineSegment],
    overlays: &Overlays,
) -> Vec<ResolvedSegment> {
    let cuts = cut_points(day_start, day_end, baseline, overlays);

    let resolved: Vec<ResolvedSegment> = cuts
        .windows(2)
        .filter(|pair| pair[0] < pair[1])
        .map(|pair| resolve_slice(pair[0], pair[1], baseline, overlays))
        .collect();

    coalesce(resolved)
}

/// Every boundary that can change the effective rate, clipped to the day,
/// deduplicated, ascending.
fn cut_points(
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    baseline: &[BaselineSegment],
    overlays: &Overlays,
) -> Vec<DateTime<Utc>> {
    let mut boundaries: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    boundaries.insert(day_start);
    boundaries.insert(day_end);
    for seg in baseline {
        boundaries.insert(seg.start);
        boundaries.insert(seg.end);
    }
    for temp in &overlays.temps {
        insert_clipped(&mut boundaries, day_start, day_end, temp.start, temp.end);
    }
    for combo in &overlays.combos {
        insert_clipped(&mut boundaries, day_start, day_end, combo.start, combo.end);
    }
    boundaries
        .into_iter()
        .filter(|t| *t >= day_start && *t <= day_end)
        .collect()
}

fn insert_clipped(
    boundaries: &mut BTreeSet<DateTime<Utc>>,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    let a = start.max(day_start);
    let b = end.min(day_end);
    if a < b {
        boundaries.insert(a);
        boundaries.insert(b);
    }
}

fn resolve_slice(
    a: DateTime<Utc>,
    b: DateTime<Utc>,
    baseline: &[BaselineSegment],
    overlays: &Overlays,
) -> ResolvedSegment {
    let base = baseline_rate_at(baseline, a);
    let temp = active_temp_at(&overlays.temps, a);

    let (mut rate, mut label) = match temp {
        Some(t) => match (t.absolute, t.percent) {
            (Some(abs), _) => (abs, SegmentLabel::TempAbsolute),
            (None, Some(pct)) => (
                (base * (100.0 + pct) / 100.0).max(0.0),
                SegmentLabel::TempPercent,
            ),
            (None, None) => (base, SegmentLabel::TempUnknown),
        },
        None => (base, SegmentLabel::Baseline),
    };

    // An absolute-zero temp is an explicit suspend; it silences any combo
    // running over the same span.
    let suspended = matches!(temp.and_then(|t| t.absolute), Some(abs) if abs == 0.0);
    let combo = if suspended {
        0.0
    } else {
        combo_rate_at(&overlays.combos, a)
    };
    if combo != 0.0 {
        rate = (rate + combo).max(0.0);
        label = label.with_combo();
    }

    let hours = (b - a).num_milliseconds() as f64 / 3_600_000.0;
    ResolvedSegment {
        start: a,
        end: b,
        rate_u_per_h: round4(rate),
        total_units: round4(rate * hours),
        label,
    }
}

/// Baseline rate at an instant: the segment containing it, with percentage
/// applied. Instants before the first segment take the first segment's rate
/// and instants past the last take the last's; with a covering baseline
/// neither fallback is reachable.
fn baseline_rate_at(baseline: &[BaselineSegment], at: DateTime<Utc>) -> f64 {
    for seg in baseline.iter().rev() {
        if at >= seg.start && at < seg.end {
            return seg.base_rate * seg.pct_multiplier;
        }
    }
    for seg in baseline {
        if at < seg.start {
            return seg.base_rate * seg.pct_multiplier;
        }
    }
    baseline
        .last()
        .map_or(0.0, |seg| seg.base_rate * seg.pct_multiplier)
}

/// The temp active at an instant. When temps genuinely overlap the last one
/// in start order wins; that tie-break follows input ordering and is kept
/// as-is.
fn active_temp_at(temps: &[TempBasalOverlay], at: DateTime<Utc>) -> Option<&TempBasalOverlay> {
    temps
        .iter()
        .filter(|t| at >= t.start && at < t.end)
        .last()
}

fn combo_rate_at(combos: &[ComboBolusOverlay], at: DateTime<Utc>) -> f64 {
    let mut rate = 0.0;
    for combo in combos {
        if combo.start > at {
            break;
        }
        if at >= combo.start && at < combo.end {
            rate = combo.relative_u_per_h;
        }
    }
    rate
}

/// Merge consecutive segments that share rounded rate, label, and a common
/// boundary, summing their totals. Idempotent.
pub fn coalesce(segments: Vec<ResolvedSegment>) -> Vec<ResolvedSegment> {
    let mut merged: Vec<ResolvedSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match merged.last_mut() {
            Some(last)
                if last.rate_u_per_h == seg.rate_u_per_h
                    && last.label == seg.label
                    && last.end == seg.start =>
            {
                last.end = seg.end;
                last.total_units = round4(last.total_units + seg.total_units);
            }
            _ => merged.push(seg),
        }
    }
    merged
}
