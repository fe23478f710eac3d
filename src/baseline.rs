//! Baseline (scheduled) delivery reconstruction
//!
//! Combines the normalized profile store with the day's profile-switch
//! events into a gap-free list of baseline segments, each carrying the
//! scheduled rate and the active percentage multiplier. Schedule expansion
//! is anchored at local midnight, not at the interval start: a profile
//! active from 14:00 to 22:00 uses the schedule's 14:00-22:00 slice, because
//! basal schedules are time-of-day tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::profiles::parse_schedule;
use crate::schema::{RawProfile, RawTreatment};
use crate::types::{BasalStep, BaselineSegment, ProfileStore, ProfileSwitch};
use crate::window::local_midnight;

/// Strip a trailing "(<n>%)" annotation some servers embed in switch
/// profile names, e.g. "Weekend (120%)" -> "Weekend".
pub(crate) fn normalize_profile_name(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(rest) = trimmed.strip_suffix(')') {
        if let Some(open) = rest.rfind('(') {
            let inner = rest[open + 1..].trim();
            if let Some(digits) = inner.strip_suffix('%') {
                let digits = digits.trim();
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    return rest[..open].trim_end().to_string();
                }
            }
        }
    }
    trimmed.to_string()
}

/// Extract profile-switch events from the raw treatment stream, in stable
/// chronological order. Records without a timestamp or a resolvable profile
/// name are dropped.
pub fn extract_switches(treatments: &[RawTreatment]) -> Vec<ProfileSwitch> {
    let mut switches: Vec<ProfileSwitch> = treatments
        .iter()
        .filter(|t| t.is_profile_switch())
        .filter_map(|t| {
            let ms = t.timestamp_ms()?;
            let at = DateTime::from_timestamp_millis(ms)?;
            let profile = normalize_profile_name(&t.switch_profile_name()?);
            Some(ProfileSwitch {
                at,
                profile,
                percentage: t.switch_percentage(),
                inline_schedule: inline_schedule(t),
            })
        })
        .collect();
    // Stable sort keeps original fetch order for equal timestamps.
    switches.sort_by_key(|sw| sw.at);
    switches
}

/// Ad-hoc schedule embedded in a switch record, when present and usable.
fn inline_schedule(treatment: &RawTreatment) -> Option<Vec<BasalStep>> {
    let raw = treatment.profile_json.as_ref()?;
    let value = match raw {
        serde_json::Value::String(text) => serde_json::from_str(text).ok()?,
        other => other.clone(),
    };
    let profile: RawProfile = serde_json::from_value(value).ok()?;
    let steps = parse_schedule(profile.basal.as_deref()?);
    if steps.is_empty() {
        None
    } else {
        Some(steps)
    }
}

/// Build the day's baseline segments.
///
/// Only switches naming a profile with a known schedule change the active
/// state; unknown-profile switches are ignored for state but never break
/// interval continuity. An empty result means no schedule could be resolved
/// for any part of the day; the caller aborts with `EmptyBaseline`.
pub fn build_baseline(
    zone: Tz,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    store: &ProfileStore,
    switches: &[ProfileSwitch],
) -> Vec<BaselineSegment> {
    // Register ad-hoc inline schedules under the switch's profile name when
    // the store does not already know it.
    let mut schedules: BTreeMap<&str, &[BasalStep]> = store
        .schedules
        .iter()
        .map(|(name, steps)| (name.as_str(), steps.as_slice()))
        .collect();
    for sw in switches {
        if let Some(steps) = &sw.inline_schedule {
            schedules
                .entry(sw.profile.as_str())
                .or_insert(steps.as_slice());
        }
    }

    let relevant: Vec<&ProfileSwitch> =
        switches.iter().filter(|sw| sw.at <= day_end).collect();

    // Active profile at day start: the most recent switch at-or-before it
    // whose target has a known schedule; otherwise the store default.
    let mut active_profile = store.default_profile.as_str();
    let mut active_pct = 100.0;
    for sw in &relevant {
        if sw.at <= day_start && schedules.contains_key(sw.profile.as_str()) {
            active_profile = sw.profile.as_str();
            active_pct = sw.percentage;
        }
    }

    // Walk switches inside the day, emitting a {profile, pct} interval each
    // time the boundary advances.
    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>, &str, f64)> = Vec::new();
    let mut cursor = day_start;
    for sw in &relevant {
        if sw.at < day_start {
            continue;
        }
        if sw.at >= day_end {
            break;
        }
        if cursor < sw.at {
            intervals.push((cursor, sw.at, active_profile, active_pct));
        }
        if schedules.contains_key(sw.profile.as_str()) {
            active_profile = sw.profile.as_str();
            active_pct = sw.percentage;
        } else {
            debug!(profile = %sw.profile, "ignoring switch to unknown profile");
        }
        cursor = sw.at;
    }
    if cursor < day_end {
        intervals.push((cursor, day_end, active_profile, active_pct));
    }

    let mut baseline: Vec<BaselineSegment> = intervals
        .into_iter()
        .flat_map(|(start, end, profile, pct)| {
            let steps = schedules.get(profile).copied().unwrap_or(&[]);
            let multiplier = pct.max(0.0) / 100.0;
            segments_from_schedule(zone, start, end, steps)
                .into_iter()
                .map(move |seg| BaselineSegment {
                    pct_multiplier: multiplier,
                    ..seg
                })
        })
        .collect();
    baseline.sort_by_key(|seg| (seg.start, seg.end));
    baseline
}

/// Project a schedule's minute-of-day steps onto the calendar day containing
/// `start` and clip them to `[start, end)`.
fn segments_from_schedule(
    zone: Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    steps: &[BasalStep],
) -> Vec<BaselineSegment> {
    let anchor = local_midnight(start.with_timezone(&zone).date_naive(), zone);
    steps
        .iter()
        .enumerate()
        .filter_map(|(i, step)| {
            let step_start = anchor + Duration::minutes(i64::from(step.minute_of_day));
            let next_minute = steps
                .get(i + 1)
                .map_or(24 * 60, |next| next.minute_of_day);
            let step_end = anchor + Duration::minutes(i64::from(next_minute));
            let a = step_start.max(start);
            let b = step_end.min(end);
            (a < b).then_some(BaselineSegment {
                start: a,
                end: b,
                base_rate: step.rate_u_per_h,
                pct_multiplier: 1.0,
            })
        })
        .collect()
}
