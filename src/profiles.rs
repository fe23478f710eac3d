//! Profile store normalization
//!
//! Turns a raw profile document into a named mapping of basal schedules.
//! Step times arrive in three spellings (explicit minutes, seconds-of-day,
//! "HH:MM"); unparsable steps are discarded and profiles left with no steps
//! are dropped entirely, since they cannot serve as a schedule.

use std::collections::BTreeMap;

use tracing::debug;

use crate::schema::{RawBasalStep, RawProfile, RawProfileDocument};
use crate::types::{BasalStep, ProfileStore};

/// Normalize a raw profile document (or an array of documents, in which case
/// the first is taken). Returns `None` when no store can be located at all.
pub fn normalize(raw: &serde_json::Value) -> Option<ProfileStore> {
    let doc_value = match raw {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    if !doc_value.is_object() {
        return None;
    }
    let doc: RawProfileDocument = serde_json::from_value(doc_value.clone()).ok()?;

    let default_profile = doc
        .default_profile
        .or(doc.default_legacy)
        .unwrap_or_else(|| "Default".to_string());

    // Prefer the explicit store; older documents flatten profiles into the
    // document root.
    let raw_store: BTreeMap<String, RawProfile> = match doc.store {
        Some(store) => store,
        None => doc
            .rest
            .into_iter()
            .filter_map(|(name, value)| {
                serde_json::from_value::<RawProfile>(value)
                    .ok()
                    .filter(|p| p.basal.is_some())
                    .map(|p| (name, p))
            })
            .collect(),
    };
    if raw_store.is_empty() {
        return None;
    }

    let timezone = raw_store
        .get(&default_profile)
        .and_then(|p| p.timezone.clone());

    let mut schedules = BTreeMap::new();
    for (name, profile) in &raw_store {
        let steps = parse_schedule(profile.basal.as_deref().unwrap_or(&[]));
        if steps.is_empty() {
            debug!(profile = %name, "dropping profile with no usable basal steps");
            continue;
        }
        schedules.insert(name.clone(), steps);
    }

    Some(ProfileStore {
        default_profile,
        timezone,
        schedules,
    })
}

/// Parse a raw basal step table into a sorted schedule.
///
/// Minute-of-day precedence per step: explicit `minutes`, then
/// `timeAsSeconds / 60`, then an "HH:MM" string from `start` or `time`.
pub(crate) fn parse_schedule(raw_steps: &[RawBasalStep]) -> Vec<BasalStep> {
    let mut steps: Vec<BasalStep> = raw_steps
        .iter()
        .filter_map(|step| {
            let minute = resolve_minute(step)?;
            let rate = step.value.as_ref()?.as_f64()?;
            if rate < 0.0 {
                return None;
            }
            Some(BasalStep {
                minute_of_day: minute,
                rate_u_per_h: rate,
            })
        })
        .collect();
    steps.sort_by_key(|s| s.minute_of_day);
    steps
}

fn resolve_minute(step: &RawBasalStep) -> Option<u32> {
    let minutes = if let Some(m) = step.minutes.filter(|v| v.is_finite()) {
        m.floor()
    } else if let Some(s) = step.time_as_seconds.filter(|v| v.is_finite()) {
        (s / 60.0).floor()
    } else {
        let hm = step.start.as_deref().or(step.time.as_deref())?;
        f64::from(hm_to_minutes(hm)?)
    };
    if minutes < 0.0 {
        return None;
    }
    Some((minutes as u32).min(1440))
}

fn hm_to_minutes(hm: &str) -> Option<u32> {
    let (h, m) = hm.trim().split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.get(..2).unwrap_or(m).parse().ok()?;
    Some(hours * 60 + minutes)
}
