use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::{GameRecord, RatingPoint};

/// One date of the merged timeline. `values[i]` belongs to `entities[i]` of
/// the owning series; None means the entity has no rating yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPoint {
    pub date: NaiveDate,
    pub values: Vec<Option<i32>>,
}

/// Aligned, forward-filled rating timeline for several entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledSeries {
    pub entities: Vec<String>,
    pub points: Vec<ReconciledPoint>,
}

impl ReconciledSeries {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Value of `entity` at `date`, None if either is unknown or not yet rated.
    pub fn value(&self, entity: &str, date: NaiveDate) -> Option<i32> {
        let idx = self.entities.iter().position(|e| e == entity)?;
        let point = self.points.iter().find(|p| p.date == date)?;
        point.values[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Serialized as `[{"date": "2024-01-01", "<entity>": rating, ...}]`;
/// absent entities are omitted from their record.
impl Serialize for ReconciledSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.points.iter().map(|p| PointView {
            entities: &self.entities,
            point: p,
        }))
    }
}

struct PointView<'a> {
    entities: &'a [String],
    point: &'a ReconciledPoint,
}

impl Serialize for PointView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("date", &self.point.date)?;
        for (entity, value) in self.entities.iter().zip(&self.point.values) {
            if let Some(rating) = value {
                map.serialize_entry(entity, rating)?;
            }
        }
        map.end()
    }
}

/// Merge independently sampled monthly series into one timeline.
///
/// Dates are the sorted union of every entity's dates. At each date an
/// entity reports its own point if it has one, otherwise its most recent
/// earlier value, otherwise nothing. Values never flow backwards in time.
/// If an entity lists the same date twice, the later point wins.
pub fn reconcile<I, K>(series_by_entity: I) -> ReconciledSeries
where
    I: IntoIterator<Item = (K, Vec<RatingPoint>)>,
    K: Into<String>,
{
    let mut entities = Vec::new();
    let mut lookups: Vec<BTreeMap<NaiveDate, i32>> = Vec::new();
    let mut all_dates = BTreeSet::new();

    for (entity, points) in series_by_entity {
        let mut by_date = BTreeMap::new();
        for p in points {
            all_dates.insert(p.date);
            by_date.insert(p.date, p.rating);
        }
        entities.push(entity.into());
        lookups.push(by_date);
    }

    let mut last_known: Vec<Option<i32>> = vec![None; entities.len()];
    let points = all_dates
        .into_iter()
        .map(|date| {
            for (slot, by_date) in last_known.iter_mut().zip(&lookups) {
                if let Some(&rating) = by_date.get(&date) {
                    *slot = Some(rating);
                }
            }
            ReconciledPoint {
                date,
                values: last_known.clone(),
            }
        })
        .collect();

    ReconciledSeries { entities, points }
}

/// One archive month's rating sample for `subject`: the subject's rating in
/// the last game of `time_class`, dated to that game's month.
///
/// `games` must be in archive order (oldest first) with variants already
/// filtered out.
pub fn monthly_rating_point(
    games: &[GameRecord],
    subject: &str,
    time_class: &str,
) -> Option<RatingPoint> {
    let last = games
        .iter()
        .rev()
        .find(|g| g.time_class.as_deref() == Some(time_class))?;
    let side = if last.white.username.eq_ignore_ascii_case(subject) {
        &last.white
    } else if last.black.username.eq_ignore_ascii_case(subject) {
        &last.black
    } else {
        return None;
    };
    Some(RatingPoint::for_month_of(last.end_time, side.rating))
}
