//! Activity histograms and outcome summaries over a slice of games.
//!
//! Every bucket is computed in UTC: weekday and hour come from the game's
//! UTC end time, calendar days are UTC dates.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use serde::Serialize;

use crate::types::{Color, ColorStats, GameRecord, Summary};

pub const DAYS_PER_WEEK: usize = 7;
pub const HOURS_PER_DAY: usize = 24;

// ---------------------------------------------------------------------------
// ActivityGrid
// ---------------------------------------------------------------------------

/// Games per (weekday, hour). Row 0 is Sunday, row 6 Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ActivityGrid {
    cells: [[u32; HOURS_PER_DAY]; DAYS_PER_WEEK],
}

#[derive(Debug, Clone, Serialize)]
pub struct HourCount {
    pub hour: usize,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayActivity {
    pub day: usize,
    pub hours: Vec<HourCount>,
}

impl ActivityGrid {
    pub fn record(&mut self, ts: DateTime<Utc>) {
        let day = ts.weekday().num_days_from_sunday() as usize;
        let hour = ts.hour() as usize;
        self.cells[day][hour] += 1;
    }

    /// Count for `day` (0=Sunday) and `hour`. Out-of-range indices read as 0.
    pub fn get(&self, day: usize, hour: usize) -> u32 {
        self.cells
            .get(day)
            .and_then(|row| row.get(hour))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.cells.iter().flatten().sum()
    }

    pub fn max(&self) -> u32 {
        self.cells.iter().flatten().copied().max().unwrap_or(0)
    }

    /// `[{day, hours: [{hour, count}]}]`, the shape the dashboard renders.
    pub fn rows(&self) -> Vec<DayActivity> {
        self.cells
            .iter()
            .enumerate()
            .map(|(day, hours)| DayActivity {
                day,
                hours: hours
                    .iter()
                    .enumerate()
                    .map(|(hour, &count)| HourCount { hour, count })
                    .collect(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// DailyActivity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u32,
}

/// Games per UTC calendar date. Dates with no games are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DailyActivity {
    days: BTreeMap<NaiveDate, u32>,
}

impl DailyActivity {
    pub fn record(&mut self, ts: DateTime<Utc>) {
        *self.days.entry(ts.date_naive()).or_insert(0) += 1;
    }

    pub fn get(&self, date: NaiveDate) -> u32 {
        self.days.get(&date).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Ascending `{date, count}` list.
    pub fn entries(&self) -> Vec<DailyCount> {
        self.days
            .iter()
            .map(|(&date, &count)| DailyCount { date, count })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityReport {
    pub grid: ActivityGrid,
    pub summary: Summary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColorSplit {
    pub white: ColorStats,
    pub black: ColorStats,
}

/// Weekday×hour grid plus overall outcome summary.
pub fn aggregate(games: &[GameRecord]) -> ActivityReport {
    let mut report = ActivityReport::default();
    for game in games {
        report.grid.record(game.end_time);
        report.summary.record(game.outcome());
    }
    report
}

pub fn aggregate_daily(games: &[GameRecord]) -> DailyActivity {
    let mut daily = DailyActivity::default();
    for game in games {
        daily.record(game.end_time);
    }
    daily
}

pub fn color_split(games: &[GameRecord]) -> ColorSplit {
    let mut split = ColorSplit::default();
    for game in games {
        let stats = match game.subject_color {
            Color::White => &mut split.white,
            Color::Black => &mut split.black,
        };
        stats.record(game.outcome());
    }
    split
}

/// Games that ended within `days` before `now` (inclusive of the boundary).
/// A window reaching past the representable calendar keeps every game up
/// to `now`.
pub fn within_days(games: &[GameRecord], now: DateTime<Utc>, days: i64) -> Vec<GameRecord> {
    let since = TimeDelta::try_days(days).and_then(|d| now.checked_sub_signed(d));
    games
        .iter()
        .filter(|g| since.map_or(true, |since| g.end_time >= since) && g.end_time <= now)
        .cloned()
        .collect()
}
