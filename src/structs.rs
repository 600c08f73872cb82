extern crate chrono;

use crate::result::ConfigError;
use crate::timemath;

/// Identifies one directional platform in the prediction feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StopFilter(String);

impl StopFilter {
    pub fn new(id: &str) -> Result<StopFilter, ConfigError> {
        let id = id.trim();
        let valid_char = |c: char| c.is_ascii_alphanumeric() || "-_.:".contains(c);
        if id.is_empty() || !id.chars().all(valid_char) {
            return Err(ConfigError::InvalidStopFilter(id.to_string()));
        }
        return Ok(StopFilter(id.to_string()));
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl std::fmt::Display for StopFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        return write!(f, "{}", self.0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Direction {
    pub name: String,
    pub stop: StopFilter,
}

/// Predicted instant a train reaches the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    at: chrono::DateTime<chrono::FixedOffset>,
}

impl Arrival {
    pub fn new(at: chrono::DateTime<chrono::FixedOffset>) -> Arrival {
        return Arrival{at: at};
    }

    pub fn at(&self) -> chrono::DateTime<chrono::FixedOffset> {
        return self.at;
    }

    pub fn utc(&self) -> chrono::DateTime<chrono::Utc> {
        return self.at.with_timezone(&chrono::Utc);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionArrivals {
    pub direction: Direction,
    pub next: Arrival,
    pub following: Arrival,
}

impl DirectionArrivals {
    pub fn labels(&self, now: chrono::DateTime<chrono::Utc>) -> [timemath::RemainingLabel; 2] {
        return [
            timemath::remaining_label(now, &self.next),
            timemath::remaining_label(now, &self.following),
        ];
    }
}

/// Everything one poll cycle produced. Never mutated after construction;
/// a newer cycle replaces it as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalSnapshot {
    pub cycle: u64,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub directions: [DirectionArrivals; 2],
}

impl ArrivalSnapshot {
    pub fn age(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::Duration {
        return now - self.fetched_at;
    }
}

// Community College, fetched `cycle` * 15s after 10:00 EST, with every
// field derived from `cycle`.
#[cfg(test)]
pub fn sample_snapshot(cycle: u64) -> ArrivalSnapshot {
    let eastern = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
    let start = chrono::DateTime::parse_from_rfc3339("2024-01-01T10:00:00-05:00").unwrap();
    let fetched_at = start + chrono::Duration::seconds(15 * cycle as i64);
    let arrival = |minutes: i64| {
        return Arrival::new((fetched_at + chrono::Duration::minutes(minutes)).with_timezone(&eastern));
    };
    let direction = |name: &str, stop: &str| {
        return Direction{name: name.to_string(), stop: StopFilter::new(stop).unwrap()};
    };
    return ArrivalSnapshot{
        cycle: cycle,
        fetched_at: fetched_at.with_timezone(&chrono::Utc),
        directions: [
            DirectionArrivals{direction: direction("Forest Hills", "70028"), next: arrival(5), following: arrival(12)},
            DirectionArrivals{direction: direction("Oak Grove", "70029"), next: arrival(3), following: arrival(0)},
        ],
    };
}
