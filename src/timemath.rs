extern crate chrono;

use crate::structs::Arrival;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingLabel {
    Minutes(i64),
    // Imminent, due, or already gone. The board never shows a negative countdown.
    Boarding,
}

impl std::fmt::Display for RemainingLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            RemainingLabel::Minutes(minutes) => return write!(f, "{} minutes", minutes),
            RemainingLabel::Boarding => return write!(f, "BRD"),
        }
    }
}

// Whole minutes between now and the arrival, truncated toward zero.
pub fn minutes_remaining(now: chrono::DateTime<chrono::Utc>, arrival: &Arrival) -> i64 {
    return (arrival.utc() - now).num_minutes();
}

pub fn label(minutes: i64) -> RemainingLabel {
    if minutes >= 1 {
        return RemainingLabel::Minutes(minutes);
    }
    return RemainingLabel::Boarding;
}

pub fn remaining_label(now: chrono::DateTime<chrono::Utc>, arrival: &Arrival) -> RemainingLabel {
    return label(minutes_remaining(now, arrival));
}
