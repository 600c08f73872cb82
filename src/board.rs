extern crate chrono;
extern crate chrono_tz;

use crate::store::PollHealth;
use crate::structs::{Arrival, ArrivalSnapshot};
use crate::timemath::RemainingLabel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardTrain {
    pub label: String,
    pub minutes: Option<i64>,
    pub arrival_time: String,
    pub local_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRow {
    pub direction: String,
    pub stop: String,
    pub next: BoardTrain,
    pub following: BoardTrain,
}

fn board_train(label: RemainingLabel, arrival: &Arrival, tz: chrono_tz::Tz) -> BoardTrain {
    return BoardTrain{
        label: label.to_string(),
        minutes: match label {
            RemainingLabel::Minutes(minutes) => Some(minutes),
            RemainingLabel::Boarding => None,
        },
        arrival_time: arrival.at().to_rfc3339(),
        local_time: arrival.at().with_timezone(&tz).format("%-I:%M").to_string(),
    };
}

/// Labels are computed against `now`, so the same snapshot counts down as
/// time passes.
pub fn rows(snapshot: &ArrivalSnapshot, now: chrono::DateTime<chrono::Utc>, tz: chrono_tz::Tz) -> Vec<BoardRow> {
    return snapshot.directions.iter().map(|d| {
        let labels = d.labels(now);
        return BoardRow{
            direction: d.direction.name.clone(),
            stop: d.direction.stop.to_string(),
            next: board_train(labels[0], &d.next, tz),
            following: board_train(labels[1], &d.following, tz),
        };
    }).collect();
}

pub fn staleness_note(health: &PollHealth) -> Option<String> {
    if health.consecutive_failures == 0 {
        return None;
    }
    return Some(format!(
        "{} failed update(s): {}",
        health.consecutive_failures,
        health.last_error.clone().unwrap_or("unknown error".to_string())));
}

pub fn render_text(snapshot: Option<&ArrivalSnapshot>,
                   health: &PollHealth,
                   now: chrono::DateTime<chrono::Utc>,
                   tz: chrono_tz::Tz) -> String {
    let mut out = String::new();

    match snapshot {
        None => out.push_str("Waiting for first arrival predictions...\n"),
        Some(snapshot) => {
            let width = snapshot.directions.iter()
                .map(|d| d.direction.name.chars().count())
                .max()
                .unwrap_or(0);
            for row in rows(snapshot, now, tz) {
                out.push_str(&format!(
                    "{:<width$}  next: {:>10} ({:>5})  then: {:>10} ({:>5})\n",
                    row.direction,
                    row.next.label, row.next.local_time,
                    row.following.label, row.following.local_time,
                    width = width));
            }
            out.push_str(&format!(
                "Updated {} ({}s ago)\n",
                snapshot.fetched_at.with_timezone(&tz).format("%-I:%M:%S %p"),
                snapshot.age(now).num_seconds()));
        },
    }

    if let Some(note) = staleness_note(health) {
        out.push_str(&format!("WARNING: {}\n", note));
    }
    return out;
}
