// Decoder for the MBTA v3 predictions feed:
// https://api-v3.mbta.com/docs/swagger/index.html#/Prediction/ApiWeb_PredictionController_index
extern crate chrono;
extern crate chrono_tz;
extern crate serde;
extern crate serde_json;

use chrono::TimeZone;

use crate::config::TimestampMode;
use crate::result::ParseError;
use crate::structs::Arrival;

const ARRIVALS_PER_STOP: usize = 2;

#[derive(Deserialize, Debug)]
struct MbtaPredictionsResponse {
    data: Vec<MbtaPrediction>,
}

#[derive(Deserialize, Debug)]
struct MbtaPrediction {
    #[serde(default)]
    attributes: Option<MbtaPredictionAttributes>,
}

#[derive(Deserialize, Debug)]
struct MbtaPredictionAttributes {
    // null for trips that terminate or only depart here
    #[serde(default)]
    arrival_time: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PredictionParser {
    mode: TimestampMode,
    timezone: chrono_tz::Tz,
}

impl PredictionParser {
    pub fn new(mode: TimestampMode, timezone: chrono_tz::Tz) -> PredictionParser {
        return PredictionParser{mode: mode, timezone: timezone};
    }

    /// Returns the first two arrivals in feed order. Later entries are ignored.
    pub fn parse(&self, body: &str) -> Result<[Arrival; ARRIVALS_PER_STOP], ParseError> {
        let response: MbtaPredictionsResponse = serde_json::from_str(body)?;

        if response.data.len() < ARRIVALS_PER_STOP {
            return Err(ParseError::TooFewPredictions{
                expected: ARRIVALS_PER_STOP,
                found: response.data.len(),
            });
        }

        return Ok([
            self.parse_prediction(0, &response.data[0])?,
            self.parse_prediction(1, &response.data[1])?,
        ]);
    }

    fn parse_prediction(&self, index: usize, prediction: &MbtaPrediction) -> Result<Arrival, ParseError> {
        let raw = prediction.attributes.as_ref()
            .and_then(|a| a.arrival_time.as_ref())
            .ok_or(ParseError::MissingArrivalTime{index: index})?;

        let parsed = match self.mode {
            TimestampMode::OffsetAware => parse_offset_aware(raw),
            TimestampMode::LocalWallClock => parse_local_wall_clock(raw, self.timezone),
        };

        return parsed.map(Arrival::new).ok_or_else(|| ParseError::MalformedArrivalTime{
            index: index,
            value: raw.to_string(),
        });
    }
}

fn parse_offset_aware(raw: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    return chrono::DateTime::parse_from_rfc3339(raw.trim()).ok();
}

// "2024-01-01T10:05:00-05:00" -> "2024-01-01" + "10:05:00", read in `timezone`.
// Only correct while the feed's offset matches the timezone's.
fn parse_local_wall_clock(raw: &str, timezone: chrono_tz::Tz) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let date = raw.get(0..10)?;
    let time = raw.get(11..19)?;
    let naive = chrono::NaiveDateTime::parse_from_str(
        &format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").ok()?;
    let local = timezone.from_local_datetime(&naive).earliest()?;
    return Some(local.fixed_offset());
}

#[cfg(test)]
mod tests {
    extern crate chrono;

    use super::*;

    fn offset_aware() -> PredictionParser {
        return PredictionParser::new(TimestampMode::OffsetAware, chrono_tz::America::New_York);
    }

    fn instant(rfc3339: &str) -> Arrival {
        return Arrival::new(chrono::DateTime::parse_from_rfc3339(rfc3339).unwrap());
    }

    #[test]
    fn two_arrivals() {
        let body = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01T10:05:00-05:00"}},{"attributes":{"arrival_time":"2024-01-01T10:12:00-05:00"}}]}"#;
        let arrivals = offset_aware().parse(body).expect("parse");
        assert_eq!(instant("2024-01-01T10:05:00-05:00"), arrivals[0]);
        assert_eq!(instant("2024-01-01T10:12:00-05:00"), arrivals[1]);
    }

    #[test]
    fn golden_feed_ignores_extra_entries() {
        let body = std::fs::read_to_string("testdata/predictions_70028.json")
            .expect("Error reading predictions_70028.json");
        let arrivals = offset_aware().parse(&body).expect("parse");
        assert_eq!(
            [instant("2024-01-01T10:05:00-05:00"), instant("2024-01-01T10:12:00-05:00")],
            arrivals);
    }

    #[test]
    fn keeps_feed_order() {
        let body = std::fs::read_to_string("testdata/predictions_70029.json")
            .expect("Error reading predictions_70029.json");
        let arrivals = offset_aware().parse(&body).expect("parse");
        assert_eq!(instant("2024-01-01T10:03:10-05:00"), arrivals[0]);
        assert_eq!(instant("2024-01-01T10:00:40-05:00"), arrivals[1]);
    }

    #[test]
    fn too_few_predictions() {
        let one = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01T10:05:00-05:00"}}]}"#;
        assert!(matches!(
            offset_aware().parse(one),
            Err(ParseError::TooFewPredictions{expected: 2, found: 1})));
        assert!(matches!(
            offset_aware().parse(r#"{"data":[]}"#),
            Err(ParseError::TooFewPredictions{expected: 2, found: 0})));
    }

    #[test]
    fn missing_arrival_time() {
        let null_time = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01T10:05:00-05:00"}},{"attributes":{"arrival_time":null}}]}"#;
        assert!(matches!(
            offset_aware().parse(null_time),
            Err(ParseError::MissingArrivalTime{index: 1})));

        let no_attributes = r#"{"data":[{"id":"x"},{"attributes":{"arrival_time":"2024-01-01T10:05:00-05:00"}}]}"#;
        assert!(matches!(
            offset_aware().parse(no_attributes),
            Err(ParseError::MissingArrivalTime{index: 0})));
    }

    #[test]
    fn malformed_arrival_time() {
        let body = r#"{"data":[{"attributes":{"arrival_time":"soon"}},{"attributes":{"arrival_time":"2024-01-01T10:05:00-05:00"}}]}"#;
        match offset_aware().parse(body) {
            Err(ParseError::MalformedArrivalTime{index, value}) => {
                assert_eq!(0, index);
                assert_eq!("soon", value);
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn not_a_prediction_document() {
        assert!(matches!(offset_aware().parse("<html>503</html>"), Err(ParseError::Json(_))));
        assert!(matches!(offset_aware().parse(r#"{"errors":[]}"#), Err(ParseError::Json(_))));
    }

    #[test]
    fn wall_clock_mode_ignores_offset() {
        let parser = PredictionParser::new(TimestampMode::LocalWallClock, chrono_tz::America::New_York);

        // Offset matches New York: same instant either way.
        let body = r#"{"data":[{"attributes":{"arrival_time":"2024-07-01T10:05:00-04:00"}},{"attributes":{"arrival_time":"2024-01-01T10:12:00-05:00"}}]}"#;
        let arrivals = parser.parse(body).expect("parse");
        assert_eq!(instant("2024-07-01T10:05:00-04:00"), arrivals[0]);
        assert_eq!(instant("2024-01-01T10:12:00-05:00"), arrivals[1]);

        // UTC suffix is dropped and the wall time is read as Eastern.
        let body = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01T15:05:00Z"}},{"attributes":{"arrival_time":"2024-01-01T15:12:00+00:00"}}]}"#;
        let arrivals = parser.parse(body).expect("parse");
        assert_eq!(instant("2024-01-01T15:05:00-05:00"), arrivals[0]);
        assert_eq!(instant("2024-01-01T15:12:00-05:00"), arrivals[1]);
    }

    #[test]
    fn wall_clock_mode_rejects_short_and_nonexistent_times() {
        let parser = PredictionParser::new(TimestampMode::LocalWallClock, chrono_tz::America::New_York);
        let short = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01"}},{"attributes":{"arrival_time":"2024-01-01T10:12:00-05:00"}}]}"#;
        assert!(matches!(parser.parse(short), Err(ParseError::MalformedArrivalTime{index: 0, ..})));

        // 02:30 never happens on the spring-forward date.
        let gap = r#"{"data":[{"attributes":{"arrival_time":"2024-01-01T10:12:00-05:00"}},{"attributes":{"arrival_time":"2024-03-10T02:30:00-05:00"}}]}"#;
        assert!(matches!(parser.parse(gap), Err(ParseError::MalformedArrivalTime{index: 1, ..})));
    }
}
