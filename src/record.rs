//! Study Record Module
//!
//! The value object posted to Studyplus and its wire encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted study duration, in seconds
pub const MAX_DURATION_SECS: i64 = 24 * 60 * 60;

/// How much was studied: a count, or a range of positions (pages, chapters)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAmount {
    Total(u64),
    Range { from: u64, to: u64 },
}

impl RecordAmount {
    pub fn total(amount: u64) -> Self {
        Self::Total(amount)
    }

    /// A position range; `from` must not exceed `to`
    pub fn range(from: u64, to: u64) -> Result<Self, RecordError> {
        if from > to {
            return Err(RecordError::InvalidRange { from, to });
        }
        Ok(Self::Range { from, to })
    }
}

/// One study session
#[derive(Debug, Clone, PartialEq)]
pub struct StudyRecord {
    duration: i64,
    recorded_at: DateTime<Utc>,
    amount: Option<RecordAmount>,
    comment: Option<String>,
}

impl StudyRecord {
    /// A record of `duration` seconds, recorded now
    pub fn new(duration: i64) -> Self {
        Self {
            duration,
            recorded_at: Utc::now(),
            amount: None,
            comment: None,
        }
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    pub fn amount(mut self, amount: RecordAmount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn duration_secs(&self) -> i64 {
        self.duration
    }

    pub fn recorded_at_time(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn amount_value(&self) -> Option<RecordAmount> {
        self.amount
    }

    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

/// JSON body expected by `POST /v1/study_records`
#[derive(Serialize, Deserialize)]
struct WireRecord<'a> {
    duration: i64,
    recorded_at: String,
    #[serde(borrow, default, skip_serializing_if = "Option::is_none")]
    comment: Option<std::borrow::Cow<'a, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_position: Option<u64>,
}

/// True iff the duration lies within `0..=86400` seconds
pub fn validate(record: &StudyRecord) -> bool {
    (0..=MAX_DURATION_SECS).contains(&record.duration)
}

/// Canonical wire body: snake_case keys, RFC 3339 timestamp with offset,
/// absent fields omitted
pub fn serialize(record: &StudyRecord) -> Result<Vec<u8>, RecordError> {
    let (amount, start_position, end_position) = match record.amount {
        None => (None, None, None),
        Some(RecordAmount::Total(amount)) => (Some(amount), None, None),
        Some(RecordAmount::Range { from, to }) => (None, Some(from), Some(to)),
    };

    let wire = WireRecord {
        duration: record.duration,
        recorded_at: record
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        comment: record.comment.as_deref().map(std::borrow::Cow::Borrowed),
        amount,
        start_position,
        end_position,
    };

    serde_json::to_vec(&wire).map_err(|e| RecordError::Encoding(e.to_string()))
}

/// Parse a wire body back into a record
pub fn deserialize(bytes: &[u8]) -> Result<StudyRecord, RecordError> {
    let wire: WireRecord<'_> =
        serde_json::from_slice(bytes).map_err(|e| RecordError::Encoding(e.to_string()))?;

    let recorded_at = DateTime::parse_from_rfc3339(&wire.recorded_at)
        .map_err(|e| RecordError::Timestamp(e.to_string()))?
        .with_timezone(&Utc);

    let amount = match (wire.amount, wire.start_position, wire.end_position) {
        (None, None, None) => None,
        (Some(amount), None, None) => Some(RecordAmount::Total(amount)),
        (None, Some(from), Some(to)) => Some(RecordAmount::range(from, to)?),
        _ => return Err(RecordError::AmbiguousAmount),
    };

    Ok(StudyRecord {
        duration: wire.duration,
        recorded_at,
        amount,
        comment: wire.comment.map(|c| c.into_owned()),
    })
}

/// Record errors
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid range: start position {from} is after end position {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Amount and position range are mutually exclusive")]
    AmbiguousAmount,

    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn duration_bounds() {
        for duration in [0, 1, 1800, MAX_DURATION_SECS] {
            assert!(validate(&StudyRecord::new(duration)), "{} should be valid", duration);
        }
        for duration in [-1, -3600, MAX_DURATION_SECS + 1, i64::MAX] {
            assert!(!validate(&StudyRecord::new(duration)), "{} should be invalid", duration);
        }
    }

    #[test]
    fn comment_only_body() {
        let record = StudyRecord::new(1800).comment("reading").recorded_at(t0());

        let body: serde_json::Value = serde_json::from_slice(&serialize(&record).unwrap()).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "duration": 1800,
                "recorded_at": "2024-04-01T09:30:00Z",
                "comment": "reading",
            })
        );
        assert!(body.get("amount").is_none());
    }

    #[test]
    fn scalar_amount_body() {
        let record = StudyRecord::new(60).amount(RecordAmount::total(12)).recorded_at(t0());

        let body: serde_json::Value = serde_json::from_slice(&serialize(&record).unwrap()).unwrap();

        assert_eq!(body["amount"], 12);
        assert!(body.get("start_position").is_none());
        assert!(body.get("end_position").is_none());
        assert!(body.get("comment").is_none());
    }

    #[test]
    fn range_amount_body() {
        let range = RecordAmount::range(10, 25).unwrap();
        let record = StudyRecord::new(60).amount(range).recorded_at(t0());

        let body: serde_json::Value = serde_json::from_slice(&serialize(&record).unwrap()).unwrap();

        assert_eq!(body["start_position"], 10);
        assert_eq!(body["end_position"], 25);
        assert!(body.get("amount").is_none());
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            RecordAmount::range(30, 10),
            Err(RecordError::InvalidRange { from: 30, to: 10 })
        ));
        assert!(RecordAmount::range(5, 5).is_ok());
    }

    #[test]
    fn decoding_restores_the_record() {
        let record = StudyRecord::new(3600)
            .recorded_at(t0())
            .amount(RecordAmount::range(1, 40).unwrap())
            .comment("chapter 1");

        let decoded = deserialize(&serialize(&record).unwrap()).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn decoding_rejects_amount_with_range() {
        let body = br#"{"duration":1,"recorded_at":"2024-04-01T09:30:00Z","amount":3,"start_position":1,"end_position":2}"#;
        assert!(matches!(deserialize(body), Err(RecordError::AmbiguousAmount)));
    }

    #[test]
    fn decoding_accepts_offset_timestamps() {
        let body = br#"{"duration":1,"recorded_at":"2024-04-01T18:30:00+09:00"}"#;
        let record = deserialize(body).unwrap();
        assert_eq!(record.recorded_at_time(), t0());
    }
}
