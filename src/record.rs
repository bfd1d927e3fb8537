use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SourceError, json_kind};

pub const UNKNOWN_TOURNAMENT: &str = "Unknown Tournament";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// One tournament played by the subject, as handed over by the fetcher.
///
/// Construction from raw json is total: absent or mistyped fields fall back to
/// the defaults documented on [`TournamentRecord::from_value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub name: String,
    /// Zero-padded `YYYY-MM-DD`, or empty when the source date was missing or invalid.
    pub date: String,
    /// Subject's rating entering the event; 0 means unknown.
    pub rating_before: i64,
    pub rating_after: i64,
    pub score: String,
    pub section: String,
    pub opponents: Vec<RawEncounter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEncounter {
    pub name: String,
    pub rating: i64,
    /// Upper-cased result code from the subject's point of view.
    pub result: String,
    pub round: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterResult {
    Win,
    Loss,
    Draw,
    Other,
}

impl EncounterResult {
    pub fn from_code(code: &str) -> Self {
        match code {
            "W" => EncounterResult::Win,
            "L" => EncounterResult::Loss,
            "D" => EncounterResult::Draw,
            _ => EncounterResult::Other,
        }
    }
}

impl RawEncounter {
    pub fn outcome(&self) -> EncounterResult {
        EncounterResult::from_code(&self.result)
    }

    fn from_value(v: &Value) -> Option<RawEncounter> {
        let obj = v.as_object()?;
        Some(RawEncounter {
            name: obj
                .get("name")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
            rating: obj.get("rating").and_then(int_field).unwrap_or(0),
            result: obj
                .get("result")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .trim()
                .to_uppercase(),
            round: obj.get("round").and_then(int_field).unwrap_or(0),
        })
    }
}

impl TournamentRecord {
    /// Lenient conversion of one element of a source array.
    ///
    /// Returns `None` only when `v` is not a json object. Fallbacks:
    /// `name` → "Unknown Tournament", invalid `date` → "", `rating_before` → 0,
    /// `rating_after` → `rating_before`, `opponents` that is absent or not a
    /// list → no encounters. Opponent entries that are not objects are dropped.
    pub fn from_value(v: &Value) -> Option<TournamentRecord> {
        let obj = v.as_object()?;
        let name = obj
            .get("name")
            .and_then(|x| x.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_TOURNAMENT)
            .to_string();
        let date = obj
            .get("date")
            .and_then(|x| x.as_str())
            .map(normalize_date)
            .unwrap_or_default();
        let rating_before = obj.get("rating_before").and_then(int_field).unwrap_or(0);
        let rating_after = obj
            .get("rating_after")
            .and_then(int_field)
            .unwrap_or(rating_before);
        let score = string_field(obj.get("score"));
        let section = string_field(obj.get("section"));
        let opponents = obj
            .get("opponents")
            .and_then(|x| x.as_array())
            .map(|arr| arr.iter().filter_map(RawEncounter::from_value).collect())
            .unwrap_or_default();

        Some(TournamentRecord {
            name,
            date,
            rating_before,
            rating_after,
            score,
            section,
            opponents,
        })
    }

    /// Subject's rating at the time of this event, if the source carried one.
    pub fn subject_rating(&self) -> Option<i64> {
        (self.rating_before > 0).then_some(self.rating_before)
    }

    pub fn rating_change(&self) -> i64 {
        self.rating_after.saturating_sub(self.rating_before)
    }
}

/// Parse one source file's content into records.
pub fn parse_records_json(raw: &str) -> Result<Vec<TournamentRecord>, SourceError> {
    let trimmed = raw.trim();
    let v: Value =
        serde_json::from_str(trimmed).map_err(|err| SourceError::Malformed(err.to_string()))?;
    let Some(arr) = v.as_array() else {
        return Err(SourceError::NotAnArray(json_kind(&v)));
    };
    Ok(arr.iter().filter_map(TournamentRecord::from_value).collect())
}

pub fn is_iso_date(raw: &str) -> bool {
    raw.len() == 10 && NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT).is_ok()
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    if !is_iso_date(raw) {
        return None;
    }
    NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT).ok()
}

// Dates are compared as strings downstream; only zero-padded calendar dates survive.
fn normalize_date(raw: &str) -> String {
    let s = raw.trim();
    if is_iso_date(s) {
        return s.to_string();
    }
    // Accept an ISO timestamp by keeping its date part.
    if let Some(prefix) = s.get(..10)
        && s.as_bytes().get(10) == Some(&b'T')
        && is_iso_date(prefix)
    {
        return prefix.to_string();
    }
    String::new()
}

fn int_field(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn string_field(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
