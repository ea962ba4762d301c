use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel for numeric fields that were absent or failed to parse.
pub const MISSING_NUMBER: i32 = -1;

/// Sentinel for text fields that were absent.
pub const MISSING_TEXT: &str = "MISSING";

/// What a runner did at an aid station.
///
/// Records that came through the sloppy grammar may carry any token in the
/// action column, so unknown tokens are preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BibAction {
    In,
    Out,
    Drop,
    Missing,
    Other(String),
}

impl BibAction {
    pub fn as_str(&self) -> &str {
        match self {
            BibAction::In => "IN",
            BibAction::Out => "OUT",
            BibAction::Drop => "DROP",
            BibAction::Missing => MISSING_TEXT,
            BibAction::Other(token) => token,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, BibAction::Drop)
    }
}

impl From<&str> for BibAction {
    fn from(token: &str) -> Self {
        match token.trim() {
            "IN" => BibAction::In,
            "OUT" => BibAction::Out,
            "DROP" => BibAction::Drop,
            "" | MISSING_TEXT => BibAction::Missing,
            other => BibAction::Other(other.to_string()),
        }
    }
}

impl From<String> for BibAction {
    fn from(token: String) -> Self {
        BibAction::from(token.as_str())
    }
}

impl From<BibAction> for String {
    fn from(action: BibAction) -> Self {
        match action {
            BibAction::Other(token) => token,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for BibAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check-in/out row extracted from a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BibRecord {
    pub bib_number: i32,
    pub action: BibAction,
    /// Four digit `HHMM` token as written by the operator.
    #[serde(rename = "BibTimeOfDay")]
    pub time_of_day: Option<String>,
    pub day_of_month: i32,
    #[serde(rename = "Location")]
    pub location: String,
    /// Cleared only for records proven to match the strict grammar.
    pub data_warning: bool,
}

impl Default for BibRecord {
    fn default() -> Self {
        Self {
            bib_number: MISSING_NUMBER,
            action: BibAction::Missing,
            time_of_day: None,
            day_of_month: MISSING_NUMBER,
            location: MISSING_TEXT.to_string(),
            data_warning: true,
        }
    }
}

impl BibRecord {
    /// Build a record from the five positional tokens of a matched line.
    ///
    /// Numeric columns that fail to parse fall back to [`MISSING_NUMBER`];
    /// the record is still produced.
    pub fn from_tokens(tokens: [&str; 5], data_warning: bool) -> Self {
        let [bib, action, time, day, location] = tokens;
        let time = time.trim();
        let location = location.trim();

        Self {
            bib_number: bib.trim().parse().unwrap_or(MISSING_NUMBER),
            action: BibAction::from(action),
            time_of_day: (!time.is_empty()).then(|| time.to_string()),
            day_of_month: day.trim().parse().unwrap_or(MISSING_NUMBER),
            location: if location.is_empty() {
                MISSING_TEXT.to_string()
            } else {
                location.to_string()
            },
            data_warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_failures_use_sentinels() {
        let record =
            BibRecord::from_tokens(["1l5", "0UT", "2oo9", "II", "WR"], true);
        assert_eq!(record.bib_number, MISSING_NUMBER);
        assert_eq!(record.day_of_month, MISSING_NUMBER);
        assert_eq!(record.action, BibAction::Other("0UT".into()));
        assert_eq!(record.time_of_day.as_deref(), Some("2oo9"));
        assert!(record.data_warning);
    }

    #[test]
    fn action_serializes_as_plain_token() {
        let record = BibRecord::from_tokens(["42", "DROP", "1230", "3", "HP"], false);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Action"], "DROP");
        assert_eq!(json["BibNumber"], 42);
        assert_eq!(json["BibTimeOfDay"], "1230");
        assert_eq!(json["Location"], "HP");
        assert_eq!(json["DataWarning"], false);

        let back: BibRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn empty_action_is_missing() {
        assert_eq!(BibAction::from(""), BibAction::Missing);
        assert_eq!(BibAction::Missing.as_str(), MISSING_TEXT);
    }
}
