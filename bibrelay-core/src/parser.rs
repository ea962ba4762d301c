//! Extraction of message id, date and bib rows from raw Winlink messages.
//!
//! Bib rows are matched twice. The strict grammar describes a clean row:
//!
//! ```text
//! <bib 1-3 digits> TAB <IN|OUT|DROP> TAB <HHMM> TAB <day 1-2 digits> TAB <2 word chars>
//! ```
//!
//! The sloppy grammar only bounds each of the five columns by length and
//! accepts commas as delimiters, so it catches rows mangled by typos or
//! OCR. When the sloppy pass finds more rows than the strict pass, the
//! batch formatting cannot be trusted and every row is committed from the
//! sloppy pass with `data_warning` set, including rows that were clean.

use bibrelay_model::{BibRecord, ParsedMessage};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{debug, warn};

/// Characters captured after the `Message-ID:` header.
pub const MESSAGE_ID_LEN: usize = 12;

/// Header scans stop after this many bytes of input.
pub const MAX_SCAN_BYTES: usize = 256 * 1024;

/// Lines longer than this cannot be a bib row and are not matched.
pub const MAX_ROW_BYTES: usize = 256;

const REGEX_SIZE_LIMIT: usize = 1 << 20;

fn bounded_regex(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .expect("parser regex should compile")
}

static MESSAGE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    bounded_regex(&format!(r"(?i:message-id):[ \t]*(\S{{{MESSAGE_ID_LEN}}})"))
});

static DATE_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| bounded_regex(r"(?m)^Date:[ \t]*(.+?)[ \t\r]*$"));

static STRICT_ROW_PATTERN: Lazy<Regex> = Lazy::new(|| {
    bounded_regex(r"^(\d{1,3})\t(IN|OUT|DROP)\t(\d{4})\t(\d{1,2})\t(\w{2})$")
});

static SLOPPY_ROW_PATTERN: Lazy<Regex> = Lazy::new(|| {
    bounded_regex(
        r"^([^\t]{1,4})\t([^\t]{1,5})\t([^\t]{1,5})\t([^\t]{1,3})\t([^\t]{1,3})$",
    )
});

static SLOPPY_DELIMITER: Lazy<Regex> =
    Lazy::new(|| bounded_regex(r" *[,\t] *"));

const NAIVE_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "sloppy pass matched {sloppy} rows but strict pass matched {strict}"
    )]
    InconsistentMatch { strict: usize, sloppy: usize },

    #[error("message carries bib rows but no Message-ID header")]
    MissingMessageId,
}

/// Rows committed from one message body plus the counts that chose them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibBatch {
    pub records: Vec<BibRecord>,
    pub strict_count: usize,
    pub sloppy_count: usize,
}

impl BibBatch {
    pub fn is_demoted(&self) -> bool {
        self.sloppy_count > self.strict_count
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageParser;

impl MessageParser {
    /// Parse a raw message into a forwardable [`ParsedMessage`].
    ///
    /// Returns `Ok(None)` when the body holds no bib rows; such messages
    /// are ordinary traffic and are skipped. A missing `Date:` header falls
    /// back to `file_created`.
    pub fn parse(
        raw: &str,
        origin_host: &str,
        file_created: DateTime<Utc>,
    ) -> Result<Option<ParsedMessage>, ParseError> {
        let batch = Self::extract_bib_records(raw)?;
        if batch.records.is_empty() {
            debug!("message has no bib rows");
            return Ok(None);
        }

        let message_id =
            Self::extract_message_id(raw).ok_or(ParseError::MissingMessageId)?;
        let message_timestamp =
            Self::extract_timestamp(raw).unwrap_or_else(|| {
                warn!(
                    message_id = %message_id,
                    "no usable Date header; using file creation time"
                );
                file_created
            });

        Ok(Some(ParsedMessage {
            message_id,
            message_timestamp,
            origin_host: origin_host.to_string(),
            file_created,
            bib_records: batch.records,
        }))
    }

    /// The 12 non-whitespace characters following the first `Message-ID:`
    /// header.
    pub fn extract_message_id(raw: &str) -> Option<String> {
        let captures = MESSAGE_ID_PATTERN.captures(scan_window(raw))?;
        Some(captures.get(1)?.as_str().to_string())
    }

    /// The first `Date:` header, so a forwarded message quoted in the body
    /// never overrides the outer date.
    pub fn extract_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let captures = DATE_HEADER_PATTERN.captures(scan_window(raw))?;
        parse_header_date(captures.get(1)?.as_str())
    }

    pub fn extract_bib_records(raw: &str) -> Result<BibBatch, ParseError> {
        let mut strict = Vec::new();
        let mut sloppy = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.len() > MAX_ROW_BYTES {
                continue;
            }

            if let Some(tokens) = strict_tokens(line) {
                strict.push(BibRecord::from_tokens(tokens, false));
            }

            let normalized = SLOPPY_DELIMITER.replace_all(line, "\t");
            if let Some(tokens) = sloppy_tokens(&normalized) {
                sloppy.push(BibRecord::from_tokens(tokens, true));
            }
        }

        let strict_count = strict.len();
        let sloppy_count = sloppy.len();

        let records = match sloppy_count.cmp(&strict_count) {
            std::cmp::Ordering::Equal => strict,
            std::cmp::Ordering::Greater => {
                warn!(
                    strict = strict_count,
                    sloppy = sloppy_count,
                    "malformed bib rows present; flagging the whole batch"
                );
                sloppy
            }
            // Every strict row also matches the sloppy grammar, so this
            // only fires if the two grammars drift apart.
            std::cmp::Ordering::Less => {
                return Err(ParseError::InconsistentMatch {
                    strict: strict_count,
                    sloppy: sloppy_count,
                });
            }
        };

        Ok(BibBatch {
            records,
            strict_count,
            sloppy_count,
        })
    }
}

fn strict_tokens(line: &str) -> Option<[&str; 5]> {
    capture_tokens(&STRICT_ROW_PATTERN, line)
}

fn sloppy_tokens(line: &str) -> Option<[&str; 5]> {
    capture_tokens(&SLOPPY_ROW_PATTERN, line)
}

fn capture_tokens<'a>(pattern: &Regex, line: &'a str) -> Option<[&'a str; 5]> {
    let captures = pattern.captures(line)?;
    let token = |index: usize| captures.get(index).map(|m| m.as_str());
    Some([token(1)?, token(2)?, token(3)?, token(4)?, token(5)?])
}

fn scan_window(raw: &str) -> &str {
    if raw.len() <= MAX_SCAN_BYTES {
        return raw;
    }
    let mut end = MAX_SCAN_BYTES;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

fn parse_header_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc2822(value) {
        return Some(stamp.with_timezone(&Utc));
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(value) {
        return Some(stamp.with_timezone(&Utc));
    }
    NAIVE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use bibrelay_model::{BibAction, MISSING_NUMBER};
    use chrono::TimeZone;

    use super::*;

    const CLEAN_ROWS: &str =
        "115\tOUT\t2009\t11\tWR\n195\tOUT\t2009\t11\tWR\n196\tOUT\t2009\t11\tWR\n";

    fn message(body: &str) -> String {
        format!(
            "Message-ID: 0K3K2DET73LU\r\nDate: 2023/08/19 17:05\r\n\
             From: KK7ABC\r\nSubject: Bibs\r\n\r\n{body}"
        )
    }

    #[test]
    fn extracts_twelve_character_message_id() {
        let raw = "junk...Message-ID: 0K3K2DET73LU...more junk";
        assert_eq!(
            MessageParser::extract_message_id(raw).as_deref(),
            Some("0K3K2DET73LU")
        );
    }

    #[test]
    fn missing_or_short_message_id_is_none() {
        assert_eq!(MessageParser::extract_message_id("Subject: hi"), None);
        assert_eq!(MessageParser::extract_message_id("Message-ID: ABC"), None);
    }

    #[test]
    fn truncated_message_id_before_line_break_is_none() {
        let raw = "Message-ID: 0K3K2DET73L\r\nDate: 2023/08/19 17:05\r\n";
        assert_eq!(MessageParser::extract_message_id(raw), None);
        assert_eq!(
            MessageParser::extract_message_id("Message-ID: 0K3K2 DET73LU\r\n"),
            None
        );
    }

    #[test]
    fn header_scan_stops_at_the_input_bound() {
        let mut raw = "x".repeat(MAX_SCAN_BYTES);
        raw.push_str("\nMessage-ID: 0K3K2DET73LU\n");
        assert_eq!(MessageParser::extract_message_id(&raw), None);

        let early = format!("Message-ID: 0K3K2DET73LU\n{}", "x".repeat(MAX_SCAN_BYTES));
        assert_eq!(
            MessageParser::extract_message_id(&early).as_deref(),
            Some("0K3K2DET73LU")
        );
    }

    #[test]
    fn overlong_lines_are_not_matched_as_rows() {
        let overlong = format!("115\tOUT\t2009\t11\tWR {}", "x".repeat(MAX_ROW_BYTES));
        assert!(overlong.len() > MAX_ROW_BYTES);
        let rows = format!("{overlong}\n195\tOUT\t2009\t11\tWR\n");
        let batch = MessageParser::extract_bib_records(&rows).unwrap();
        assert_eq!(batch.strict_count, 1);
        assert_eq!(batch.sloppy_count, 1);
        assert_eq!(batch.records[0].bib_number, 195);
    }

    #[test]
    fn first_date_header_wins_over_forwarded_copy() {
        let raw = "Date: 2023/08/19 17:05\r\nSubject: Fwd\r\n\r\n\
                   ----- Forwarded -----\r\nDate: 2023/08/18 09:00\r\n";
        let stamp = MessageParser::extract_timestamp(raw).unwrap();
        assert_eq!(stamp, Utc.with_ymd_and_hms(2023, 8, 19, 17, 5, 0).unwrap());
    }

    #[test]
    fn accepts_rfc2822_dates() {
        let raw = "Date: Sat, 19 Aug 2023 10:05:00 -0700\n";
        let stamp = MessageParser::extract_timestamp(raw).unwrap();
        assert_eq!(stamp, Utc.with_ymd_and_hms(2023, 8, 19, 17, 5, 0).unwrap());
    }

    #[test]
    fn clean_batch_is_trusted() {
        let batch = MessageParser::extract_bib_records(CLEAN_ROWS).unwrap();
        assert_eq!(batch.strict_count, 3);
        assert_eq!(batch.sloppy_count, 3);
        assert_eq!(batch.records.len(), 3);
        assert!(batch.records.iter().all(|r| !r.data_warning));
        assert!(!batch.is_demoted());

        let first = &batch.records[0];
        assert_eq!(first.bib_number, 115);
        assert_eq!(first.action, BibAction::Out);
        assert_eq!(first.time_of_day.as_deref(), Some("2009"));
        assert_eq!(first.day_of_month, 11);
        assert_eq!(first.location, "WR");
    }

    #[test]
    fn one_corrupt_row_demotes_the_whole_batch() {
        let rows =
            "115\t0UT\t2oo9\tII\tWR\n195\tOUT\t2009\t11\tWR\n196\tOUT\t2009\t11\tWR\n";
        let batch = MessageParser::extract_bib_records(rows).unwrap();
        assert_eq!(batch.strict_count, 2);
        assert_eq!(batch.sloppy_count, 3);
        assert_eq!(batch.records.len(), 3);
        assert!(batch.records.iter().all(|r| r.data_warning));

        let corrupt = &batch.records[0];
        assert_eq!(corrupt.bib_number, 115);
        assert_eq!(corrupt.action, BibAction::Other("0UT".into()));
        assert_eq!(corrupt.day_of_month, MISSING_NUMBER);

        let clean_but_demoted = &batch.records[1];
        assert_eq!(clean_but_demoted.bib_number, 195);
        assert_eq!(clean_but_demoted.action, BibAction::Out);
    }

    #[test]
    fn comma_delimited_rows_are_sloppy_only() {
        let rows = "115, OUT, 2009, 11, WR\n";
        let batch = MessageParser::extract_bib_records(rows).unwrap();
        assert_eq!(batch.strict_count, 0);
        assert_eq!(batch.sloppy_count, 1);
        assert_eq!(batch.records[0].bib_number, 115);
        assert!(batch.records[0].data_warning);
    }

    #[test]
    fn header_and_prose_lines_are_ignored() {
        let batch = MessageParser::extract_bib_records(&message(
            "Hello net control,\r\nnothing to report.\r\n",
        ))
        .unwrap();
        assert!(batch.records.is_empty());
    }

    #[test]
    fn parse_builds_message_from_rows() {
        let created = Utc.with_ymd_and_hms(2023, 8, 19, 17, 6, 0).unwrap();
        let parsed = MessageParser::parse(&message(CLEAN_ROWS), "station-7", created)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.message_id, "0K3K2DET73LU");
        assert_eq!(
            parsed.message_timestamp,
            Utc.with_ymd_and_hms(2023, 8, 19, 17, 5, 0).unwrap()
        );
        assert_eq!(parsed.origin_host, "station-7");
        assert_eq!(parsed.file_created, created);
        assert_eq!(parsed.bib_records.len(), 3);
    }

    #[test]
    fn parse_without_rows_yields_nothing() {
        let parsed = MessageParser::parse(
            &message("Weather is fine.\r\n"),
            "station-7",
            Utc::now(),
        )
        .unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_requires_message_id_when_rows_exist() {
        let err = MessageParser::parse(CLEAN_ROWS, "station-7", Utc::now())
            .unwrap_err();
        assert_eq!(err, ParseError::MissingMessageId);
    }

    #[test]
    fn missing_date_falls_back_to_file_creation() {
        let created = Utc.with_ymd_and_hms(2023, 8, 19, 18, 0, 0).unwrap();
        let raw = format!("Message-ID: 0K3K2DET73LU\n\n{CLEAN_ROWS}");
        let parsed = MessageParser::parse(&raw, "station-7", created)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.message_timestamp, created);
    }
}
