//! Record validation: one raw data line in, one [`Verdict`] out.
//!
//! A record is a single CSV line with exactly three fields, `id`, `label`
//! and `day`. Validation is a pure function of the line text, so the same
//! validator is shared by every worker without synchronization.
//!
//! Rules are checked in a fixed order and the first failing rule decides
//! the [`RejectReason`]:
//!
//! 1. exactly three fields, else [`RejectReason::MalformedRow`]
//! 2. `id` non-blank and a base-10 integer, else [`RejectReason::IdNullOrNonInt`]
//! 3. `label` at most 20 characters, else [`RejectReason::LabelTooLong`]
//! 4. `day` shaped like `YYYY/MM/DD`, else [`RejectReason::DateFormat`]
//! 5. `day` a real calendar date, else [`RejectReason::DateInvalid`]
//!
//! # Example
//!
//! ```
//! use ironsieve::validation::{validate_line, RejectReason, Verdict};
//!
//! assert_eq!(validate_line("007,ok,2024/02/29"), Verdict::Accepted);
//! assert_eq!(
//!     validate_line("007,ok,2023/02/29"),
//!     Verdict::Rejected(RejectReason::DateInvalid)
//! );
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Number of fields every record must have.
pub const FIELD_COUNT: usize = 3;

/// Default upper bound on `label` length, in characters.
pub const MAX_LABEL_CHARS: usize = 20;

static DAY_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}/[0-9]{2}/[0-9]{2}$").expect("static pattern"));

/// Closed set of reasons a record can be rejected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    MalformedRow,
    #[serde(rename = "id-null-or-nonint")]
    IdNullOrNonInt,
    LabelTooLong,
    DateFormat,
    DateInvalid,
}

impl RejectReason {
    pub const ALL: [RejectReason; 5] = [
        RejectReason::MalformedRow,
        RejectReason::IdNullOrNonInt,
        RejectReason::LabelTooLong,
        RejectReason::DateFormat,
        RejectReason::DateInvalid,
    ];

    /// Stable kebab-case code, e.g. `"label-too-long"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            RejectReason::MalformedRow => "malformed-row",
            RejectReason::IdNullOrNonInt => "id-null-or-nonint",
            RejectReason::LabelTooLong => "label-too-long",
            RejectReason::DateFormat => "date-format",
            RejectReason::DateInvalid => "date-invalid",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of validating one record.
///
/// A rejection always carries exactly one reason; an acceptance carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(r) => Some(*r),
        }
    }
}

impl From<Result<(), RejectReason>> for Verdict {
    fn from(r: Result<(), RejectReason>) -> Self {
        match r {
            Ok(()) => Verdict::Accepted,
            Err(reason) => Verdict::Rejected(reason),
        }
    }
}

/// A parsed three-field record borrowed from its source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub day: &'a str,
}

/// A validation backend.
///
/// Implementations must be pure: the same line always yields the same
/// verdict, and concurrent calls need no coordination. Alternative backends
/// (for example a declarative predicate engine) plug into the engine here.
pub trait RecordValidator: Send + Sync {
    /// Validate one raw data line (record terminator already stripped).
    fn validate(&self, line: &str) -> Verdict;
}

/// The built-in rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRules {
    pub max_label_chars: usize,
    /// `chrono` format used for the calendar check once the shape matched.
    pub day_format: &'static str,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self {
            max_label_chars: MAX_LABEL_CHARS,
            day_format: "%Y/%m/%d",
        }
    }
}

impl FieldRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_label_chars(mut self, max: usize) -> Self {
        self.max_label_chars = max;
        self
    }

    /// Run rules 2 through 5 against an already split record.
    ///
    /// # Errors
    /// Returns the reason of the first failing rule.
    pub fn check(&self, record: &Record<'_>) -> Result<(), RejectReason> {
        rules::id_is_integer(record.id)?;
        rules::label_within(record.label, self.max_label_chars)?;
        rules::day_shape(record.day)?;
        rules::day_is_calendar_date(record.day, self.day_format)
    }
}

impl RecordValidator for FieldRules {
    fn validate(&self, line: &str) -> Verdict {
        let mut fields = match split_fields(line) {
            Some(f) => f,
            None => return Verdict::Rejected(RejectReason::MalformedRow),
        };
        if fields.len() != FIELD_COUNT {
            return Verdict::Rejected(RejectReason::MalformedRow);
        }
        let day = fields.pop().unwrap_or_default();
        let label = fields.pop().unwrap_or_default();
        let id = fields.pop().unwrap_or_default();
        let record = Record {
            id: &id,
            label: &label,
            day: &day,
        };
        self.check(&record).into()
    }
}

/// Validate a line with the default [`FieldRules`].
#[must_use]
pub fn validate_line(line: &str) -> Verdict {
    FieldRules::default().validate(line)
}

/// Split one line into fields using CSV quoting rules.
///
/// Returns `None` when the line cannot be parsed at all; a parse failure is
/// reported by the caller as a malformed row rather than as a fault.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match rdr.read_record(&mut record) {
        Ok(true) => Some(record.iter().map(str::to_owned).collect()),
        // An empty line has no record at all; treat it as zero fields.
        Ok(false) => Some(Vec::new()),
        Err(_) => None,
    }
}

/// Individual rule checks, usable on their own.
pub mod rules {
    use super::{RejectReason, DAY_SHAPE};
    use chrono::{Datelike, NaiveDate};

    /// Rule 2: non-blank after trimming, optional sign, ASCII digits only.
    ///
    /// # Errors
    /// [`RejectReason::IdNullOrNonInt`]
    pub fn id_is_integer(id: &str) -> Result<(), RejectReason> {
        let trimmed = id.trim();
        let digits = trimmed
            .strip_prefix(['+', '-'])
            .unwrap_or(trimmed);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Ok(())
        } else {
            Err(RejectReason::IdNullOrNonInt)
        }
    }

    /// Rule 3: length measured in characters, not bytes.
    ///
    /// # Errors
    /// [`RejectReason::LabelTooLong`]
    pub fn label_within(label: &str, max_chars: usize) -> Result<(), RejectReason> {
        if label.chars().count() <= max_chars {
            Ok(())
        } else {
            Err(RejectReason::LabelTooLong)
        }
    }

    /// Rule 4: exact `NNNN/NN/NN` shape.
    ///
    /// # Errors
    /// [`RejectReason::DateFormat`]
    pub fn day_shape(day: &str) -> Result<(), RejectReason> {
        if DAY_SHAPE.is_match(day) {
            Ok(())
        } else {
            Err(RejectReason::DateFormat)
        }
    }

    /// Rule 5: the day exists on the calendar. Year zero does not.
    ///
    /// # Errors
    /// [`RejectReason::DateInvalid`]
    pub fn day_is_calendar_date(day: &str, format: &str) -> Result<(), RejectReason> {
        match NaiveDate::parse_from_str(day, format) {
            Ok(date) if date.year() >= 1 => Ok(()),
            _ => Err(RejectReason::DateInvalid),
        }
    }
}
