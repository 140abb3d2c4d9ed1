//! Synthetic input generation for tests, benchmarks and demos.
//!
//! Generated files have the header `no,name,created_date`, sequential ids
//! from 1, random alphanumeric names of 5 to 20 characters and random days
//! between 2020/01/01 and 2025/12/31. An [`Injection`] corrupts every row
//! whose zero-based index is a multiple of [`INJECT_EVERY`].

use chrono::{Days, NaiveDate};
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Write};
use std::str::FromStr;

pub const HEADER: [&str; 3] = ["no", "name", "created_date"];

/// Corruption interval in rows.
pub const INJECT_EVERY: u64 = 1000;

/// Average bytes per generated row, used for size estimates.
pub const AVG_ROW_BYTES: u64 = 45;

/// Kind of error to inject into generated rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Injection {
    #[default]
    None,
    /// Empty `no` field.
    NullId,
    /// Name of 21 to 30 characters.
    LongName,
    /// `2025-01-01` instead of a slash-separated day.
    BadDateFormat,
}

impl FromStr for Injection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Self::None),
            "null-id" | "no-null" => Ok(Self::NullId),
            "long-name" | "name-invalid" => Ok(Self::LongName),
            "bad-date-format" | "date-invalid" => Ok(Self::BadDateFormat),
            other => Err(format!("unknown injection '{other}'")),
        }
    }
}

/// What [`generate_csv`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generated {
    pub rows: u64,
    pub injected: u64,
}

/// Rows needed for roughly `mb` mebibytes of output.
#[must_use]
pub fn rows_for_size(mb: u64) -> u64 {
    mb * 1024 * 1024 / AVG_ROW_BYTES
}

/// Write a header and `rows` data rows to `writer`.
///
/// The output is fully determined by `rows`, `injection` and `seed`.
///
/// # Errors
/// Propagates write failures.
pub fn generate_csv<W: Write>(
    writer: W,
    rows: u64,
    injection: Injection,
    seed: u64,
) -> io::Result<Generated> {
    let (start, span) = date_range()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(HEADER)?;

    let mut injected = 0;
    for index in 0..rows {
        let mut id = (index + 1).to_string();
        let name_len = rng.random_range(5..=20);
        let mut name = random_name(&mut rng, name_len);
        let offset = rng.random_range(0..=span);
        let mut day = start
            .checked_add_days(Days::new(offset))
            .unwrap_or(start)
            .format("%Y/%m/%d")
            .to_string();

        if injection != Injection::None && index % INJECT_EVERY == 0 {
            injected += 1;
            match injection {
                Injection::NullId => id.clear(),
                Injection::LongName => {
                    let len = rng.random_range(21..=30);
                    name = random_name(&mut rng, len);
                }
                Injection::BadDateFormat => day = "2025-01-01".to_string(),
                Injection::None => {}
            }
        }
        out.write_record([id.as_str(), name.as_str(), day.as_str()])?;
    }
    out.flush()?;
    Ok(Generated { rows, injected })
}

fn random_name(rng: &mut StdRng, len: usize) -> String {
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn date_range() -> io::Result<(NaiveDate, u64)> {
    let (Some(start), Some(end)) = (
        NaiveDate::from_ymd_opt(2020, 1, 1),
        NaiveDate::from_ymd_opt(2025, 12, 31),
    ) else {
        return Err(io::Error::other("fixture date range out of bounds"));
    };
    let span = u64::try_from((end - start).num_days()).unwrap_or(0);
    Ok((start, span))
}
