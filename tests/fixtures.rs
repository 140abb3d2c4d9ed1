//! Tests for synthetic input generation.

use anyhow::Result;
use ironsieve::fixtures::{generate_csv, rows_for_size, Injection};
use ironsieve::validation::{validate_line, RejectReason, Verdict};

fn generate(rows: u64, injection: Injection, seed: u64) -> Result<String> {
    let mut out = Vec::new();
    generate_csv(&mut out, rows, injection, seed)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn test_clean_fixture_is_fully_valid() -> Result<()> {
    let text = generate(2_000, Injection::None, 1)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("no,name,created_date"));
    let mut count = 0;
    for (i, line) in lines.enumerate() {
        assert!(line.starts_with(&format!("{},", i + 1)), "{line}");
        assert_eq!(validate_line(line), Verdict::Accepted, "{line}");
        count += 1;
    }
    assert_eq!(count, 2_000);
    Ok(())
}

#[test]
fn test_same_seed_same_output() -> Result<()> {
    assert_eq!(generate(300, Injection::LongName, 42)?, generate(300, Injection::LongName, 42)?);
    assert_ne!(generate(300, Injection::None, 1)?, generate(300, Injection::None, 2)?);
    Ok(())
}

#[test]
fn test_injections_hit_every_thousandth_row() -> Result<()> {
    for (injection, reason) in [
        (Injection::NullId, RejectReason::IdNullOrNonInt),
        (Injection::LongName, RejectReason::LabelTooLong),
        (Injection::BadDateFormat, RejectReason::DateFormat),
    ] {
        let mut sink = Vec::new();
        let generated = generate_csv(&mut sink, 2_001, injection, 5)?;
        assert_eq!(generated.injected, 3);

        let text = String::from_utf8(sink)?;
        let rejected: Vec<(usize, Option<RejectReason>)> = text
            .lines()
            .skip(1)
            .enumerate()
            .map(|(i, l)| (i, validate_line(l).reason()))
            .filter(|(_, r)| r.is_some())
            .collect();
        assert_eq!(
            rejected,
            vec![(0, Some(reason)), (1000, Some(reason)), (2000, Some(reason))],
            "{injection:?}"
        );
    }
    Ok(())
}

#[test]
fn test_rows_for_size() {
    assert_eq!(rows_for_size(0), 0);
    assert_eq!(rows_for_size(10), 10 * 1024 * 1024 / 45);
}

#[test]
fn test_injection_names_parse() {
    assert_eq!("null-id".parse::<Injection>(), Ok(Injection::NullId));
    assert_eq!("name_invalid".parse::<Injection>(), Ok(Injection::LongName));
    assert_eq!("bad-date-format".parse::<Injection>(), Ok(Injection::BadDateFormat));
    assert!("typo".parse::<Injection>().is_err());
}
