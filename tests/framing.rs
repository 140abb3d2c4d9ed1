//! Tests for line framing.

use anyhow::Result;
use ironsieve::error::CleanseError;
use ironsieve::framer::LineFramer;
use std::io::{BufReader, Cursor};

fn texts(input: &[u8]) -> Result<(Option<String>, Vec<String>)> {
    let mut framer = LineFramer::new(Cursor::new(input.to_vec()));
    let header = framer.header()?.map(str::to_owned);
    let lines = framer
        .map(|r| r.map(|l| l.text))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((header, lines))
}

#[test]
fn test_header_then_records() -> Result<()> {
    let (header, lines) = texts(b"no,name,created_date\n1,a,2024/01/01\n2,b,2024/01/02\n")?;
    assert_eq!(header.as_deref(), Some("no,name,created_date"));
    assert_eq!(lines, vec!["1,a,2024/01/01", "2,b,2024/01/02"]);
    Ok(())
}

#[test]
fn test_crlf_and_missing_final_newline() -> Result<()> {
    let (header, lines) = texts(b"h\r\n1,a,2024/01/01\r\n2,b,2024/01/02")?;
    assert_eq!(header.as_deref(), Some("h"));
    assert_eq!(lines, vec!["1,a,2024/01/01", "2,b,2024/01/02"]);
    Ok(())
}

#[test]
fn test_blank_lines_skipped_everywhere() -> Result<()> {
    let (header, lines) = texts(b"\n\r\nh\n\n1,a,2024/01/01\n\r\n\n2,b,2024/01/02\n\n")?;
    assert_eq!(header.as_deref(), Some("h"));
    assert_eq!(lines.len(), 2);
    Ok(())
}

#[test]
fn test_empty_input_has_no_header() -> Result<()> {
    let (header, lines) = texts(b"")?;
    assert!(header.is_none());
    assert!(lines.is_empty());

    let (header, lines) = texts(b"\n\n\r\n")?;
    assert!(header.is_none());
    assert!(lines.is_empty());
    Ok(())
}

#[test]
fn test_header_only() -> Result<()> {
    let (header, lines) = texts(b"no,name,created_date\n")?;
    assert_eq!(header.as_deref(), Some("no,name,created_date"));
    assert!(lines.is_empty());
    Ok(())
}

#[test]
fn test_bom_stripped_from_header() -> Result<()> {
    let (header, _) = texts("\u{feff}no,name,created_date\n1,a,2024/01/01\n".as_bytes())?;
    assert_eq!(header.as_deref(), Some("no,name,created_date"));
    Ok(())
}

#[test]
fn test_iterating_without_header_call_skips_header() -> Result<()> {
    let framer = LineFramer::new(&b"h\n1,a,2024/01/01\n"[..]);
    let lines: Vec<_> = framer.collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "1,a,2024/01/01");
    Ok(())
}

#[test]
fn test_physical_line_numbers() -> Result<()> {
    let mut framer = LineFramer::new(&b"h\n\n1,a,2024/01/01\n\n\n2,b,2024/01/02\n"[..]);
    framer.header()?;
    let numbers: Vec<u64> = framer
        .by_ref()
        .map(|r| r.map(|l| l.line_no))
        .collect::<Result<_, _>>()?;
    assert_eq!(numbers, vec![3, 6]);
    assert_eq!(framer.lines_read(), 6);
    Ok(())
}

#[test]
fn test_invalid_utf8_is_framing_fault() -> Result<()> {
    let mut framer = LineFramer::new(&b"h\n1,a,2024/01/01\n2,\xff\xfe,2024/01/01\n3,c,2024/01/01\n"[..]);
    framer.header()?;
    assert!(framer.next().transpose()?.is_some());
    match framer.next() {
        Some(Err(CleanseError::Framing { line, .. })) => assert_eq!(line, 3),
        other => panic!("expected framing fault, got {other:?}"),
    }
    assert!(framer.next().is_none());
    Ok(())
}

#[test]
fn test_small_reader_buffer_handles_long_lines() -> Result<()> {
    let long = "x".repeat(10_000);
    let input = format!("h\n1,{long},2024/01/01\n");
    let framer = LineFramer::new(BufReader::with_capacity(16, input.as_bytes()));
    let lines: Vec<_> = framer.collect::<Result<_, _>>()?;
    assert_eq!(lines[0].text.len(), long.len() + 13);
    Ok(())
}
