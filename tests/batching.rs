//! Tests for grouping framed lines into batches.

use anyhow::Result;
use ironsieve::batcher::Batcher;
use ironsieve::error::CleanseError;
use ironsieve::framer::{FramedLine, LineFramer};

fn lines(n: u64) -> Vec<ironsieve::CleanseResult<FramedLine>> {
    (1..=n)
        .map(|i| {
            Ok(FramedLine {
                line_no: i,
                text: format!("{i},x,2024/01/01"),
            })
        })
        .collect()
}

#[test]
fn test_batches_respect_size_and_sequence() -> Result<()> {
    let batches: Vec<_> = Batcher::new(lines(10).into_iter(), 4).collect::<Result<_, _>>()?;
    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    let seqs: Vec<u64> = batches.iter().map(|b| b.seq).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(seqs, vec![0, 1, 2]);
    assert_eq!(batches[2].lines[1].text, "10,x,2024/01/01");
    Ok(())
}

#[test]
fn test_exact_multiple_has_no_empty_tail() -> Result<()> {
    let mut batcher = Batcher::new(lines(6).into_iter(), 3);
    assert_eq!(batcher.next_batch()?.map(|b| b.len()), Some(3));
    assert_eq!(batcher.next_batch()?.map(|b| b.len()), Some(3));
    assert!(batcher.next_batch()?.is_none());
    assert!(batcher.next_batch()?.is_none());
    assert_eq!(batcher.batches_emitted(), 2);
    Ok(())
}

#[test]
fn test_empty_source_yields_nothing() -> Result<()> {
    let mut batcher = Batcher::new(lines(0).into_iter(), 3);
    assert!(batcher.next_batch()?.is_none());
    Ok(())
}

#[test]
fn test_zero_batch_size_clamped_to_one() -> Result<()> {
    let batches: Vec<_> = Batcher::new(lines(3).into_iter(), 0).collect::<Result<_, _>>()?;
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() == 1));
    Ok(())
}

#[test]
fn test_source_error_propagates_and_fuses() {
    let mut source = lines(2);
    source.push(Err(CleanseError::Framing {
        line: 3,
        message: "bad bytes".into(),
    }));
    source.extend(lines(2));
    let mut batcher = Batcher::new(source.into_iter(), 10);

    assert!(matches!(
        batcher.next_batch(),
        Err(CleanseError::Framing { line: 3, .. })
    ));
    assert!(matches!(batcher.next_batch(), Ok(None)));
}

#[test]
fn test_batches_from_framer() -> Result<()> {
    let input = "h\n1,a,2024/01/01\n2,b,2024/01/01\n3,c,2024/01/01\n";
    let batches: Vec<_> =
        Batcher::new(LineFramer::new(input.as_bytes()), 2).collect::<Result<_, _>>()?;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].lines[0].line_no, 2);
    Ok(())
}
