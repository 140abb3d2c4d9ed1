//! Tests for engine configuration.

use ironsieve::config::*;
use ironsieve::CleanseError;
use std::collections::HashMap;

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_defaults() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.batch_size, 1000);
    assert_eq!(cfg.in_flight_window(), 8);
    assert_eq!(cfg.ordering, OrderingPolicy::InputOrder);
    assert!(cfg.validate().is_ok());
    assert!(EngineConfig::auto().workers >= 1);
}

#[test]
fn test_validation_rules() {
    assert!(EngineConfig::default().with_batch_size(0).validate().is_err());
    assert!(EngineConfig::default().with_workers(0).validate().is_err());
    assert!(EngineConfig::default().with_workers(3).with_in_flight(2).validate().is_err());
    assert!(EngineConfig::default().with_workers(3).with_in_flight(3).validate().is_ok());
}

#[test]
fn test_from_map_overlays_defaults() -> Result<(), CleanseError> {
    let cfg = EngineConfig::from_map(&map(&[
        ("workers", "6"),
        ("batch_size", " 250 "),
        ("ordering", "completion"),
    ]))?;
    assert_eq!(cfg.workers, 6);
    assert_eq!(cfg.batch_size, 250);
    assert_eq!(cfg.in_flight, None);
    assert_eq!(cfg.ordering, OrderingPolicy::CompletionOrder);
    assert_eq!(cfg.progress_every, DEFAULT_PROGRESS_EVERY);
    Ok(())
}

#[test]
fn test_from_map_rejects_garbage() {
    assert!(matches!(
        EngineConfig::from_map(&map(&[("workers", "many")])),
        Err(CleanseError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_map(&map(&[("ordering", "random")])),
        Err(CleanseError::Config(_))
    ));
}

#[test]
fn test_ordering_aliases() {
    assert_eq!("Input".parse::<OrderingPolicy>().ok(), Some(OrderingPolicy::InputOrder));
    assert_eq!("unordered".parse::<OrderingPolicy>().ok(), Some(OrderingPolicy::CompletionOrder));
}

#[test]
fn test_transfer_defaults() {
    let t = TransferConfig::default();
    assert_eq!(t.multipart_threshold, 50 * 1024 * 1024);
    assert_eq!(t.part_size, 10 * 1024 * 1024);
    assert_eq!(t.retry.max_attempts, 5);
}
