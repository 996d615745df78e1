use super::*;
use crate::Error;

#[test]
fn test_defaults_are_valid() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.processor.max_batch_size, 100);
    assert_eq!(settings.processor.handler_retry_limit, 3);
    assert!(settings.processor.renew_interval_ms < settings.processor.lease_duration_ms);
}

#[test]
fn test_renew_interval_must_stay_under_lease_duration() {
    let mut settings = Settings::default();
    settings.processor.renew_interval_ms = settings.processor.lease_duration_ms;

    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_zero_batch_size_rejected() {
    let mut settings = Settings::default();
    settings.processor.max_batch_size = 0;

    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_source_and_lease_collections_must_differ() {
    let mut settings = Settings::default();
    settings.storage.lease_collection = settings.storage.source_collection.clone();

    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_poll_backoff_base_above_cap_rejected() {
    let mut settings = Settings::default();
    settings.processor.poll_backoff_base_ms = settings.processor.poll_backoff_max_ms + 1;

    assert!(matches!(settings.validate(), Err(Error::Config(_))));
}

#[test]
fn test_env_overrides_take_priority() {
    temp_env::with_vars(
        [
            ("CF_ENGINE__PROCESSOR__MAX_BATCH_SIZE", Some("7")),
            ("CF_ENGINE__PROCESSOR__INSTANCE_NAME", Some("env-host")),
            ("CF_ENGINE__STORAGE__SOURCE_COLLECTION", Some("env-items")),
        ],
        || {
            let settings = Settings::load(None).expect("load should succeed");
            assert_eq!(settings.processor.max_batch_size, 7);
            assert_eq!(settings.processor.instance_name, "env-host");
            assert_eq!(settings.storage.source_collection, "env-items");
        },
    );
}

#[test]
fn test_invalid_env_value_fails_fast() {
    temp_env::with_vars(
        [("CF_ENGINE__PROCESSOR__LEASE_DURATION_MS", Some("0"))],
        || {
            assert!(matches!(Settings::load(None), Err(Error::Config(_))));
        },
    );
}
