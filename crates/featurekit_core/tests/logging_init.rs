use featurekit_core::{init_logging, logging_status, LoggingConfig, LoggingError, RuntimeConfig};

#[test]
fn init_logging_is_idempotent_for_same_config_and_rejects_conflicts() {
    let log_dir = tempfile::tempdir().unwrap();
    let other_dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::from_json_str(&format!(
        r#"{{"log_level": "info", "log_dir": {}}}"#,
        serde_json::to_string(log_dir.path()).unwrap()
    ))
    .unwrap();

    init_logging(&config.logging()).unwrap();
    init_logging(&config.logging()).unwrap();

    let level_conflict = init_logging(&LoggingConfig {
        level: "debug".to_string(),
        ..config.logging()
    })
    .unwrap_err();
    assert!(matches!(level_conflict, LoggingError::Conflict(_)));
    assert!(level_conflict.to_string().contains("refusing to switch"));

    let dir_conflict = init_logging(&LoggingConfig {
        level: "info".to_string(),
        log_dir: Some(other_dir.path().to_path_buf()),
    })
    .unwrap_err();
    assert!(matches!(dir_conflict, LoggingError::Conflict(_)));

    let stderr_conflict = init_logging(&LoggingConfig {
        level: "info".to_string(),
        log_dir: None,
    })
    .unwrap_err();
    assert!(matches!(stderr_conflict, LoggingError::Conflict(_)));

    let (level, dir) = logging_status().unwrap();
    assert_eq!(level, "info");
    assert_eq!(dir.as_deref(), Some(log_dir.path()));

    log::logger().flush();
    let written = std::fs::read_dir(log_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().starts_with("featurekit"));
    assert!(written);
}

#[test]
fn invalid_level_fails_before_touching_global_state() {
    let err = init_logging(&LoggingConfig {
        level: "chatty".to_string(),
        log_dir: None,
    })
    .unwrap_err();
    assert_eq!(err, LoggingError::UnsupportedLevel("chatty".to_string()));
}
