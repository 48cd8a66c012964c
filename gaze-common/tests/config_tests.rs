//! Configuration resolution and graceful degradation
//!
//! Tests that touch GAZE_CONFIG are marked #[serial] so they do not race on
//! the process environment.

use gaze_common::config::{
    load_config, resolve_config_path, RaterMode, TomlConfig, CONFIG_ENV_VAR,
};
use gaze_common::ranges::MissingFramePolicy;
use gaze_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MODULE: &str = "gaze-ka-test-module";

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = dir.path().join("cli.toml");
    env::set_var(CONFIG_ENV_VAR, dir.path().join("env.toml"));

    let resolved = resolve_config_path(MODULE, Some(&cli), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("env.toml");
    env::set_var(CONFIG_ENV_VAR, &path);

    assert_eq!(resolve_config_path(MODULE, None, CONFIG_ENV_VAR), Some(path));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_config_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);

    let config = load_config(MODULE, None, CONFIG_ENV_VAR).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_load_config_from_env_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gaze-ka.toml");
    fs::write(
        &path,
        r#"
        [logging]
        level = "debug"

        [analysis]
        rater_mode = "pairwise"
        missing_frames = "absent"
        validate_intervals = false
        "#,
    )
    .unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = load_config(MODULE, None, CONFIG_ENV_VAR).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.analysis.rater_mode, RaterMode::Pairwise);
    assert_eq!(config.analysis.missing_frames, MissingFramePolicy::Absent);
    assert!(!config.analysis.validate_intervals);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let err = load_config(MODULE, Some(Path::new("/nonexistent/gaze-ka.toml")), CONFIG_ENV_VAR)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[server\nport = ").unwrap();

    let err = load_config(MODULE, Some(&path), CONFIG_ENV_VAR).unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
}

#[test]
fn test_custom_scheme_from_toml() {
    let config = TomlConfig::from_toml_str(
        r#"
        [[scheme.patient.categories]]
        code = 1
        key = "leftPersonGaze"
        label = "Doctor"

        [[scheme.patient.categories]]
        code = 3
        key = "leftPersonElsewhere"
        label = "Elsewhere"
        "#,
    )
    .unwrap();

    assert_eq!(config.scheme.patient.codes(), vec![1, 3]);
    assert_eq!(config.scheme.doctor.len(), 3);
}

#[test]
fn test_key_shared_between_subjects_rejected() {
    let result = TomlConfig::from_toml_str(
        r#"
        [[scheme.patient.categories]]
        code = 1
        key = "rightPersonGaze"
        label = "Doctor"
        "#,
    );
    assert!(result.is_err());
}
