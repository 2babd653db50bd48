#![forbid(unsafe_code)]

use config::{Config, Error, WarnedType};
use figment::Jail;

// Every test that touches the environment or loads a file runs inside a
// `Jail`, which serializes them and restores the environment afterwards.

#[test]
fn defaults_match_cli_defaults() {
    let config = Config::default();
    assert_eq!(config.scheduler.threads, 1);
    assert_eq!(config.scheduler.queue_factor, 1);
    assert_eq!(config.scheduler.queue_capacity(), 1);
    assert_eq!(config.warnings.warned_type, WarnedType::All);
    assert!(!config.warnings.enabled);
    assert!(!config.scan.quiet);
    assert!(config.validate().is_ok());
}

#[test]
fn loads_partial_toml_over_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "pedump.toml",
            r#"
[scheduler]
threads = 4

[warnings]
enabled = true
warned_type = "suspicious"
"#,
        )?;

        let config = Config::load("pedump.toml").expect("config loads");
        assert_eq!(config.scheduler.threads, 4);
        assert_eq!(config.scheduler.queue_factor, 1);
        assert_eq!(config.scheduler.queue_capacity(), 4);
        assert!(config.warnings.enabled);
        assert_eq!(config.warnings.warned_type, WarnedType::Suspicious);
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("pedump.toml", "[scheduler]\nthreads = 2\n")?;
        jail.set_env("PEDUMP_SCHEDULER__THREADS", "6");

        let config = Config::load("pedump.toml").expect("config loads");
        assert_eq!(config.scheduler.threads, 6);
        Ok(())
    });
}

#[test]
fn unknown_warned_type_in_file_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("pedump.toml", "[warnings]\nwarned_type = \"bogus\"\n")?;

        assert!(matches!(Config::load("pedump.toml"), Err(Error::Figment(_))));
        Ok(())
    });
}

#[test]
fn missing_file_is_invalid_path() {
    let err = Config::load("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));
}

#[test]
fn streaming_without_sink_is_a_config_error() {
    let mut config = Config::default();
    config.warnings.enabled = true;
    config.warnings.dynamic = true;
    assert!(matches!(config.validate(), Err(Error::StreamingWithoutSink)));

    config.warnings.file = Some("warned.txt".into());
    assert!(config.validate().is_ok());
}

#[test]
fn zero_sized_scheduler_is_rejected() {
    let mut config = Config::default();
    config.scheduler.threads = 0;
    assert!(matches!(config.validate(), Err(Error::ZeroThreads)));

    config.scheduler.threads = 2;
    config.scheduler.queue_factor = 0;
    assert!(matches!(config.validate(), Err(Error::ZeroQueueFactor)));
}

#[test]
fn toml_roundtrip_preserves_values() {
    Jail::expect_with(|jail| {
        let mut config = Config::default();
        config.scan.memonly = true;
        config.warnings.file = Some("out.txt".into());
        config.scheduler.threads = 3;

        jail.create_file("pedump.toml", &config.to_toml().expect("renders"))?;

        assert_eq!(Config::load("pedump.toml").expect("config loads"), config);
        Ok(())
    });
}
