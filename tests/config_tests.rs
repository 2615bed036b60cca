use std::time::Duration;

use kickoff_sync::{Config, ConfigError, StatusFilter};

#[test]
fn defaults_match_the_production_app() {
    let config = Config::default();
    assert_eq!(config.page_size, 20);
    assert_eq!(config.timezone, "Australia/Sydney");
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.match_policy().stale_time, Duration::from_secs(120));
    assert_eq!(config.match_policy().retention, Duration::from_secs(300));
    assert_eq!(config.tournament_policy().stale_time, Duration::from_secs(600));
    assert_eq!(config.tick_interval(), Duration::from_secs(1));
    assert!(config.validate().is_ok());
}

#[test]
fn partial_json_keeps_defaults_for_missing_fields() {
    let config = Config::from_json_str(r#"{ "page_size": 10, "status": "live", "offline": true }"#).expect("parse failed");
    assert_eq!(config.page_size, 10);
    assert_eq!(config.status, StatusFilter::Live);
    assert!(config.offline);
    assert_eq!(config.tournament_page_size, 50);
    assert_eq!(config.base_url, Config::default().base_url);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = Config::from_json_str("{ page_size: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "error was: {:?}", err);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = Config::from_file("tests/does_not_exist.json").unwrap_err();
    match err {
        ConfigError::Read { path, .. } => assert_eq!(path, "tests/does_not_exist.json"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn validation_rejects_bad_values() {
    let zero_page = Config { page_size: 0, ..Config::default() };
    assert!(matches!(zero_page.validate(), Err(ConfigError::Invalid(_))));

    let bad_zone = Config { timezone: "Mars/Olympus".to_string(), ..Config::default() };
    let err = bad_zone.validate().unwrap_err();
    assert!(err.to_string().contains("Mars/Olympus"), "error was: {}", err);

    let no_url = Config { base_url: "  ".to_string(), ..Config::default() };
    assert!(no_url.validate().is_err());

    let no_tick = Config { tick_interval_ms: 0, ..Config::default() };
    assert!(no_tick.validate().is_err());
}

#[test]
fn status_filter_parses_case_insensitively() {
    assert_eq!("Upcoming".parse::<StatusFilter>().unwrap(), StatusFilter::Upcoming);
    assert_eq!("".parse::<StatusFilter>().unwrap(), StatusFilter::All);
    assert!("finished".parse::<StatusFilter>().is_err());
    assert_eq!(StatusFilter::All.as_query_param(), None);
    assert_eq!(StatusFilter::Completed.as_str(), "completed");
}
