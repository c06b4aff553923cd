//! Global subscriber installation; one process-wide subscriber per binary.

use dirpool_log::{Config, Fields, Format, LogError};

#[test]
fn installs_once_and_supports_reload() {
    let config = Config {
        level: "info".into(),
        format: Format::Json,
        reloadable: true,
        fields: Fields {
            service: Some("dirpool-test".into()),
            ..Fields::default()
        },
        ..Config::default()
    };
    let guard = dirpool_log::init_with(config).unwrap();
    dirpool_log::info!(pool = "users", "logger installed");

    let handle = guard.reload_handle().unwrap();
    handle.reload("debug,dirpool_pool=trace").unwrap();
    assert_eq!(*handle.current_filter(), "debug,dirpool_pool=trace");
    assert!(matches!(handle.reload("=[oops"), Err(LogError::Filter(_))));

    let err = dirpool_log::init_with(Config::default()).unwrap_err();
    assert!(matches!(err, LogError::Init(_)));
}

#[test]
fn bad_filter_fails_before_installing() {
    let config = Config {
        level: "dirpool=[[[".into(),
        ..Config::default()
    };
    assert!(matches!(
        dirpool_log::init_with(config),
        Err(LogError::Filter(_))
    ));
}
