//! Global subscriber installation.
//!
//! Kept in its own test binary: `logging::init` installs a process-wide
//! subscriber, which must not race with `#[traced_test]` unit tests.

use sirius_daq::config::SiriusConfig;
use sirius_daq::logging::{self, LogFormat, TracingConfig};
use tracing::Level;

#[test]
fn test_init_is_idempotent() {
    let config = TracingConfig::new(Level::ERROR).with_format(LogFormat::Compact);
    assert!(logging::init(config.clone()).is_ok());
    assert!(logging::init(config).is_ok());

    // A second initialization path after the subscriber is in place
    let mut app = SiriusConfig::default();
    app.application.log_format = LogFormat::Json;
    assert!(logging::init_from_config(&app).is_ok());
}

#[test]
fn test_init_from_invalid_config_fails_before_installing() {
    let mut app = SiriusConfig::default();
    app.application.log_level = "loud".to_string();
    assert!(logging::init_from_config(&app).is_err());
}
