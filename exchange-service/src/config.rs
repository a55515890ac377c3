//! Environment-driven configuration, layered over sane defaults the way the
//! teacher crate's settings module does for its own knobs.

use std::time::Duration;

use serde::Deserialize;

/// Process-wide configuration, loaded once at startup from environment
/// variables via the `config` crate.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port: u16,
    pub expiration_interval_secs: u64,
    pub webhook_timeout_secs: u64,
    pub vwap_window_secs: i64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            expiration_interval_secs: 1,
            webhook_timeout_secs: 5,
            vwap_window_secs: 300,
            read_timeout_secs: 5,
            write_timeout_secs: 10,
            idle_timeout_secs: 60,
            shutdown_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment, falling back to
    /// [`Settings::default`] for anything unset. Variable names match the
    /// externally documented contract (`PORT`, `EXPIRATION_INTERVAL`, ...)
    /// rather than this struct's field names.
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("port", defaults.port as i64)?
            .set_default("expiration_interval_secs", defaults.expiration_interval_secs as i64)?
            .set_default("webhook_timeout_secs", defaults.webhook_timeout_secs as i64)?
            .set_default("vwap_window_secs", defaults.vwap_window_secs)?
            .set_default("read_timeout_secs", defaults.read_timeout_secs as i64)?
            .set_default("write_timeout_secs", defaults.write_timeout_secs as i64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs as i64)?
            .set_default("shutdown_timeout_secs", defaults.shutdown_timeout_secs as i64)?
            .set_default("log_level", defaults.log_level.clone())?;

        for (field, env_name) in Self::ENV_VARS {
            if let Ok(raw) = std::env::var(env_name) {
                let value = if *field == "log_level" {
                    raw
                } else {
                    parse_duration_secs(&raw)
                };
                builder = builder.set_override(*field, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Maps the externally documented env var names onto this struct's
    /// snake_case field names.
    const ENV_VARS: &'static [(&'static str, &'static str)] = &[
        ("port", "PORT"),
        ("expiration_interval_secs", "EXPIRATION_INTERVAL"),
        ("webhook_timeout_secs", "WEBHOOK_TIMEOUT"),
        ("vwap_window_secs", "VWAP_WINDOW"),
        ("read_timeout_secs", "READ_TIMEOUT"),
        ("write_timeout_secs", "WRITE_TIMEOUT"),
        ("idle_timeout_secs", "IDLE_TIMEOUT"),
        ("shutdown_timeout_secs", "SHUTDOWN_TIMEOUT"),
        ("log_level", "LOG_LEVEL"),
    ];

    pub fn expiration_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_interval_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn vwap_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.vwap_window_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Accepts either a bare integer (seconds) or a Go-style duration suffix
/// (`"5s"`, `"5m"`) for the duration-shaped env vars, passing anything else
/// through unchanged so plain integers still parse.
fn parse_duration_secs(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(minutes) = trimmed.strip_suffix('m') {
        if let Ok(m) = minutes.parse::<i64>() {
            return (m * 60).to_string();
        }
    }
    if let Some(seconds) = trimmed.strip_suffix('s') {
        if let Ok(s) = seconds.parse::<i64>() {
            return s.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_contract() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.expiration_interval(), Duration::from_secs(1));
        assert_eq!(settings.vwap_window(), chrono::Duration::minutes(5));
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn parses_minute_and_second_suffixes() {
        assert_eq!(parse_duration_secs("5m"), "300");
        assert_eq!(parse_duration_secs("30s"), "30");
        assert_eq!(parse_duration_secs("45"), "45");
    }
}
