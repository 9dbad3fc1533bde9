use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

pub const PRACTICUM_ENDPOINT: &str = "https://practicum.yandex.ru/api/user_api/homework_statuses/";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Runtime settings, read from the environment (`PRACTICUM_TOKEN` -> `practicum_token`).
///
/// Only the three credentials are required. Everything else has a default that
/// keeps the bot polling every ten minutes and reporting on every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Config {
    pub practicum_token: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
    #[default(PRACTICUM_ENDPOINT.to_string())]
    pub practicum_endpoint: String,
    #[default(TELEGRAM_API_URL.to_string())]
    pub telegram_api_url: String,
    /// Seconds between polling cycles.
    #[default = 600]
    pub retry_period: u64,
    /// Seconds before an outbound request is abandoned.
    #[default = 30]
    pub request_timeout: u64,
    #[default = true]
    pub notify_unchanged: bool,
    #[default = false]
    pub advance_timestamp: bool,
    #[default = false]
    pub report_failures: bool,
    #[default = "logs"]
    pub log_dir: String,
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env::<Config>()
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars)
    }

    /// True when every credential needed to poll and notify is present.
    pub fn check_tokens(&self) -> bool {
        self.missing_tokens().is_empty()
    }

    pub fn missing_tokens(&self) -> Vec<&'static str> {
        [
            ("PRACTICUM_TOKEN", &self.practicum_token),
            ("TELEGRAM_TOKEN", &self.telegram_token),
            ("TELEGRAM_CHAT_ID", &self.telegram_chat_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_secs(self.retry_period)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> Config {
        Config {
            practicum_token: "practicum".to_string(),
            telegram_token: "123:abc".to_string(),
            telegram_chat_id: "42".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_applied_for_optional_vars() {
        let config = Config::from_vars(vars(&[
            ("PRACTICUM_TOKEN", "p"),
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "1"),
        ]))
        .unwrap();

        assert_eq!(config.practicum_endpoint, PRACTICUM_ENDPOINT);
        assert_eq!(config.telegram_api_url, TELEGRAM_API_URL);
        assert_eq!(config.retry_period(), Duration::from_secs(600));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.notify_unchanged);
        assert!(!config.advance_timestamp);
        assert!(!config.report_failures);
        assert_eq!(config.log_dir, "logs");
        assert!(config.check_tokens());
    }

    #[test]
    fn test_overrides_parsed() {
        let config = Config::from_vars(vars(&[
            ("RETRY_PERIOD", "5"),
            ("NOTIFY_UNCHANGED", "false"),
            ("ADVANCE_TIMESTAMP", "true"),
        ]))
        .unwrap();

        assert_eq!(config.retry_period, 5);
        assert!(!config.notify_unchanged);
        assert!(config.advance_timestamp);
    }

    #[test]
    fn test_missing_vars_fail_check() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert!(!config.check_tokens());
        assert_eq!(
            config.missing_tokens(),
            vec!["PRACTICUM_TOKEN", "TELEGRAM_TOKEN", "TELEGRAM_CHAT_ID"]
        );
    }

    #[test]
    fn test_each_empty_credential_fails_check() {
        let cases: [(&str, fn(&mut Config)); 3] = [
            ("PRACTICUM_TOKEN", |c| c.practicum_token.clear()),
            ("TELEGRAM_TOKEN", |c| c.telegram_token.clear()),
            ("TELEGRAM_CHAT_ID", |c| c.telegram_chat_id = "  ".to_string()),
        ];

        for (name, blank) in cases {
            let mut config = complete();
            blank(&mut config);
            assert!(!config.check_tokens(), "{name} blank should fail");
            assert_eq!(config.missing_tokens(), vec![name]);
        }
    }
}
