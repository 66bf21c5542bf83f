//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default model used for classification, scoring and replies.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default interviewer mailbox when `INTERVIEWER_EMAIL` is unset.
pub const DEFAULT_INTERVIEWER: &str = "interviewer@company.com";

/// Agent configuration, built from environment-style key/value pairs.
#[derive(Debug, Clone)]
pub struct MailhubConfig {
    /// AgentMail API key.
    pub inbox_api_key: SecretString,
    /// Anthropic API key.
    pub llm_api_key: SecretString,
    /// Mailbox that receives candidate notifications and sends feedback.
    pub interviewer_address: String,
    /// Minimum evaluation score (1-10) that moves an applicant to screening.
    pub qualification_threshold: u8,
    /// Delay between two polls of the inbox.
    pub poll_interval: Duration,
    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Model name passed to the LLM provider.
    pub model: String,
    /// Inbox username to reuse (or create, suffixed with a timestamp).
    pub inbox_name: String,
    /// Maximum number of messages requested per poll.
    pub fetch_limit: u32,
    /// Failed attempts after which a message is dropped.
    pub max_attempts: u32,
    /// Override for the AgentMail API base URL.
    pub agentmail_base_url: Option<String>,
}

impl MailhubConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let inbox_api_key = SecretString::from(required("AGENTMAIL_API_KEY")?);
        let llm_api_key = SecretString::from(required("ANTHROPIC_API_KEY")?);

        let qualification_threshold: u8 =
            parse_or(get("QUALIFICATION_THRESHOLD"), "QUALIFICATION_THRESHOLD", 6)?;
        if !(1..=10).contains(&qualification_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "QUALIFICATION_THRESHOLD".into(),
                message: format!("{qualification_threshold} is outside 1..=10"),
            });
        }

        let poll_interval_secs: u64 =
            parse_or(get("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", 10)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLL_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let fetch_limit = parse_or(get("MAILHUB_FETCH_LIMIT"), "MAILHUB_FETCH_LIMIT", 20)?;
        let max_attempts: u32 = parse_or(get("MAILHUB_MAX_ATTEMPTS"), "MAILHUB_MAX_ATTEMPTS", 3)?;

        Ok(Self {
            inbox_api_key,
            llm_api_key,
            interviewer_address: get("INTERVIEWER_EMAIL")
                .unwrap_or_else(|| DEFAULT_INTERVIEWER.to_string())
                .to_lowercase(),
            qualification_threshold,
            poll_interval: Duration::from_secs(poll_interval_secs),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            model: get("MAILHUB_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            inbox_name: get("MAILHUB_INBOX").unwrap_or_else(|| "mailhub".to_string()),
            fetch_limit,
            max_attempts: max_attempts.max(1),
            agentmail_base_url: get("AGENTMAIL_BASE_URL"),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const CREDS: [(&str, &str); 2] = [
        ("AGENTMAIL_API_KEY", "am-key"),
        ("ANTHROPIC_API_KEY", "sk-ant-test"),
    ];

    #[test]
    fn defaults_applied() {
        let config = MailhubConfig::from_lookup(lookup(&CREDS)).unwrap();
        assert_eq!(config.inbox_api_key.expose_secret(), "am-key");
        assert_eq!(config.interviewer_address, DEFAULT_INTERVIEWER);
        assert_eq!(config.qualification_threshold, 6);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.inbox_name, "mailhub");
        assert_eq!(config.fetch_limit, 20);
        assert_eq!(config.max_attempts, 3);
        assert!(config.agentmail_base_url.is_none());
    }

    #[test]
    fn missing_inbox_credentials_is_error() {
        let err = MailhubConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "AGENTMAIL_API_KEY"));
    }

    #[test]
    fn blank_llm_credentials_is_missing() {
        let err = MailhubConfig::from_lookup(lookup(&[
            ("AGENTMAIL_API_KEY", "x"),
            ("ANTHROPIC_API_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ANTHROPIC_API_KEY"));
    }

    #[test]
    fn overrides_parsed() {
        let mut pairs = CREDS.to_vec();
        pairs.extend([
            ("INTERVIEWER_EMAIL", "Hiring@Corp.com"),
            ("QUALIFICATION_THRESHOLD", "8"),
            ("POLL_INTERVAL_SECS", "30"),
            ("LOG_LEVEL", "debug"),
        ]);
        let config = MailhubConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.interviewer_address, "hiring@corp.com");
        assert_eq!(config.qualification_threshold, 8);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("QUALIFICATION_THRESHOLD", "11"));
        let err = MailhubConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "QUALIFICATION_THRESHOLD"
        ));
    }

    #[test]
    fn unparseable_interval_rejected() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("POLL_INTERVAL_SECS", "soon"));
        let err = MailhubConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "POLL_INTERVAL_SECS")
        );
    }

    #[test]
    fn zero_interval_rejected() {
        let mut pairs = CREDS.to_vec();
        pairs.push(("POLL_INTERVAL_SECS", "0"));
        assert!(MailhubConfig::from_lookup(lookup(&pairs)).is_err());
    }
}
