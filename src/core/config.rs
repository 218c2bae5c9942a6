use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

/// Which completion backend sessions stream from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    /// Streams the user's input back word by word. Useful for working
    /// on the UI without spending tokens.
    Echo,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "echo" | "mock" => Ok(ProviderKind::Echo),
            other => Err(anyhow!("Unknown provider: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub max_previous_conversations: usize,
    pub response_delay: Duration,
    pub system_messages_path: String,
    pub system_preamble: Option<String>,
    pub web_ui_path: String,
}

impl AppConfig {
    /// Read the config from the process environment. Any invalid or
    /// missing required value is an error so the server never starts
    /// half configured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = lookup("CHAT_PROVIDER")
            .map(|v| v.parse::<ProviderKind>())
            .transpose()
            .context("Invalid CHAT_PROVIDER")?
            .unwrap_or(ProviderKind::OpenAi);

        let max_previous_conversations = lookup("CHAT_MAX_PREVIOUS_CONVERSATIONS")
            .ok_or_else(|| anyhow!("Missing env var CHAT_MAX_PREVIOUS_CONVERSATIONS"))?
            .trim()
            .parse::<usize>()
            .context("CHAT_MAX_PREVIOUS_CONVERSATIONS must be a non-negative integer")?;

        // Negative delays are clamped rather than rejected
        let response_delay_ms = lookup("CHAT_RESPONSE_DELAY_MS")
            .map(|v| v.trim().parse::<i64>())
            .transpose()
            .context("CHAT_RESPONSE_DELAY_MS must be an integer")?
            .unwrap_or(0);
        let response_delay = Duration::from_millis(response_delay_ms.max(0) as u64);

        let openai_api_key = match (provider, lookup("OPENAI_API_KEY")) {
            (_, Some(key)) if !key.trim().is_empty() => key,
            (ProviderKind::OpenAi, _) => bail!("Missing env var OPENAI_API_KEY"),
            (ProviderKind::Echo, _) => String::new(),
        };
        let openai_api_hostname =
            lookup("CHAT_LLM_HOST").unwrap_or_else(|| "https://api.openai.com".to_string());
        let openai_model = lookup("CHAT_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let system_messages_path =
            lookup("CHAT_SYSTEM_MESSAGES_PATH").unwrap_or_else(|| "./SystemMessages".to_string());
        let system_preamble = lookup("CHAT_SYSTEM_PREAMBLE").filter(|v| !v.trim().is_empty());
        let web_ui_path = lookup("CHAT_WEB_UI_PATH").unwrap_or_else(|| "./chat-ui/dist".to_string());

        Ok(Self {
            provider,
            openai_model,
            openai_api_hostname,
            openai_api_key,
            max_previous_conversations,
            response_delay,
            system_messages_path,
            system_preamble,
            web_ui_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn it_reads_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.max_previous_conversations, 5);
        assert_eq!(config.response_delay, Duration::ZERO);
        assert_eq!(config.openai_api_hostname, "https://api.openai.com");
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.system_messages_path, "./SystemMessages");
        assert!(config.system_preamble.is_none());
    }

    #[test]
    fn it_requires_max_previous_conversations() {
        let result = AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]));
        assert!(result.is_err());

        let result = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "-1"),
            ("OPENAI_API_KEY", "sk-test"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn it_requires_api_key_for_openai() {
        let result =
            AppConfig::from_lookup(lookup(&[("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5")]));
        assert!(result.is_err());

        let config = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5"),
            ("CHAT_PROVIDER", "echo"),
        ]))
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Echo);
    }

    #[test]
    fn it_clamps_negative_response_delay() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5"),
            ("CHAT_PROVIDER", "echo"),
            ("CHAT_RESPONSE_DELAY_MS", "-20"),
        ]))
        .unwrap();
        assert_eq!(config.response_delay, Duration::ZERO);

        let config = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5"),
            ("CHAT_PROVIDER", "echo"),
            ("CHAT_RESPONSE_DELAY_MS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.response_delay, Duration::from_millis(15));
    }

    #[test]
    fn it_rejects_unknown_provider() {
        let result = AppConfig::from_lookup(lookup(&[
            ("CHAT_MAX_PREVIOUS_CONVERSATIONS", "5"),
            ("CHAT_PROVIDER", "carrier-pigeon"),
        ]));
        assert!(result.is_err());
    }
}
