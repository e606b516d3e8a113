use chrono_tz::Tz;
use std::collections::HashMap;
use std::env;
use std::fs;

/// Runtime configuration: an optional key=value file named by
/// `CONFIG_FILE`, with the process environment as a per-key fallback.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, String> {
        match env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(format!("Invalid config line {}: {}", idx + 1, line));
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if (value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\''))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| env::var(key).ok())
    }

    /// "api" serves the HTTP surface, "cli" opens the interactive chat.
    pub fn run_mode(&self) -> String {
        self.get("RUN_MODE").unwrap_or_else(|| "api".to_string())
    }

    pub fn port(&self) -> u16 {
        self.get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3030)
    }

    /// IANA timezone the CLI anchor is computed in.
    pub fn timezone(&self) -> Tz {
        self.get("TIMEZONE")
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC)
    }

    pub fn cli_user_id(&self) -> String {
        self.get("CLI_USER_ID").unwrap_or_else(|| "local".to_string())
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.get("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quotes_exports_and_comments() {
        let config = AppConfig::parse(
            "# comment\n\nexport RUN_MODE=cli\nPORT=\"8080\"\nCLI_USER_ID='alice'\n",
        )
        .unwrap();
        assert_eq!(config.run_mode(), "cli");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.cli_user_id(), "alice");
    }

    #[test]
    fn rejects_lines_without_an_equals_sign() {
        let err = AppConfig::parse("RUN_MODE cli\n").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn typed_accessors_fall_back_to_defaults() {
        let config = AppConfig::parse("TIMEZONE=Europe/Istanbul\n").unwrap();
        assert_eq!(config.timezone(), chrono_tz::Europe::Istanbul);
        assert!(config.openai_api_key().is_none() || config.openai_api_key().is_some());
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let config = AppConfig::parse("OPENAI_API_KEY=\"\"\n").unwrap();
        assert!(config.openai_api_key().is_none());
    }
}
