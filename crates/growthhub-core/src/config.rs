use std::time::Duration;

use chrono_tz::Tz;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    /// Timezone whose midnight / first-of-month bound the usage quota windows.
    pub timezone: Tz,
    pub cors_origins: Vec<String>,
    pub gemini: GeminiConfig,
    /// Share of generation requests that reach the downstream model, in `[0, 1]`.
    pub generation_sample_rate: f64,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// `None` leaves the client unconfigured; every call then fails with
    /// `GenerationError::MissingApiKey` and falls back to canned responses.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
        }
    }
}

pub fn parse_timezone(raw: &str) -> Result<Tz, CoreError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| CoreError::UnknownTimezone(raw.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let defaults = GeminiConfig::default();
        Ok(Self {
            port: std::env::var("GROWTHHUB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("GROWTHHUB_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("GROWTHHUB_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            timezone: parse_timezone(
                &std::env::var("GROWTHHUB_TIMEZONE").unwrap_or_else(|_| "Asia/Tokyo".to_string()),
            )
            .map_err(|e| e.to_string())?,
            cors_origins: std::env::var("GROWTHHUB_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            gemini: GeminiConfig {
                api_key: std::env::var("GROWTHHUB_GEMINI_API_KEY")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
                model: std::env::var("GROWTHHUB_GEMINI_MODEL").unwrap_or(defaults.model),
                base_url: std::env::var("GROWTHHUB_GEMINI_BASE_URL").unwrap_or(defaults.base_url),
                timeout_secs: std::env::var("GROWTHHUB_GEMINI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|v| v.clamp(1, 300))
                    .unwrap_or(defaults.timeout_secs),
            },
            generation_sample_rate: std::env::var("GROWTHHUB_GENERATION_SAMPLE_RATE")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iana_timezone() {
        assert_eq!(parse_timezone("Asia/Tokyo").expect("tz"), chrono_tz::Asia::Tokyo);
        assert_eq!(parse_timezone(" UTC ").expect("tz"), chrono_tz::UTC);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = parse_timezone("Mars/Olympus").expect_err("should fail");
        assert!(err.to_string().contains("Mars/Olympus"));
    }
}
