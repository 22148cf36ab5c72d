pub mod archive;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod resilience;
pub mod search;
pub mod time;
pub mod translate;
pub mod validate;

pub mod config {
    use anyhow::Context;

    const DEFAULT_ARCHIVE_DIR: &str = "data";
    const DEFAULT_BASE_LANG: &str = "ko";
    const DEFAULT_TARGET_LANGS: &str = "en";

    /// Process-level configuration, read once at startup. Secrets for the
    /// model, search and market-data providers come from the environment;
    /// their absence is a configuration error reported before any external
    /// call is made.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub anthropic_api_key: Option<String>,
        pub search_base_url: Option<String>,
        pub search_api_key: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub archive_dir: String,
        pub base_lang: String,
        pub target_langs: Vec<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let base_lang = std::env::var("BASE_LANG")
                .ok()
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_LANG.to_string());

            let target_langs = std::env::var("TARGET_LANGS")
                .unwrap_or_else(|_| DEFAULT_TARGET_LANGS.to_string())
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty() && *s != base_lang)
                .collect();

            Ok(Self {
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                search_base_url: std::env::var("SEARCH_API_BASE_URL").ok(),
                search_api_key: std::env::var("SEARCH_API_KEY").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                archive_dir: std::env::var("ARCHIVE_DIR")
                    .unwrap_or_else(|_| DEFAULT_ARCHIVE_DIR.to_string()),
                base_lang,
                target_langs,
            })
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_search_base_url(&self) -> anyhow::Result<&str> {
            self.search_base_url
                .as_deref()
                .context("SEARCH_API_BASE_URL is required")
        }

        pub fn require_search_api_key(&self) -> anyhow::Result<&str> {
            self.search_api_key
                .as_deref()
                .context("SEARCH_API_KEY is required")
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }

        /// All output languages, base first.
        pub fn languages(&self) -> Vec<String> {
            let mut out = Vec::with_capacity(1 + self.target_langs.len());
            out.push(self.base_lang.clone());
            out.extend(self.target_langs.iter().cloned());
            out
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn settings() -> Settings {
            Settings {
                anthropic_api_key: None,
                search_base_url: None,
                search_api_key: None,
                market_data_base_url: None,
                market_data_api_key: None,
                sentry_dsn: None,
                archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
                base_lang: "ko".to_string(),
                target_langs: vec!["en".to_string(), "ja".to_string()],
            }
        }

        #[test]
        fn languages_lists_base_first() {
            assert_eq!(settings().languages(), vec!["ko", "en", "ja"]);
        }

        #[test]
        fn missing_secrets_are_reported_by_name() {
            let err = settings().require_anthropic_api_key().unwrap_err();
            assert!(format!("{err}").contains("ANTHROPIC_API_KEY"));
        }
    }
}
