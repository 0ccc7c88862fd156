use anyhow::Context;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    /// Directory subtree holding every stored object.
    pub storage_root: String,
    /// Location of the metadata snapshot and write-ahead log.
    pub metadata_dir: String,
    /// Prefix of every record's public `url`.
    pub base_url: String,
    pub max_upload_size: u64,
    pub snapshot_interval_secs: u64,
    pub trusted_referers: Vec<String>,
    pub access_token_secret: Option<String>,
    pub log_level: String,
    pub cors_allowed_origins: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: env::var("API_KEY").context("API_KEY must be set")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .context("PORT must be a number")?,
            storage_root: env::var("STORAGE_ROOT").unwrap_or_else(|_| "files".into()),
            metadata_dir: env::var("METADATA_DIR").unwrap_or_else(|_| "data/metadata".into()),
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into())
                .trim_end_matches('/')
                .to_string(),
            max_upload_size: parse_env("MAX_UPLOAD_SIZE", 104_857_600),
            snapshot_interval_secs: parse_env("SNAPSHOT_INTERVAL_SECS", 300),
            trusted_referers: env::var("TRUSTED_REFERERS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            access_token_secret: env::var("ACCESS_TOKEN_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".into()),
        })
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        PathBuf::from(&self.metadata_dir)
    }

    pub fn view_url(&self, lookup_key: &str) -> String {
        format!("{}/views/{}", self.base_url, lookup_key)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" http://a.test/ ,, http://b.test "),
            vec!["http://a.test/".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_list("").is_empty());
    }
}
