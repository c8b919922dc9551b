use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_SESSION_FILE: &str = ".student-records-session";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub session_file: PathBuf,
    pub timeout: Duration,
}

impl Config {
    pub fn new(api_url: &str, session_file: PathBuf, timeout_secs: u64) -> anyhow::Result<Self> {
        let api_url = normalize_base_url(api_url)?;
        anyhow::ensure!(timeout_secs > 0, "request timeout must be at least one second");

        Ok(Self {
            api_url,
            session_file,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn normalize_base_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed)
        .with_context(|| format!("invalid gateway URL '{raw}'"))?;
    anyhow::ensure!(
        matches!(parsed.scheme(), "http" | "https"),
        "gateway URL must use http or https, got '{}'",
        parsed.scheme()
    );
    Ok(trimmed.to_string())
}
