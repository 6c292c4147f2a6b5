use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct DocumentAiConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct PdfServicesConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub max_file_size: usize,
    pub mappings_path: PathBuf,
    pub document_ai: Option<DocumentAiConfig>,
    pub pdf_services: Option<PdfServicesConfig>,
    pub poll: PollConfig,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            max_file_size: default_max_file_size(),
            mappings_path: PathBuf::from("company_mappings.csv"),
            document_ai: None,
            pdf_services: None,
            poll: PollConfig::default(),
            http_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let document_ai = match (get("DOCUMENT_AI_BASE_URL"), get("DOCUMENT_AI_API_KEY")) {
            (Some(base_url), Some(api_key)) => Some(DocumentAiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            }),
            _ => None,
        };

        let pdf_services = match (
            get("PDF_SERVICES_BASE_URL"),
            get("PDF_SERVICES_CLIENT_ID"),
            get("PDF_SERVICES_CLIENT_SECRET"),
        ) {
            (Some(base_url), Some(client_id), Some(client_secret)) => Some(PdfServicesConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_file_size: parse_var(&get, "MAX_FILE_SIZE")?.unwrap_or(defaults.max_file_size),
            mappings_path: get("COMPANY_MAPPINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.mappings_path),
            document_ai,
            pdf_services,
            poll: PollConfig {
                attempts: parse_var(&get, "POLL_ATTEMPTS")?.unwrap_or(defaults.poll.attempts),
                interval: parse_var(&get, "POLL_INTERVAL_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.interval),
            },
            http_timeout: parse_var(&get, "HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| raw.parse::<T>().with_context(|| format!("Invalid value for {}: {:?}", key, raw)))
        .transpose()
}
