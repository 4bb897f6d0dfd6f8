use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub socket_url: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub ai_poll_interval_ms: u64,
    pub pvp_start_delay_ms: u64,
    pub max_hints: u32,
    pub review_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let api_url = "http://localhost:5000".to_string();
        Self {
            socket_url: socket_url_from_api(&api_url),
            api_url,
            access_token: None,
            request_timeout_secs: 15,
            ai_poll_interval_ms: 3000,
            pvp_start_delay_ms: 3000,
            max_hints: 3,
            review_grace_secs: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + APP__ overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let api_url = settings
            .get_string("api.url")
            .or_else(|_| env::var("API_URL"))
            .or_else(|_| env::var("VITE_API_URL"))
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let socket_url = settings
            .get_string("api.socket_url")
            .or_else(|_| env::var("SOCKET_URL"))
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| socket_url_from_api(&api_url));

        let access_token = settings
            .get_string("auth.access_token")
            .or_else(|_| env::var("ACCESS_TOKEN"))
            .ok()
            .filter(|token| !token.trim().is_empty());

        let request_timeout_secs = read_number(
            &settings,
            "api.request_timeout_secs",
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout_secs,
        );
        let ai_poll_interval_ms = read_number(
            &settings,
            "codebattle.ai_poll_interval_ms",
            "AI_POLL_INTERVAL_MS",
            defaults.ai_poll_interval_ms,
        );
        let pvp_start_delay_ms = read_number(
            &settings,
            "codebattle.pvp_start_delay_ms",
            "PVP_START_DELAY_MS",
            defaults.pvp_start_delay_ms,
        );
        let max_hints = read_number(
            &settings,
            "codebattle.max_hints",
            "MAX_HINTS",
            defaults.max_hints as u64,
        ) as u32;
        let review_grace_secs = read_number(
            &settings,
            "reviews.grace_secs",
            "REVIEW_GRACE_SECS",
            defaults.review_grace_secs,
        );

        check_url("api url", &api_url, &["http", "https"])?;
        check_url("socket url", &socket_url, &["ws", "wss"])?;

        Ok(Config {
            api_url,
            socket_url,
            access_token,
            request_timeout_secs,
            ai_poll_interval_ms,
            pvp_start_delay_ms,
            max_hints,
            review_grace_secs,
        })
    }

    /// REST base, `{api_url}/api`.
    pub fn rest_base(&self) -> String {
        format!("{}/api", self.api_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ai_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ai_poll_interval_ms)
    }

    pub fn pvp_start_delay(&self) -> Duration {
        Duration::from_millis(self.pvp_start_delay_ms)
    }

    pub fn review_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.review_grace_secs as i64)
    }
}

fn read_number(settings: &config::Config, key: &str, env_key: &str, default: u64) -> u64 {
    settings
        .get_string(key)
        .or_else(|_| env::var(env_key))
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// `http://host` -> `ws://host`, `https://host` -> `wss://host`.
pub fn socket_url_from_api(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return trimmed.to_string(),
    };
    if url.set_scheme(scheme).is_err() {
        return trimmed.to_string();
    }
    url.as_str().trim_end_matches('/').to_string()
}

fn check_url(name: &str, value: &str, schemes: &[&str]) -> Result<(), config::ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| config::ConfigError::Message(format!("{} '{}' is invalid: {}", name, value, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(config::ConfigError::Message(format!(
            "{} must use one of {:?}, got '{}'",
            name,
            schemes,
            url.scheme()
        )));
    }
    Ok(())
}
