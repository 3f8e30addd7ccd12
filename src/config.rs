use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `GEMINI_API_KEY`; analysis commands refuse to run without it.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let timeout = non_empty("BIZLENS_TIMEOUT_SECS")
            .and_then(|v| match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    log::warn!("Ignoring invalid BIZLENS_TIMEOUT_SECS={v:?}");
                    None
                }
            })
            .unwrap_or(defaults.timeout);

        Settings {
            api_key: non_empty("GEMINI_API_KEY").map(|k| k.trim().to_string()),
            model: non_empty("BIZLENS_MODEL").unwrap_or(defaults.model),
            api_base: non_empty("BIZLENS_API_BASE").unwrap_or(defaults.api_base),
            timeout,
        }
    }
}

/// Load `.env` (or the file named by `BIZLENS_ENV_FILE`) into the process
/// environment.  A missing file is not an error.
pub fn load_env() {
    let result = match std::env::var("BIZLENS_ENV_FILE") {
        Ok(path) => dotenvy::from_path(PathBuf::from(path)).map(|_| ()),
        Err(_) => dotenvy::dotenv().map(|_| ()),
    };
    if let Err(e) = result {
        if !e.not_found() {
            log::warn!("Could not load environment file: {e}");
        }
    }
}
