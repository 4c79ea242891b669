//! Runtime configuration.
//!
//! `Config::from_env` reads `CONTENTSHARE_*` variables and falls back to the
//! defaults each module ships with. A variable that is set but cannot be
//! parsed is an error rather than being silently ignored.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::extractor::ExtractorConfig;
use crate::fill::FillConfig;
use crate::media::ResolverConfig;
use crate::orchestrator::{OrchestratorConfig, RetrySchedule};
use crate::platforms::{PlatformTable, PlatformTableError};
use crate::upload::CompressionLimits;

pub const ENV_TAB_LOAD_TIMEOUT_MS: &str = "CONTENTSHARE_TAB_LOAD_TIMEOUT_MS";
pub const ENV_RETRY_WAITS_MS: &str = "CONTENTSHARE_RETRY_WAITS_MS";
pub const ENV_ACCEPT_TEXT_LEN: &str = "CONTENTSHARE_ACCEPT_TEXT_LEN";
pub const ENV_SCREENSHOT_MAX_SHOTS: &str = "CONTENTSHARE_SCREENSHOT_MAX_SHOTS";
pub const ENV_SYNC_SETTLE_MS: &str = "CONTENTSHARE_SYNC_SETTLE_MS";
pub const ENV_SOURCE_ORIGINS: &str = "CONTENTSHARE_SOURCE_ORIGINS";
pub const ENV_API_V3_BASE: &str = "CONTENTSHARE_API_V3_BASE";
pub const ENV_API_V4_BASE: &str = "CONTENTSHARE_API_V4_BASE";
pub const ENV_LENS_BASE: &str = "CONTENTSHARE_LENS_BASE";
pub const ENV_RESOLVER_TAB_TIMEOUT_MS: &str = "CONTENTSHARE_RESOLVER_TAB_TIMEOUT_MS";
pub const ENV_ESCALATION_RATIO: &str = "CONTENTSHARE_ESCALATION_RATIO";
pub const ENV_UPLOAD_MAX_WIDTH: &str = "CONTENTSHARE_UPLOAD_MAX_WIDTH";
pub const ENV_UPLOAD_MAX_HEIGHT: &str = "CONTENTSHARE_UPLOAD_MAX_HEIGHT";
pub const ENV_UPLOAD_JPEG_QUALITY: &str = "CONTENTSHARE_UPLOAD_JPEG_QUALITY";
pub const ENV_PLATFORMS_FILE: &str = "CONTENTSHARE_PLATFORMS_FILE";

const ALL_VARS: [&str; 15] = [
    ENV_TAB_LOAD_TIMEOUT_MS,
    ENV_RETRY_WAITS_MS,
    ENV_ACCEPT_TEXT_LEN,
    ENV_SCREENSHOT_MAX_SHOTS,
    ENV_SYNC_SETTLE_MS,
    ENV_SOURCE_ORIGINS,
    ENV_API_V3_BASE,
    ENV_API_V4_BASE,
    ENV_LENS_BASE,
    ENV_RESOLVER_TAB_TIMEOUT_MS,
    ENV_ESCALATION_RATIO,
    ENV_UPLOAD_MAX_WIDTH,
    ENV_UPLOAD_MAX_HEIGHT,
    ENV_UPLOAD_JPEG_QUALITY,
    ENV_PLATFORMS_FILE,
];

/// Upload-side settings.
pub type UploadConfig = CompressionLimits;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    extractor: ExtractorConfig,
    orchestrator: OrchestratorConfig,
    resolver: ResolverConfig,
    fill: FillConfig,
    upload: UploadConfig,
    platforms_file: Option<PathBuf>,
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(ms) = parsed::<u64>(ENV_TAB_LOAD_TIMEOUT_MS)? {
            cfg.orchestrator.tab_load_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = var(ENV_RETRY_WAITS_MS) {
            cfg.orchestrator.retry = parse_waits(&raw)?;
        }
        if let Some(len) = parsed(ENV_ACCEPT_TEXT_LEN)? {
            cfg.orchestrator.accept_text_len = len;
        }
        if let Some(shots) = parsed(ENV_SCREENSHOT_MAX_SHOTS)? {
            cfg.orchestrator.screenshots.max_shots = shots;
        }
        if let Some(ms) = parsed::<u64>(ENV_SYNC_SETTLE_MS)? {
            cfg.orchestrator.sync_settle = Duration::from_millis(ms);
        }
        if let Some(raw) = var(ENV_SOURCE_ORIGINS) {
            cfg.orchestrator.convert.source_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(base) = var(ENV_API_V3_BASE) {
            cfg.resolver.api_v3_base = base;
        }
        if let Some(base) = var(ENV_API_V4_BASE) {
            cfg.resolver.api_v4_base = base;
        }
        if let Some(base) = var(ENV_LENS_BASE) {
            cfg.resolver.lens_base = base;
        }
        if let Some(ms) = parsed::<u64>(ENV_RESOLVER_TAB_TIMEOUT_MS)? {
            cfg.resolver.tab_timeout = Duration::from_millis(ms);
        }

        if let Some(ratio) = parsed::<f64>(ENV_ESCALATION_RATIO)? {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidValue {
                    field: ENV_ESCALATION_RATIO,
                    reason: "must be between 0 and 1".into(),
                });
            }
            cfg.fill.escalation_ratio = ratio;
        }

        if let Some(w) = parsed(ENV_UPLOAD_MAX_WIDTH)? {
            cfg.upload.max_width = w;
        }
        if let Some(h) = parsed(ENV_UPLOAD_MAX_HEIGHT)? {
            cfg.upload.max_height = h;
        }
        if let Some(q) = parsed::<u8>(ENV_UPLOAD_JPEG_QUALITY)? {
            if q == 0 || q > 100 {
                return Err(ConfigError::InvalidValue {
                    field: ENV_UPLOAD_JPEG_QUALITY,
                    reason: "must be between 1 and 100".into(),
                });
            }
            cfg.upload.jpeg_quality = q;
        }

        cfg.platforms_file = var(ENV_PLATFORMS_FILE).map(PathBuf::from);
        Ok(cfg)
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn extractor(&self) -> &ExtractorConfig {
        &self.extractor
    }
    pub fn orchestrator(&self) -> &OrchestratorConfig {
        &self.orchestrator
    }
    pub fn resolver(&self) -> &ResolverConfig {
        &self.resolver
    }
    pub fn fill(&self) -> &FillConfig {
        &self.fill
    }
    pub fn upload(&self) -> &UploadConfig {
        &self.upload
    }
    pub fn platforms_file(&self) -> Option<&Path> {
        self.platforms_file.as_deref()
    }

    /// The override table when a file is configured, the built-in one otherwise.
    pub fn platform_table(&self) -> Result<PlatformTable, PlatformTableError> {
        match &self.platforms_file {
            Some(path) => PlatformTable::load(path),
            None => Ok(PlatformTable::builtin()),
        }
    }
}

fn var(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                field: key,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_waits(raw: &str) -> Result<RetrySchedule, ConfigError> {
    let waits = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::InvalidValue {
                    field: ENV_RETRY_WAITS_MS,
                    reason: format!("'{}': {e}", part.trim()),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RetrySchedule::new(waits))
}

/// Errors that can occur while building a configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment-variable tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in ALL_VARS {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.orchestrator().tab_load_timeout, Duration::from_secs(30));
        assert_eq!(cfg.orchestrator().retry.attempts(), 4);
        assert_eq!(cfg.upload().max_width, 1380);
        assert!(cfg.platforms_file().is_none());
        assert!(cfg.platform_table().unwrap().get("zhihu").is_some());
    }

    #[test]
    fn overrides_when_env_present() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_RETRY_WAITS_MS, "10, 20");
            env::set_var(ENV_ACCEPT_TEXT_LEN, "80");
            env::set_var(ENV_API_V4_BASE, "http://127.0.0.1:9000/api/v4");
            env::set_var(ENV_SOURCE_ORIGINS, "https://docs.qq.com/,https://doc.weixin.qq.com/");
            env::set_var(ENV_UPLOAD_JPEG_QUALITY, "75");
        }
        let cfg = Config::from_env().unwrap();
        clear_env();
        assert_eq!(
            cfg.orchestrator().retry.waits(),
            &[Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(cfg.orchestrator().accept_text_len, 80);
        assert_eq!(cfg.resolver().api_v4_base, "http://127.0.0.1:9000/api/v4");
        assert_eq!(cfg.orchestrator().convert.source_origins.len(), 2);
        assert_eq!(cfg.upload().jpeg_quality, 75);
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_TAB_LOAD_TIMEOUT_MS, "soon");
        }
        let err = Config::from_env().unwrap_err();
        clear_env();
        assert!(err.to_string().contains(ENV_TAB_LOAD_TIMEOUT_MS));

        unsafe {
            env::set_var(ENV_ESCALATION_RATIO, "1.5");
        }
        let err = Config::from_env().unwrap_err();
        clear_env();
        assert!(matches!(err, ConfigError::InvalidValue { field: ENV_ESCALATION_RATIO, .. }));
    }

    #[test]
    fn missing_platform_file_is_an_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_PLATFORMS_FILE, "/nonexistent/platforms.json");
        }
        let cfg = Config::from_env().unwrap();
        clear_env();
        assert!(cfg.platform_table().is_err());
    }
}
