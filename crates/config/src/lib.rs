//! icu-config - 配置加载库
//!
//! 合并顺序：`default.toml` -> `<APP_ENV>.toml` -> `ICU_` 前缀环境变量（嵌套键用 `__` 分隔）

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use icu_common::{RetryConfig, SameSite};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 会话持久化配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// token cookie 有效期（天）
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default)]
    pub same_site: SameSite,
    /// 未设置时跟随环境：生产环境为 true
    pub secure: Option<bool>,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

fn default_token_ttl_days() -> i64 {
    7
}

/// token cookie 有效期上限（天）
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

fn default_storage_path() -> PathBuf {
    PathBuf::from(".icu-session.json")
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: default_token_ttl_days(),
            same_site: SameSite::default(),
            secure: None,
            storage_path: default_storage_path(),
        }
    }
}

/// 实时通道配置
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_hub_capacity")]
    pub hub_capacity: usize,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
}

fn default_hub_capacity() -> usize {
    256
}

fn default_reconnect_initial_delay_ms() -> u64 {
    100
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            hub_capacity: default_hub_capacity(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
        }
    }
}

impl RealtimeConfig {
    /// 断线重连策略：无限重试，指数退避并封顶
    pub fn reconnect_policy(&self) -> RetryConfig {
        RetryConfig::unlimited(
            Duration::from_millis(self.reconnect_initial_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
        )
        .with_multiplier(self.reconnect_multiplier)
    }
}

/// 用户/ICU 种子数据配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    pub seed_file: Option<PathBuf>,
}

/// 认证客户端配置
#[derive(Debug, Clone, Deserialize)]
pub struct AuthClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for AuthClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub auth: AuthClientConfig,
}

fn default_app_name() -> String {
    "icu-reserve".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("ICU_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// 校验反序列化无法表达的取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.session.token_ttl_days;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&ttl) {
            return Err(ConfigError::Invalid {
                key: "session.token_ttl_days",
                reason: format!("{} is outside 1..={}", ttl, MAX_TOKEN_TTL_DAYS),
            });
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// token cookie 是否只允许通过安全连接传输
    pub fn cookie_secure(&self) -> bool {
        self.session.secure.unwrap_or_else(|| self.is_production())
    }
}

#[cfg(test)]
mod tests;
