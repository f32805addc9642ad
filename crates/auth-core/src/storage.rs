//! 持久化凭据存储
//!
//! token 以 cookie 形式保存（带过期时间、Secure、SameSite 属性），角色保存为独立的普通键。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeDelta, Utc};
use icu_common::SameSite;
use icu_errors::{AppError, AppResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::SubjectToken;

/// token cookie 的键名
pub const TOKEN_KEY: &str = "auth_token";
/// 角色的键名
pub const ROLE_KEY: &str = "user_role";

/// 持久化的 token cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCookie {
    pub value: SubjectToken,
    pub expires_at: DateTime<Utc>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl TokenCookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 写 token cookie 时使用的属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub ttl: Duration,
    pub secure: bool,
    pub same_site: SameSite,
}

/// 默认有效期（天）
pub const DEFAULT_TTL_DAYS: i64 = 7;

impl CookiePolicy {
    /// 有效期必须为正且可表示为 `TimeDelta`
    pub fn new(ttl_days: i64, secure: bool, same_site: SameSite) -> AppResult<Self> {
        let ttl = TimeDelta::try_days(ttl_days)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or_else(|| {
                AppError::validation(format!("Cookie lifetime of {} days is out of range", ttl_days))
            })?;

        Ok(Self {
            ttl,
            secure,
            same_site,
        })
    }

    /// 为 token 生成 cookie；过期时间溢出时取可表示的最大时间
    pub fn issue(&self, value: SubjectToken, now: DateTime<Utc>) -> TokenCookie {
        TokenCookie {
            value,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            secure: self.secure,
            same_site: self.same_site,
        }
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::days(DEFAULT_TTL_DAYS),
            secure: false,
            same_site: SameSite::Strict,
        }
    }
}

/// 客户端持久化存储
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> AppResult<Option<TokenCookie>>;

    fn set_token(&self, cookie: TokenCookie) -> AppResult<()>;

    fn remove_token(&self) -> AppResult<()>;

    fn role(&self) -> AppResult<Option<String>>;

    fn set_role(&self, role: &str) -> AppResult<()>;

    fn remove_role(&self) -> AppResult<()>;
}

/// 存储文档（两个独立键）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "auth_token", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenCookie>,
    #[serde(rename = "user_role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoredCredentials {
        self.inner.lock().clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> AppResult<Option<TokenCookie>> {
        Ok(self.inner.lock().token.clone())
    }

    fn set_token(&self, cookie: TokenCookie) -> AppResult<()> {
        self.inner.lock().token = Some(cookie);
        Ok(())
    }

    fn remove_token(&self) -> AppResult<()> {
        self.inner.lock().token = None;
        Ok(())
    }

    fn role(&self) -> AppResult<Option<String>> {
        Ok(self.inner.lock().role.clone())
    }

    fn set_role(&self, role: &str) -> AppResult<()> {
        self.inner.lock().role = Some(role.to_string());
        Ok(())
    }

    fn remove_role(&self) -> AppResult<()> {
        self.inner.lock().role = None;
        Ok(())
    }
}

/// JSON 文件存储
///
/// 每次写入先写临时文件再 rename，避免半写状态。文件损坏时按空存储处理。
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> AppResult<StoredCredentials> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredCredentials::default()),
            Err(e) => {
                return Err(AppError::internal(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Credential file is corrupt, treating as empty");
                Ok(StoredCredentials::default())
            }
        }
    }

    fn write(&self, doc: &StoredCredentials) -> AppResult<()> {
        if doc.token.is_none() && doc.role.is_none() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::internal(format!(
                    "Failed to remove {}: {}",
                    self.path.display(),
                    e
                ))),
            };
        }

        let payload = serde_json::to_vec_pretty(doc)
            .map_err(|e| AppError::internal(format!("Failed to serialize credentials: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, payload)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                AppError::internal(format!("Failed to write {}: {}", self.path.display(), e))
            })?;

        debug!(path = %self.path.display(), "Credentials persisted");
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoredCredentials)) -> AppResult<()> {
        let _guard = self.lock.lock();
        let mut doc = self.read()?;
        f(&mut doc);
        self.write(&doc)
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> AppResult<Option<TokenCookie>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.token)
    }

    fn set_token(&self, cookie: TokenCookie) -> AppResult<()> {
        self.update(|doc| doc.token = Some(cookie))
    }

    fn remove_token(&self) -> AppResult<()> {
        self.update(|doc| doc.token = None)
    }

    fn role(&self) -> AppResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.role)
    }

    fn set_role(&self, role: &str) -> AppResult<()> {
        self.update(|doc| doc.role = Some(role.to_string()))
    }

    fn remove_role(&self) -> AppResult<()> {
        self.update(|doc| doc.role = None)
    }
}
