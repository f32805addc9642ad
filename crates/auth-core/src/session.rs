//! 会话存储
//!
//! 进程内唯一的"谁以什么角色登录"事实来源。登录/登出整体替换快照，
//! 观察者通过 `watch` 只会看到完整的会话，不会看到只有 token 或只有角色的中间态。

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use icu_common::Role;
use icu_errors::{AppError, AppResult};
use parking_lot::Mutex;
use secrecy::zeroize::Zeroize;
use secrecy::{CloneableSecret, DebugSecret, ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::storage::{CookiePolicy, CredentialStore};

#[derive(Clone)]
struct TokenValue(String);

impl Zeroize for TokenValue {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl CloneableSecret for TokenValue {}
impl DebugSecret for TokenValue {}

/// 不透明的主体 token，Debug 输出脱敏
#[derive(Clone, Debug)]
pub struct SubjectToken(Secret<TokenValue>);

impl SubjectToken {
    /// 创建 token，空串或纯空白会被拒绝
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::validation("Subject token must not be empty"));
        }
        Ok(Self(Secret::new(TokenValue(value))))
    }

    pub fn expose(&self) -> &str {
        &self.0.expose_secret().0
    }
}

impl PartialEq for SubjectToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SubjectToken {}

impl Serialize for SubjectToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for SubjectToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SubjectToken::new(raw).map_err(serde::de::Error::custom)
    }
}

/// 当前会话
///
/// token 与角色要么同时存在要么同时缺失，由类型本身保证。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated { token: SubjectToken, role: Role },
}

impl Session {
    pub fn authenticated(token: SubjectToken, role: Role) -> Self {
        Self::Authenticated { token, role }
    }

    pub fn token(&self) -> Option<&SubjectToken> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { token, .. } => Some(token),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { role, .. } => Some(*role),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated { role, .. } => write!(f, "authenticated as {}", role),
        }
    }
}

/// 会话存储
///
/// 写操作由互斥锁串行化；持久化失败只记录日志，内存中的会话仍会切换。
pub struct SessionStore {
    storage: Arc<dyn CredentialStore>,
    cookie_policy: CookiePolicy,
    state: watch::Sender<Session>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// 进程启动时从持久化存储恢复会话
    ///
    /// 只有 token 与角色都有效时才恢复；缺一（含过期 token、无法识别的角色）则视为未登录并清除残留。
    pub fn restore(storage: Arc<dyn CredentialStore>, cookie_policy: CookiePolicy) -> Self {
        let session = rehydrate(storage.as_ref());
        info!(session = %session, "Session restored from durable storage");

        let (state, _) = watch::channel(session);
        Self {
            storage,
            cookie_policy,
            state,
            write_lock: Mutex::new(()),
        }
    }

    /// 登录：原子地设置会话并持久化
    pub fn login(&self, token: SubjectToken, role: Role) {
        let _guard = self.write_lock.lock();

        let cookie = self.cookie_policy.issue(token.clone(), Utc::now());
        if let Err(e) = self.storage.set_token(cookie) {
            warn!(error = %e, "Failed to persist auth token, session will not survive restart");
        }
        if let Err(e) = self.storage.set_role(role.as_str()) {
            warn!(error = %e, "Failed to persist user role, session will not survive restart");
        }

        self.state.send_replace(Session::authenticated(token, role));
        info!(role = %role, "Session started");
    }

    /// 登出：清除会话与持久化数据，重复调用无副作用
    pub fn logout(&self) {
        let _guard = self.write_lock.lock();

        if !self.state.borrow().is_authenticated() {
            debug!("Logout requested without an active session");
            return;
        }

        clear_storage(self.storage.as_ref());
        self.state.send_replace(Session::Anonymous);
        info!("Session ended");
    }

    /// 当前会话快照
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// 订阅会话变化
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }
}

fn rehydrate(storage: &dyn CredentialStore) -> Session {
    let now = Utc::now();

    let raw_token = storage.token().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read persisted auth token");
        None
    });
    let raw_role = storage.role().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read persisted user role");
        None
    });

    let had_any = raw_token.is_some() || raw_role.is_some();

    let token = raw_token
        .filter(|cookie| !cookie.is_expired(now))
        .map(|cookie| cookie.value);
    let role = raw_role.and_then(|raw| match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(e) => {
            warn!(error = %e, "Ignoring persisted role");
            None
        }
    });

    match (token, role) {
        (Some(token), Some(role)) => Session::authenticated(token, role),
        _ => {
            if had_any {
                warn!("Discarding incomplete persisted session");
                clear_storage(storage);
            }
            Session::Anonymous
        }
    }
}

fn clear_storage(storage: &dyn CredentialStore) {
    if let Err(e) = storage.remove_token() {
        warn!(error = %e, "Failed to remove persisted auth token");
    }
    if let Err(e) = storage.remove_role() {
        warn!(error = %e, "Failed to remove persisted user role");
    }
}
