//! 用户目录与种子数据
//!
//! 内存中的用户表；token 形如 `mock-jwt-token-<用户 id>`，不做签名

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use icu_auth_core::{Session, SubjectToken};
use icu_common::{Role, UserId};
use icu_errors::{AppError, AppResult};
use icu_realtime::IcuRecord;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

/// token 前缀
pub const TOKEN_PREFIX: &str = "mock-jwt-token-";

const BUILTIN_SEED: &str = include_str!("../../config/seed.json");

/// 种子用户
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// 种子数据文件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub icus: Vec<IcuRecord>,
}

impl SeedData {
    /// 从文件加载；未指定路径时使用内置数据
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let raw = match path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AppError::internal(format!("Failed to read seed file {}: {}", path.display(), e))
            })?,
            None => BUILTIN_SEED.to_string(),
        };
        Self::parse(&raw)
    }

    pub fn builtin() -> AppResult<Self> {
        Self::parse(BUILTIN_SEED)
    }

    fn parse(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::internal(format!("Invalid seed data: {}", e)))
    }
}

#[derive(Debug)]
struct UserRecord {
    id: UserId,
    name: String,
    email: String,
    password: SecretString,
    role: Role,
}

/// 认证通过的账号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Account {
    pub fn token(&self) -> String {
        issue_token(self.id)
    }
}

/// 内存用户目录
#[derive(Debug)]
pub struct UserDirectory {
    users: RwLock<Vec<UserRecord>>,
    next_id: AtomicU64,
}

impl UserDirectory {
    pub fn new(seed: Vec<SeedUser>) -> Self {
        let next_id = seed.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let users = seed
            .into_iter()
            .map(|u| UserRecord {
                id: UserId::new(u.id),
                name: u.name,
                email: u.email,
                password: SecretString::new(u.password),
                role: u.role,
            })
            .collect::<Vec<_>>();

        info!(users = users.len(), "User directory seeded");
        Self {
            users: RwLock::new(users),
            next_id: AtomicU64::new(next_id),
        }
    }

    /// 校验邮箱和密码
    pub fn verify(&self, email: &str, password: &str) -> Option<Account> {
        self.users
            .read()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email) && u.password.expose_secret() == password)
            .map(to_account)
    }

    /// 注册新病人账号；邮箱已存在时返回冲突
    pub fn register(&self, name: &str, email: &str, password: &str) -> AppResult<Account> {
        let mut users = self.users.write();
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(AppError::conflict("Email already registered"));
        }

        let record = UserRecord {
            id: UserId::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            email: email.to_string(),
            password: SecretString::new(password.to_string()),
            role: Role::Patient,
        };
        let account = to_account(&record);
        users.push(record);

        info!(user_id = %account.id, "Patient registered");
        Ok(account)
    }

    /// 解析 bearer token 得到会话；无法识别时为匿名
    pub fn resolve(&self, token: &str) -> Session {
        let Some(id) = token
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|raw| UserId::from_string(raw).ok())
        else {
            debug!("Unrecognized bearer token");
            return Session::Anonymous;
        };

        let role = self.users.read().iter().find(|u| u.id == id).map(|u| u.role);
        match (role, SubjectToken::new(token)) {
            (Some(role), Ok(token)) => Session::authenticated(token, role),
            _ => {
                debug!(user_id = %id, "Bearer token names no known user");
                Session::Anonymous
            }
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

/// 为用户签发 token
pub fn issue_token(id: UserId) -> String {
    format!("{}{}", TOKEN_PREFIX, id)
}

fn to_account(record: &UserRecord) -> Account {
    Account {
        id: record.id,
        name: record.name.clone(),
        role: record.role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> UserDirectory {
        UserDirectory::new(SeedData::builtin().unwrap().users)
    }

    #[test]
    fn test_builtin_seed_covers_every_role() {
        let seed = SeedData::builtin().unwrap();
        for role in Role::ALL {
            assert!(seed.users.iter().any(|u| u.role == role), "no seed user for {role}");
        }
        assert_eq!(seed.icus.len(), 3);
    }

    #[test]
    fn test_verify_credentials() {
        let directory = directory();
        let account = directory.verify("admin@icu.local", "admin123").unwrap();
        assert_eq!(account.role, Role::Admin);
        assert_eq!(account.token(), "mock-jwt-token-1");

        assert!(directory.verify("admin@icu.local", "wrong").is_none());
        assert!(directory.verify("ghost@icu.local", "admin123").is_none());
    }

    #[test]
    fn test_register_assigns_patient_and_fresh_id() {
        let directory = directory();
        let before = directory.len();
        let account = directory.register("New Patient", "new@icu.local", "pw").unwrap();

        assert_eq!(account.role, Role::Patient);
        assert_eq!(account.id, UserId::new(9));
        assert_eq!(directory.len(), before + 1);
        assert_eq!(directory.verify("new@icu.local", "pw"), Some(account));
    }

    #[test]
    fn test_register_rejects_duplicate_email() {
        let directory = directory();
        let err = directory.register("Again", "Nurse@ICU.local", "pw").unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_resolve_token() {
        let directory = directory();
        let session = directory.resolve("mock-jwt-token-2");
        assert_eq!(session.role(), Some(Role::Manager));
        assert_eq!(session.token().map(|t| t.expose()), Some("mock-jwt-token-2"));

        assert_eq!(directory.resolve("mock-jwt-token-999"), Session::Anonymous);
        assert_eq!(directory.resolve("mock-jwt-token-abc"), Session::Anonymous);
        assert_eq!(directory.resolve("something-else"), Session::Anonymous);
    }

    #[test]
    fn test_load_seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"users":[{"id":5,"email":"a@b.c","password":"p","role":"doctor"}]}"#,
        )
        .unwrap();

        let seed = SeedData::load(Some(&path)).unwrap();
        assert_eq!(seed.users.len(), 1);
        assert!(seed.icus.is_empty());

        assert!(SeedData::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
