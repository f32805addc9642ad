//! 认证客户端
//!
//! 凭据只在这里使用一次；`SessionStore::login` 只接收认证服务返回的 token 和角色。

use std::time::Duration;

use async_trait::async_trait;
use icu_common::{RetryConfig, Role, is_retryable_error, with_conditional_retry};
use icu_errors::{AppError, AppResult};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gate::default_path;
use crate::session::{SessionStore, SubjectToken};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// 登录凭据
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: SecretString,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }
}

/// 认证服务返回的授权
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthGrant {
    pub token: SubjectToken,
    pub role: Role,
}

/// 认证服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &LoginCredentials) -> AppResult<AuthGrant>;
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    message: Option<String>,
}

/// 通过 HTTP 调用 `/api/auth/login`
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpAuthenticator {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn post_login(&self, credentials: &LoginCredentials) -> AppResult<AuthGrant> {
        let url = format!("{}/api/auth/login", self.base_url);
        let body = LoginBody {
            email: &credentials.email,
            password: credentials.password.expose_secret(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::external_service(format!("Login request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => response.json::<AuthGrant>().await.map_err(|e| {
                AppError::external_service(format!("Unexpected login response: {}", e))
            }),
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                let message = response
                    .json::<ServerMessage>()
                    .await
                    .unwrap_or_default()
                    .message
                    .unwrap_or_else(|| INVALID_CREDENTIALS.to_string());
                Err(AppError::authentication_failed(message))
            }
            status => Err(AppError::external_service(format!(
                "Login failed with status {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, credentials: &LoginCredentials) -> AppResult<AuthGrant> {
        with_conditional_retry(
            &self.retry,
            "login",
            || self.post_login(credentials),
            |e| matches!(e, AppError::ExternalService(msg) if is_retryable_error(msg)),
        )
        .await
    }
}

/// 登录成功后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedIn {
    pub role: Role,
    /// 登录后应跳转的页面
    pub landing_path: &'static str,
}

/// 登录流程：认证成功才写入会话，失败时会话保持不变
pub async fn sign_in<A>(
    store: &SessionStore,
    authenticator: &A,
    credentials: &LoginCredentials,
) -> AppResult<SignedIn>
where
    A: Authenticator + ?Sized,
{
    let grant = match authenticator.authenticate(credentials).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!(email = %credentials.email, error = %e, "Sign-in failed");
            return Err(e);
        }
    };

    let role = grant.role;
    store.login(grant.token, role);
    info!(email = %credentials.email, role = %role, "Signed in");

    Ok(SignedIn {
        role,
        landing_path: default_path(role),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::storage::{CookiePolicy, MemoryCredentialStore};
    use mockall::predicate::always;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn store() -> SessionStore {
        SessionStore::restore(Arc::new(MemoryCredentialStore::new()), CookiePolicy::default())
    }

    #[tokio::test]
    async fn test_sign_in_writes_session() {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .with(always())
            .times(1)
            .returning(|_| {
                Ok(AuthGrant {
                    token: SubjectToken::new("mock-jwt-token-7").unwrap(),
                    role: Role::Manager,
                })
            });

        let store = store();
        let credentials = LoginCredentials::new("manager@icu.local", "secret");
        let signed_in = assert_ok!(sign_in(&store, &authenticator, &credentials).await);

        assert_eq!(signed_in.role, Role::Manager);
        assert_eq!(signed_in.landing_path, "/manager");
        assert_eq!(store.session().role(), Some(Role::Manager));
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_session_untouched() {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .returning(|_| Err(AppError::authentication_failed(INVALID_CREDENTIALS)));

        let store = store();
        store.login(SubjectToken::new("existing").unwrap(), Role::Doctor);
        let before = store.session();

        let credentials = LoginCredentials::new("doctor@icu.local", "wrong");
        let err = assert_err!(sign_in(&store, &authenticator, &credentials).await);

        assert!(err.is_user_facing());
        assert_eq!(err.message(), INVALID_CREDENTIALS);
        assert_eq!(store.session(), before);
    }

    #[tokio::test]
    async fn test_failed_sign_in_from_anonymous_stays_anonymous() {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .returning(|_| Err(AppError::external_service("Login request failed: connection refused")));

        let store = store();
        let credentials = LoginCredentials::new("nobody@icu.local", "x");
        assert!(sign_in(&store, &authenticator, &credentials).await.is_err());
        assert_eq!(store.session(), Session::Anonymous);
    }

    #[test]
    fn test_grant_rejects_unknown_role_and_blank_token() {
        let ok: AuthGrant =
            serde_json::from_str(r#"{"token":"mock-jwt-token-1","role":"cleaner"}"#).unwrap();
        assert_eq!(ok.role, Role::Cleaner);

        assert!(serde_json::from_str::<AuthGrant>(r#"{"token":"t","role":"janitor"}"#).is_err());
        assert!(serde_json::from_str::<AuthGrant>(r#"{"token":"","role":"admin"}"#).is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = LoginCredentials::new("admin@icu.local", "hunter2");
        let debug_output = format!("{:?}", credentials);
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("admin@icu.local"));
    }

    #[test]
    fn test_http_authenticator_trims_base_url() {
        let authenticator = HttpAuthenticator::new(
            "http://127.0.0.1:3000/",
            Duration::from_secs(1),
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(authenticator.base_url, "http://127.0.0.1:3000");
    }
}
