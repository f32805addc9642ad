//! icu-auth-core - 认证核心库
//!
//! 会话存储、持久化凭据、授权闸门与路由表

pub mod authenticator;
pub mod gate;
pub mod routes;
pub mod session;
pub mod storage;

pub use authenticator::{AuthGrant, Authenticator, HttpAuthenticator, LoginCredentials, SignedIn, sign_in};
pub use gate::{AuthorizationGate, Decision, LANDING_PATH, LOGIN_PATH, RouteRule, authorize, default_path};
pub use routes::{Navigation, RouteEntry, RouteTable};
pub use session::{Session, SessionStore, SubjectToken};
pub use storage::{
    CookiePolicy, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials,
    TokenCookie,
};
