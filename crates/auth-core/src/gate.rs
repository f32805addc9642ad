//! 授权闸门
//!
//! `authorize` 是 (会话, 规则) 的纯函数：拒绝是正常返回值而不是错误。
//! `AuthorizationGate` 在其外层附加审计日志和指标。

use std::collections::BTreeSet;

use icu_common::Role;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::Session;

/// 登录页
pub const LOGIN_PATH: &str = "/login";
/// 公共首页
pub const LANDING_PATH: &str = "/";

/// 角色 -> 默认页面，未列出的角色回落到首页
const DEFAULT_PATHS: &[(Role, &str)] = &[
    (Role::Admin, "/admin"),
    (Role::Manager, "/manager"),
    (Role::Patient, "/patient-dashboard"),
    (Role::Doctor, "/doctor"),
    (Role::Nurse, "/nurse"),
    (Role::Receptionist, "/receptionist"),
    (Role::Cleaner, "/cleaner"),
];

/// 角色的默认页面
pub fn default_path(role: Role) -> &'static str {
    DEFAULT_PATHS
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, path)| *path)
        .unwrap_or(LANDING_PATH)
}

/// 受保护资源的授权规则
///
/// `allowed_roles` 为空表示任何已登录角色均可访问。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub resource_path: String,
    #[serde(default)]
    pub allowed_roles: BTreeSet<Role>,
}

impl RouteRule {
    pub fn new(resource_path: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            resource_path: resource_path.into(),
            allowed_roles: roles.into_iter().collect(),
        }
    }

    pub fn any_authenticated(resource_path: impl Into<String>) -> Self {
        Self::new(resource_path, std::iter::empty())
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.contains(&role)
    }
}

/// 授权结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    DenyUnauthenticated { redirect: &'static str },
    DenyUnauthorized { redirect: &'static str },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// 被拒绝时的跳转目标
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::DenyUnauthenticated { redirect } | Self::DenyUnauthorized { redirect } => {
                Some(*redirect)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::DenyUnauthenticated { .. } => "deny_unauthenticated",
            Self::DenyUnauthorized { .. } => "deny_unauthorized",
        }
    }
}

/// 授权判定
pub fn authorize(session: &Session, rule: &RouteRule) -> Decision {
    match session.role() {
        None => Decision::DenyUnauthenticated {
            redirect: LOGIN_PATH,
        },
        Some(role) if !rule.permits(role) => Decision::DenyUnauthorized {
            redirect: default_path(role),
        },
        Some(_) => Decision::Allow,
    }
}

/// 带审计旁路的授权闸门
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGate;

impl AuthorizationGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, session: &Session, rule: &RouteRule) -> Decision {
        let decision = authorize(session, rule);

        counter!("authorization_decisions_total", "decision" => decision.label()).increment(1);

        match decision {
            Decision::Allow => {
                debug!(path = %rule.resource_path, "Access granted");
            }
            Decision::DenyUnauthenticated { redirect } => {
                debug!(path = %rule.resource_path, redirect, "Access denied, no session");
            }
            Decision::DenyUnauthorized { redirect } => {
                warn!(
                    path = %rule.resource_path,
                    role = ?session.role(),
                    redirect,
                    "Access denied, role not allowed"
                );
            }
        }

        decision
    }
}
