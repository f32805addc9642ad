//! 应用路由表

use icu_common::Role;
use serde::Serialize;

use crate::gate::{AuthorizationGate, Decision, RouteRule};
use crate::session::Session;

/// 路由表条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEntry {
    Public(String),
    Protected(RouteRule),
}

impl RouteEntry {
    fn path(&self) -> &str {
        match self {
            Self::Public(path) => path,
            Self::Protected(rule) => &rule.resource_path,
        }
    }
}

/// 导航结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Navigation {
    Render { path: String },
    Redirect { to: &'static str, decision: Decision },
    NotFound,
}

/// 静态路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    /// 医院应用的路由表
    pub fn hospital() -> Self {
        let public = ["/", "/find-icu", "/login", "/register"]
            .into_iter()
            .map(|path| RouteEntry::Public(path.to_string()));

        let protected = [
            ("/patient-dashboard", Role::Patient),
            ("/admin", Role::Admin),
            ("/manager", Role::Manager),
            ("/doctor", Role::Doctor),
            ("/nurse", Role::Nurse),
            ("/receptionist", Role::Receptionist),
            ("/cleaner", Role::Cleaner),
        ]
        .into_iter()
        .map(|(path, role)| RouteEntry::Protected(RouteRule::new(path, [role])));

        Self::new(public.chain(protected).collect())
    }

    pub fn find(&self, path: &str) -> Option<&RouteEntry> {
        let path = normalize(path);
        self.entries.iter().find(|entry| entry.path() == path)
    }

    /// 受保护路由的规则
    pub fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        match self.find(path)? {
            RouteEntry::Protected(rule) => Some(rule),
            RouteEntry::Public(_) => None,
        }
    }

    /// 对一次导航求值
    pub fn navigate(&self, gate: &AuthorizationGate, session: &Session, path: &str) -> Navigation {
        match self.find(path) {
            None => Navigation::NotFound,
            Some(RouteEntry::Public(path)) => Navigation::Render { path: path.clone() },
            Some(RouteEntry::Protected(rule)) => {
                let decision = gate.check(session, rule);
                match decision.redirect() {
                    None => Navigation::Render {
                        path: rule.resource_path.clone(),
                    },
                    Some(to) => Navigation::Redirect { to, decision },
                }
            }
        }
    }
}

/// 去掉查询串、片段和末尾斜杠
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
