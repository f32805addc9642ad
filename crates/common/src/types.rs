//! 通用类型定义

use std::fmt;
use std::str::FromStr;

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

/// 用户 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct UserId(pub u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn from_string(s: &str) -> Result<Self, std::num::ParseIntError> {
        Ok(Self(s.trim().parse()?))
    }
}

/// 枚举解析失败
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// 用户角色
///
/// 存储与传输格式均为小写名称，例如 `"receptionist"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Doctor,
    Nurse,
    Receptionist,
    Cleaner,
    Ambulance,
    Patient,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::Manager,
        Role::Doctor,
        Role::Nurse,
        Role::Receptionist,
        Role::Cleaner,
        Role::Ambulance,
        Role::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Cleaner => "cleaner",
            Role::Ambulance => "ambulance",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("role", s))
    }
}

/// ICU 床位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IcuStatus {
    Available,
    Occupied,
    Maintenance,
}

impl IcuStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcuStatus::Available => "AVAILABLE",
            IcuStatus::Occupied => "OCCUPIED",
            IcuStatus::Maintenance => "MAINTENANCE",
        }
    }

    /// 病房管理中的"推进状态"：AVAILABLE -> OCCUPIED -> MAINTENANCE -> AVAILABLE
    pub fn next(&self) -> Self {
        match self {
            IcuStatus::Available => IcuStatus::Occupied,
            IcuStatus::Occupied => IcuStatus::Maintenance,
            IcuStatus::Maintenance => IcuStatus::Available,
        }
    }
}

impl fmt::Display for IcuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IcuStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(IcuStatus::Available),
            "OCCUPIED" => Ok(IcuStatus::Occupied),
            "MAINTENANCE" => Ok(IcuStatus::Maintenance),
            _ => Err(ParseEnumError::new("ICU status", s)),
        }
    }
}

/// 实体类别（目前只有 ICU）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[display("icu")]
    Icu,
}

/// Cookie 的 SameSite 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    #[display("Strict")]
    Strict,
    #[display("Lax")]
    Lax,
    #[display("None")]
    None,
}
