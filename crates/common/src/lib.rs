//! icu-common - 通用类型和工具库
//!
//! 角色、ICU 状态等跨 crate 共享的领域类型，以及重试/退避工具

pub mod retry;
pub mod types;

pub use retry::*;
pub use types::*;
