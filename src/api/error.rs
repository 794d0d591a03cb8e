//! API 错误分类
//!
//! 按会话语义划分错误类别：认证过期可在传输层内恢复，
//! 刷新被拒强制登出，其余错误原样交给调用方显示。
//! 任何一类错误都不会被静默吞掉。

use std::fmt;

/// API 调用错误
///
/// 需要 `Clone`：刷新交换的结果会通过共享 future 广播给所有等待者。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 业务请求返回 401，且刷新未能恢复（登出语义）
    AuthExpired { message: String },
    /// 刷新端点拒绝了刷新令牌，或刷新令牌缺失
    RefreshRejected { message: String },
    /// 网络层失败或超时，会话不受影响
    Network(String),
    /// 后端 4xx 业务校验失败，交给调用屏幕显示
    Validation { status: u16, message: String },
    /// 后端 5xx，作为一般性失败显示
    Server { status: u16, message: String },
    /// 响应体解析失败
    Decode(String),
}

impl ApiError {
    /// 该错误是否意味着会话已被清除（登出语义）
    pub fn is_logged_out(&self) -> bool {
        matches!(
            self,
            ApiError::AuthExpired { .. } | ApiError::RefreshRejected { .. }
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::AuthExpired { message } => write!(f, "登录已过期: {}", message),
            ApiError::RefreshRejected { message } => write!(f, "凭据刷新被拒绝: {}", message),
            ApiError::Network(msg) => write!(f, "网络错误: {}", msg),
            ApiError::Validation { status, message } => {
                write!(f, "请求被拒绝 ({}): {}", status, message)
            }
            ApiError::Server { status, message } => {
                write!(f, "服务器错误 ({}): {}", status, message)
            }
            ApiError::Decode(msg) => write!(f, "响应解析失败: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
