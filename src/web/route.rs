//! 路由定义模块 - 领域模型
//!
//! 这是纯粹的业务逻辑层，不依赖于 DOM 或 web_sys。
//! 定义应用的所有路由、每个路由的静态权限要求，
//! 以及导航守卫的纯判定函数。


use std::fmt::Display;

use crate::api::types::Role;
use crate::session::Session;

/// 应用路由枚举
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppRoute {
    /// 视频目录（默认路由，公开）
    #[default]
    Home,
    /// 登录页面
    Login,
    /// 教练工作台（教练与管理员）
    CoachStudio,
    /// 管理控制台（仅管理员）
    AdminConsole,
    /// 页面未找到
    NotFound,
}

impl AppRoute {
    /// 将 URL path 解析为路由枚举
    pub fn from_path(path: &str) -> Self {
        match path {
            "/" => Self::Home,
            "/login" => Self::Login,
            "/studio" => Self::CoachStudio,
            "/admin" => Self::AdminConsole,
            _ => Self::NotFound,
        }
    }

    /// 获取路由对应的 URL path
    pub fn to_path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::CoachStudio => "/studio",
            Self::AdminConsole => "/admin",
            Self::NotFound => "/404",
        }
    }

    /// **认证门：该路由是否要求已登录**
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::CoachStudio | Self::AdminConsole)
    }

    /// **授权门：该路由允许的角色集合**
    ///
    /// `None` 表示不限制角色。仅在认证门通过后才会检查。
    pub fn allowed_roles(&self) -> Option<&'static [Role]> {
        match self {
            Self::CoachStudio => Some(&[Role::Coach, Role::Admin]),
            Self::AdminConsole => Some(&[Role::Admin]),
            _ => None,
        }
    }

    /// 已认证用户是否应离开此路由（如登录页）
    pub fn should_redirect_when_authenticated(&self) -> bool {
        matches!(self, Self::Login)
    }

    /// 认证失败时的重定向目标
    pub fn auth_failure_redirect() -> Self {
        Self::Login
    }

    /// 授权不足（或已认证访问登录页）时的重定向目标
    pub fn fallback_redirect() -> Self {
        Self::Home
    }
}

impl Display for AppRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}

/// 守卫判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// 放行
    Allow,
    /// 重定向到登录页
    RedirectLogin,
    /// 重定向到首页
    RedirectHome,
}

/// **核心守卫逻辑：纯函数，每次导航重新求值**
///
/// 认证门先于授权门；未认证时绝不读取 `user`，
/// 无论路由声明了什么角色要求。
pub fn evaluate_guard(route: &AppRoute, session: &Session) -> GuardDecision {
    if route.requires_auth() {
        if !session.is_authenticated() {
            return GuardDecision::RedirectLogin;
        }
        if let Some(allowed) = route.allowed_roles() {
            let permitted = session
                .user
                .as_ref()
                .map(|u| allowed.contains(&u.role.role))
                .unwrap_or(false);
            if !permitted {
                return GuardDecision::RedirectHome;
            }
        }
        return GuardDecision::Allow;
    }

    if route.should_redirect_when_authenticated() && session.is_authenticated() {
        return GuardDecision::RedirectHome;
    }

    GuardDecision::Allow
}
