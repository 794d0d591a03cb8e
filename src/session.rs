//! 会话状态模块
//!
//! 管理当前认证状态与登录用户档案，与路由系统解耦。
//! 所有修改都通过 `replace` 整体替换，消费者永远不会
//! 观察到半更新的会话；`Session` 的构造函数保证
//! “已认证 ⇒ 访问令牌与用户档案同时存在”这一不变量。


use leptos::prelude::*;

use crate::api::Api;
use crate::api::error::ApiError;
use crate::api::transport::HttpBackend;
use crate::api::types::UserProfile;
use crate::tokens::{KeyValueStore, TokenStore};

// =========================================================
// 会话快照（领域模型，不依赖 DOM）
// =========================================================

/// 会话快照
///
/// 进程启动时为空，由 `TokenStore` 的持久化令牌还原，
/// 此后仅在登录成功、登出、刷新成功与刷新失败时整体替换。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    /// 短期访问令牌（不透明字符串）
    pub access_token: Option<String>,
    /// 长期刷新令牌，仅刷新交换使用
    pub refresh_token: Option<String>,
    /// 认证标记，只能经由构造函数置位
    is_authenticated: bool,
    /// 登录用户的档案
    pub user: Option<UserProfile>,
}

impl Session {
    /// 空会话（未登录）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 登录成功后的完整会话
    pub fn authenticated(
        access_token: String,
        refresh_token: Option<String>,
        user: UserProfile,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            is_authenticated: true,
            user: Some(user),
        }
    }

    /// 启动时仅由持久化令牌还原的会话：档案尚未取得，不算已认证
    pub fn hydrated(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            is_authenticated: false,
            user: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    /// 是否持有任一令牌（决定启动时是否值得尝试恢复）
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    /// 仅替换访问令牌，其余字段不变（刷新成功时使用）
    pub fn with_access_token(mut self, token: String) -> Self {
        self.access_token = Some(token);
        self
    }

    /// 携带档案进入已认证状态
    ///
    /// 只有访问令牌在场时才会置位认证标记，维持不变量。
    pub fn into_authenticated(mut self, user: UserProfile) -> Self {
        if self.access_token.is_some() {
            self.user = Some(user);
            self.is_authenticated = true;
        }
        self
    }
}

// =========================================================
// 会话状态的读写入口
// =========================================================

/// 会话状态存取抽象
///
/// 唯一的修改入口是 `replace`（原子整体替换）。除了传输层
/// 与显式的登录/登出操作外，任何组件都不应调用 `replace`。
/// 生产实现为 `SessionContext`；测试中使用内存实现。
pub trait SessionStore {
    fn current(&self) -> Session;
    fn replace(&self, session: Session);

    /// 便捷读取：当前访问令牌（传输层每次发送时调用）
    fn access_token(&self) -> Option<String> {
        self.current().access_token
    }
}

/// 会话上下文
///
/// 包含读写信号，通过 Context 在组件间共享。
#[derive(Clone, Copy)]
pub struct SessionContext {
    /// 会话状态（只读信号，供 UI 响应式读取）
    pub state: ReadSignal<Session>,
    set_state: WriteSignal<Session>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (state, set_state) = signal(Session::empty());
        Self { state, set_state }
    }

    /// 获取会话信号（用于路由服务注入）
    pub fn session_signal(&self) -> Signal<Session> {
        let state = self.state;
        Signal::derive(move || state.get())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for SessionContext {
    fn current(&self) -> Session {
        self.state.get_untracked()
    }

    fn replace(&self, session: Session) {
        self.set_state.set(session);
    }
}

/// 从 Context 获取会话上下文
pub fn use_session() -> SessionContext {
    use_context::<SessionContext>().expect("SessionContext should be provided")
}

// =========================================================
// 会话操作（replace 的唯二合法调用方之一；另一处在传输层）
// =========================================================

/// 初始化会话
///
/// 从 `TokenStore` 读取持久化令牌。只还原令牌本身，
/// `user` 与认证标记需等待档案请求成功后再派生。
pub fn init_session<S, K>(session: &S, tokens: &TokenStore<K>)
where
    S: SessionStore,
    K: KeyValueStore,
{
    let access = tokens.access_token();
    let refresh = tokens.refresh_token();
    if access.is_some() || refresh.is_some() {
        session.replace(Session::hydrated(access, refresh));
    }
}

/// 用持久化令牌恢复已认证会话
///
/// 拉取档案成功后进入已认证状态。401 的恢复（刷新、重放）
/// 由传输层透明完成；刷新失败时传输层已清空会话与令牌，
/// 这里不再额外处理。
pub async fn restore_session<H, S, K>(api: &Api<H, S, K>, session: &S)
where
    H: HttpBackend + 'static,
    S: SessionStore + 'static,
    K: KeyValueStore + 'static,
{
    if !session.current().has_tokens() {
        return;
    }

    match api.fetch_profile().await {
        Ok(user) => {
            let current = session.current();
            session.replace(current.into_authenticated(user));
        }
        // 非认证错误（网络抖动、5xx）：保留已还原的令牌，
        // 下次导航或请求时再恢复
        Err(_) => {}
    }
}

/// 登录并建立会话
///
/// 成功后持久化令牌并原子替换会话；失败时把错误交还登录页显示。
pub async fn login<H, S, K>(
    api: &Api<H, S, K>,
    session: &S,
    tokens: &TokenStore<K>,
    email: String,
    password: String,
) -> Result<(), ApiError>
where
    H: HttpBackend + 'static,
    S: SessionStore + 'static,
    K: KeyValueStore + 'static,
{
    let data = api.login(email, password).await?;
    tokens.store_pair(&data.access_token, &data.refresh_token);
    session.replace(Session::authenticated(
        data.access_token,
        Some(data.refresh_token),
        data.user,
    ));
    Ok(())
}

/// 登出并清除状态
///
/// 对已登出的会话重复调用是幂等的。
/// 导航由路由服务监听会话变化自动处理。
pub fn logout<S, K>(session: &S, tokens: &TokenStore<K>)
where
    S: SessionStore,
    K: KeyValueStore,
{
    tokens.clear();
    session.replace(Session::empty());
}
