//! 带凭据注入与自动刷新的传输层
//!
//! 所有发往受保护 API 的请求都经过这里：
//! 1. 出站时附加 `Authorization: Bearer <access token>`；
//! 2. 收到 401 时执行单飞（single-flight）刷新交换；
//! 3. 用新令牌把原请求重放一次；
//! 4. 刷新失败则清空会话（登出语义），把原始 401 交还调用方。
//!
//! 网络层错误原样向上传播，绝不触发刷新。

#[cfg(test)]
pub mod tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::api::error::ApiError;
use crate::api::types::{ApiEnvelope, ApiErrorBody, RefreshData, RefreshRequest};
use crate::session::{Session, SessionStore};
use crate::tokens::{KeyValueStore, TokenStore};

/// 刷新端点路径（相对 base_url）
const REFRESH_PATH: &str = "/user/refresh-token";
/// Authorization 头名称
const AUTHORIZATION: &str = "Authorization";

// =========================================================
// HTTP 抽象层
// =========================================================

/// 通用 HTTP 方法枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// 通用 HTTP 请求结构
///
/// 需要 `Clone`：401 后的重放使用原请求的副本。
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(url: &str, method: HttpMethod) -> Self {
        Self {
            url: url.to_string(),
            method,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// 添加请求头（同名覆盖）
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// 设置 JSON 请求体并标注 Content-Type
    pub fn with_json_body(self, body: String) -> Self {
        let mut req = self.with_header("Content-Type", "application/json");
        req.body = Some(body);
        req
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }
}

/// 通用 HTTP 响应结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 传输层错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// 请求构建失败
    RequestBuildFailed(String),
    /// 网络请求失败
    NetworkError(String),
    /// 请求超时
    Timeout,
}

impl core::fmt::Display for HttpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HttpError::RequestBuildFailed(msg) => write!(f, "请求构建失败: {}", msg),
            HttpError::NetworkError(msg) => write!(f, "网络错误: {}", msg),
            HttpError::Timeout => write!(f, "请求超时"),
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        ApiError::Network(e.to_string())
    }
}

/// HTTP 客户端特性 (Trait)
///
/// 使用 async_trait 以支持异步调用，(?Send) 是因为浏览器
/// 环境下的 future 不是 Send 的。生产实现为 `web::FetchHttpClient`，
/// 测试中用脚本化的 Mock 替换。
#[async_trait::async_trait(?Send)]
pub trait HttpBackend {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// =========================================================
// 带授权的传输器
// =========================================================

/// 进行中的刷新交换：所有等待者共享同一个结果
type SharedRefresh = Shared<LocalBoxFuture<'static, Result<String, ApiError>>>;

/// 带授权的传输器
///
/// 克隆是浅拷贝，所有副本共享同一个刷新单飞槽位，
/// 因此整个应用同一时刻最多一笔刷新交换在途。
pub struct AuthorizedTransport<H, S, K>
where
    K: KeyValueStore,
{
    inner: Rc<Inner<H, S, K>>,
}

impl<H, S, K> Clone for AuthorizedTransport<H, S, K>
where
    K: KeyValueStore,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct Inner<H, S, K>
where
    K: KeyValueStore,
{
    base_url: String,
    http: H,
    session: S,
    tokens: TokenStore<K>,
    /// 单飞槽位：`Some` 表示一笔刷新交换正在途中
    pending_refresh: RefCell<Option<SharedRefresh>>,
}

impl<H, S, K> AuthorizedTransport<H, S, K>
where
    H: HttpBackend + 'static,
    S: SessionStore + 'static,
    K: KeyValueStore + 'static,
{
    pub fn new(base_url: &str, http: H, session: S, tokens: TokenStore<K>) -> Self {
        Self {
            inner: Rc::new(Inner {
                base_url: base_url.trim_end_matches('/').to_string(),
                http,
                session,
                tokens,
                pending_refresh: RefCell::new(None),
            }),
        }
    }

    /// 拼接完整请求地址
    pub fn url(&self, path: &str) -> String {
        self.inner.url(path)
    }

    /// 发送请求并透明处理凭据过期
    ///
    /// - 未显式携带 Authorization 头时附加当前访问令牌；
    ///   没有令牌则按原样发送（由后端拒绝，不在本地拦截）；
    /// - 对同一逻辑请求，首个 401 触发刷新并重放恰好一次；
    /// - 重放的响应（无论状态）原样返回给调用方。
    pub async fn dispatch(&self, mut req: HttpRequest) -> Result<HttpResponse, ApiError> {
        if !req.has_header(AUTHORIZATION) {
            if let Some(token) = self.inner.session.access_token() {
                req = req.with_header(AUTHORIZATION, &format!("Bearer {}", token));
            }
        }

        let first = self.inner.http.send(req.clone()).await.map_err(ApiError::from)?;
        if first.status != 401 {
            return Ok(first);
        }

        // 首个 401：尝试刷新。刷新失败时会话已被清空，
        // 把原始 401 作为 AuthExpired 交还调用方。
        match self.refresh_access_token().await {
            Ok(token) => {
                let replay = req.with_header(AUTHORIZATION, &format!("Bearer {}", token));
                self.inner.http.send(replay).await.map_err(ApiError::from)
            }
            Err(_) => Err(ApiError::AuthExpired {
                message: error_message(&first.body, "认证已失效"),
            }),
        }
    }

    /// 单飞刷新：并发的 401 等待同一笔交换的结果
    ///
    /// 槽位的检查与占位在同一个同步步骤内完成（首个挂起点
    /// 之前），任务在 await 点交错时也不可能并发发起两笔交换。
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let existing = self.inner.pending_refresh.borrow().clone();
        if let Some(pending) = existing {
            return pending.await;
        }

        let inner = Rc::clone(&self.inner);
        let fut: SharedRefresh = async move { Inner::run_refresh(&inner).await }
            .boxed_local()
            .shared();
        *self.inner.pending_refresh.borrow_mut() = Some(fut.clone());
        fut.await
    }
}

impl<H, S, K> Inner<H, S, K>
where
    H: HttpBackend + 'static,
    S: SessionStore + 'static,
    K: KeyValueStore + 'static,
{
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// 清空会话与持久化令牌（登出语义）
    fn clear_session(&self) {
        self.tokens.clear();
        self.session.replace(Session::empty());
    }

    /// 包装一次刷新交换：无论结果如何，退出前释放单飞槽位。
    /// 槽位由交换自身释放，发起方被取消也不会把已完成的
    /// 交换留在槽位里。
    async fn run_refresh(inner: &Rc<Self>) -> Result<String, ApiError> {
        let result = Self::exchange_refresh_token(inner).await;
        *inner.pending_refresh.borrow_mut() = None;
        result
    }

    /// 执行一次真实的刷新交换
    ///
    /// 成功：仅替换会话中的访问令牌并持久化，其余字段不动；
    /// 失败（网络失败、超时或被拒绝）：清空会话与令牌存储，不重试。
    /// 刷新令牌取自会话，缺失时回退到令牌存储；两处都没有
    /// 则视为立即被拒绝，不发起网络调用。
    async fn exchange_refresh_token(inner: &Rc<Self>) -> Result<String, ApiError> {
        let refresh_token = inner
            .session
            .current()
            .refresh_token
            .or_else(|| inner.tokens.refresh_token());

        let Some(refresh_token) = refresh_token else {
            inner.clear_session();
            return Err(ApiError::RefreshRejected {
                message: "缺少刷新令牌".to_string(),
            });
        };

        let body = match serde_json_wasm::to_string(&RefreshRequest { refresh_token }) {
            Ok(body) => body,
            Err(e) => {
                inner.clear_session();
                return Err(ApiError::Decode(e.to_string()));
            }
        };

        // 刷新请求不携带 Bearer 头
        let req = HttpRequest::new(&inner.url(REFRESH_PATH), HttpMethod::Post).with_json_body(body);

        match inner.http.send(req).await {
            Ok(resp) if resp.is_success() => {
                let envelope: ApiEnvelope<RefreshData> =
                    match serde_json_wasm::from_str(&resp.body) {
                        Ok(env) => env,
                        Err(e) => {
                            inner.clear_session();
                            return Err(ApiError::Decode(e.to_string()));
                        }
                    };
                let rotated = envelope.data.access_token;

                let current = inner.session.current();
                inner.session.replace(current.with_access_token(rotated.clone()));
                inner.tokens.set_access_token(&rotated);
                Ok(rotated)
            }
            Ok(resp) => {
                inner.clear_session();
                Err(ApiError::RefreshRejected {
                    message: error_message(&resp.body, "刷新令牌无效"),
                })
            }
            Err(e) => {
                inner.clear_session();
                Err(ApiError::Network(e.to_string()))
            }
        }
    }
}

/// 从错误信封中提取后端消息，解析失败时退回给定的描述
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    serde_json_wasm::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| fallback.to_string())
}
