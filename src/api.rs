//! API 客户端
//!
//! 在传输层之上定义各业务端点的强类型调用。
//! 信封解析集中在 `decode`，未类型化的 JSON 不会离开本模块。

pub mod error;
pub mod transport;
pub mod types;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::session::SessionStore;
use crate::tokens::KeyValueStore;
use error::ApiError;
use transport::{AuthorizedTransport, HttpBackend, HttpMethod, HttpRequest, HttpResponse};
use types::{ApiEnvelope, Genre, LoginData, LoginRequest, UserProfile, VideoSummary};

/// 业务 API 客户端
pub struct Api<H, S, K>
where
    K: KeyValueStore,
{
    transport: AuthorizedTransport<H, S, K>,
}

impl<H, S, K> Clone for Api<H, S, K>
where
    K: KeyValueStore,
{
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<H, S, K> Api<H, S, K>
where
    H: HttpBackend + 'static,
    S: SessionStore + 'static,
    K: KeyValueStore + 'static,
{
    pub fn new(transport: AuthorizedTransport<H, S, K>) -> Self {
        Self { transport }
    }

    /// 登录
    pub async fn login(&self, email: String, password: String) -> Result<LoginData, ApiError> {
        let body = encode(&LoginRequest { email, password })?;
        let req = HttpRequest::new(&self.transport.url("/user/login"), HttpMethod::Post)
            .with_json_body(body);
        decode(self.transport.dispatch(req).await?)
    }

    /// 拉取当前用户档案
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let req = HttpRequest::new(&self.transport.url("/user/profile"), HttpMethod::Get);
        decode(self.transport.dispatch(req).await?)
    }

    /// 拉取视频目录，可按分类过滤
    pub async fn list_videos(&self, genre: Option<&str>) -> Result<Vec<VideoSummary>, ApiError> {
        let path = match genre {
            Some(g) => format!("/video?genre={}", g),
            None => "/video".to_string(),
        };
        let req = HttpRequest::new(&self.transport.url(&path), HttpMethod::Get);
        decode(self.transport.dispatch(req).await?)
    }

    /// 拉取全部分类
    pub async fn list_genres(&self) -> Result<Vec<Genre>, ApiError> {
        let req = HttpRequest::new(&self.transport.url("/genre"), HttpMethod::Get);
        decode(self.transport.dispatch(req).await?)
    }
}

// =========================================================
// 信封编解码
// =========================================================

/// 序列化请求体
fn encode<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json_wasm::to_string(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// 按状态码把响应解析为数据或错误分类
///
/// 走到这里的 401 意味着传输层的刷新与重放仍未能恢复。
fn decode<T: DeserializeOwned>(resp: HttpResponse) -> Result<T, ApiError> {
    match resp.status {
        200..=299 => serde_json_wasm::from_str::<ApiEnvelope<T>>(&resp.body)
            .map(|envelope| envelope.data)
            .map_err(|e| ApiError::Decode(e.to_string())),
        401 => Err(ApiError::AuthExpired {
            message: transport::error_message(&resp.body, "认证已失效"),
        }),
        status @ 400..=499 => Err(ApiError::Validation {
            status,
            message: transport::error_message(&resp.body, "请求被拒绝"),
        }),
        status => Err(ApiError::Server {
            status,
            message: transport::error_message(&resp.body, "服务暂不可用"),
        }),
    }
}
