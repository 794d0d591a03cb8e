//! HTTP 客户端实现模块
//!
//! 基于 `gloo-net` 的 fetch 实现，并用 `gloo-timers` 为每个
//! 请求施加有限超时。超时与网络错误同等对待，由上层决定
//! 是否影响会话。

use futures::FutureExt;
use futures::future::{Either, select};
use gloo_net::http::Request;
use gloo_timers::future::TimeoutFuture;

use crate::api::transport::{HttpBackend, HttpError, HttpMethod, HttpRequest, HttpResponse};

/// 默认请求超时（毫秒）
const DEFAULT_TIMEOUT_MS: u32 = 10_000;

/// 基于浏览器 fetch 的 HTTP 客户端
#[derive(Clone, Copy)]
pub struct FetchHttpClient {
    timeout_ms: u32,
}

impl FetchHttpClient {
    pub fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(timeout_ms: u32) -> Self {
        Self { timeout_ms }
    }

    async fn fetch(req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = match req.method {
            HttpMethod::Get => Request::get(&req.url),
            HttpMethod::Post => Request::post(&req.url),
            HttpMethod::Put => Request::put(&req.url),
            HttpMethod::Delete => Request::delete(&req.url),
        };

        for (key, value) in &req.headers {
            builder = builder.header(key, value);
        }

        let response = match req.body {
            Some(body) => builder
                .body(body)
                .map_err(|e| HttpError::RequestBuildFailed(e.to_string()))?
                .send()
                .await
                .map_err(|e| HttpError::NetworkError(e.to_string()))?,
            None => builder
                .send()
                .await
                .map_err(|e| HttpError::NetworkError(e.to_string()))?,
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::NetworkError(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

impl Default for FetchHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait(?Send)]
impl HttpBackend for FetchHttpClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let fetch = Self::fetch(req).boxed_local();
        let timeout = TimeoutFuture::new(self.timeout_ms).boxed_local();

        match select(fetch, timeout).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(HttpError::Timeout),
        }
    }
}
