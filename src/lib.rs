//! ClipCoach 前端应用
//!
//! 采用 Context-Driven 的高内聚低耦合架构：
//! - `web::route`: 路由定义与导航守卫（领域模型）
//! - `web::router`: 路由服务（核心引擎）
//! - `session`: 会话状态管理
//! - `tokens`: 令牌持久化
//! - `api`: 带凭据注入与自动刷新的传输层、业务端点
//! - `components`: UI 组件层

mod api;
mod components {
    pub mod catalogue;
    pub mod dashboard;
    mod icons;
    pub mod login;
}
mod session;
mod tokens;

use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api::Api;
use crate::api::transport::AuthorizedTransport;
use crate::components::catalogue::CataloguePage;
use crate::components::dashboard::{AdminConsolePage, StudioPage};
use crate::components::login::LoginPage;
use crate::session::{SessionContext, init_session, restore_session};
use crate::tokens::TokenStore;

// 原生 Web API 封装模块
// 此模块提供对浏览器原生 API 的轻量级封装，替代 gloo-storage，
// 以减小 WASM 二进制体积。
pub(crate) mod web {
    mod http;
    pub mod route;
    pub mod router;
    mod storage;

    pub use http::FetchHttpClient;
    pub use storage::LocalStorage;
}

use web::route::AppRoute;
use web::router::{Router, RouterOutlet};

/// 后端 API 根路径（同源部署）
const API_BASE: &str = "/api";

/// 应用使用的具体 API 客户端类型
pub(crate) type AppApi = Api<web::FetchHttpClient, SessionContext, web::LocalStorage>;

/// 应用使用的令牌存储类型
pub(crate) type AppTokenStore = TokenStore<web::LocalStorage>;

/// 从 Context 获取 API 客户端
///
/// fetch 的 future 不是 Send 的，因此 Api 本体放在线程本地的
/// 响应式 arena 里，Context 中共享的是它的句柄。
pub(crate) fn use_api() -> AppApi {
    use_context::<StoredValue<AppApi, LocalStorage>>()
        .expect("Api should be provided")
        .get_value()
}

/// 从 Context 获取令牌存储
pub(crate) fn use_token_store() -> AppTokenStore {
    use_context::<AppTokenStore>().expect("TokenStore should be provided")
}

/// 路由匹配函数
///
/// 根据 AppRoute 枚举返回对应的视图组件。
fn route_matcher(route: AppRoute) -> AnyView {
    match route {
        AppRoute::Home => view! { <CataloguePage /> }.into_any(),
        AppRoute::Login => view! { <LoginPage /> }.into_any(),
        AppRoute::CoachStudio => view! { <StudioPage /> }.into_any(),
        AppRoute::AdminConsole => view! { <AdminConsolePage /> }.into_any(),
        AppRoute::NotFound => view! {
            <div class="flex items-center justify-center min-h-screen bg-base-200">
                <div class="text-center">
                    <h1 class="text-6xl font-bold text-error">"404"</h1>
                    <p class="text-xl mt-4">"页面未找到"</p>
                </div>
            </div>
        }
        .into_any(),
    }
}

#[component]
pub fn App() -> impl IntoView {
    // 1. 创建会话上下文与令牌存储
    let session_ctx = SessionContext::new();
    provide_context(session_ctx);

    let tokens = AppTokenStore::new(web::LocalStorage);
    provide_context(tokens.clone());

    // 2. 构建传输层与 API 客户端
    //    整个应用共享同一个传输器，刷新交换因此全局单飞
    let transport = AuthorizedTransport::new(
        API_BASE,
        web::FetchHttpClient::new(),
        session_ctx,
        tokens.clone(),
    );
    let api = Api::new(transport);
    provide_context(StoredValue::new_local(api.clone()));

    // 3. 还原持久化令牌，并异步恢复已认证会话
    init_session(&session_ctx, &tokens);
    spawn_local(async move {
        restore_session(&api, &session_ctx).await;
    });

    // 4. 会话信号注入路由服务实现守卫（解耦）
    let session_signal = session_ctx.session_signal();

    view! {
        <Router session=session_signal>
            <RouterOutlet matcher=route_matcher />
        </Router>
    }
}
