use crate::api::types::VideoSummary;
use crate::components::icons::{LogOut, RefreshCw, ShieldCheck};
use crate::session::{logout, use_session};
use crate::web::router::use_router;
use crate::{use_api, use_token_store};
use leptos::prelude::*;
use leptos::task::spawn_local;

/// 工作台共用的顶栏：标题、当前用户、登出
#[component]
fn DashboardNavbar(title: &'static str) -> impl IntoView {
    let session_ctx = use_session();
    let tokens = use_token_store();
    let router = use_router();

    let user_label = move || {
        session_ctx
            .state
            .get()
            .user
            .map(|u| format!("{} ({})", u.full_name, u.role.role.as_str()))
            .unwrap_or_default()
    };

    let on_logout = move |_| {
        logout(&session_ctx, &tokens);
        // 路由服务监听会话变化，会自动离开受保护页面
    };

    view! {
        <div class="navbar bg-base-100 rounded-box shadow-xl">
            <div class="flex-1 gap-2">
                <ShieldCheck attr:class="text-primary h-6 w-6" />
                <a class="btn btn-ghost text-xl">{title}</a>
                <span class="badge badge-neutral hidden md:inline-flex">{user_label}</span>
            </div>
            <div class="flex-none gap-2">
                <button on:click=move |_| router.navigate("/") class="btn btn-ghost">
                    "返回目录"
                </button>
                <button on:click=on_logout class="btn btn-outline btn-error gap-2">
                    <LogOut attr:class="h-4 w-4" /> "退出登录"
                </button>
            </div>
        </div>
    }
}

/// 视频列表卡片：工作台与控制台共用
#[component]
fn VideoTable() -> impl IntoView {
    let api = use_api();

    let (videos, set_videos) = signal(Vec::<VideoSummary>::new());
    let (loading, set_loading) = signal(true);
    let (error_msg, set_error_msg) = signal(Option::<String>::None);

    let load_videos = {
        let api = api.clone();
        move || {
            let api = api.clone();
            set_loading.set(true);
            spawn_local(async move {
                match api.list_videos(None).await {
                    Ok(list) => {
                        set_error_msg.set(None);
                        set_videos.set(list);
                    }
                    Err(e) => set_error_msg.set(Some(format!("加载视频失败: {}", e))),
                }
                set_loading.set(false);
            });
        }
    };

    // 初始加载
    {
        let load_videos = load_videos.clone();
        load_videos();
    }

    let total = move || videos.with(|v| v.len());

    view! {
        <div class="card bg-base-100 shadow-xl">
            <div class="card-body p-0">
                <div class="flex items-center justify-between p-6 pb-2">
                    <div>
                        <h3 class="card-title">"视频内容"</h3>
                        <p class="text-base-content/70 text-sm">
                            {move || format!("共 {} 条视频。", total())}
                        </p>
                    </div>
                    <button
                        on:click=move |_| load_videos()
                        disabled=move || loading.get()
                        class="btn btn-ghost btn-circle"
                    >
                        <RefreshCw attr:class=move || if loading.get() { "h-5 w-5 animate-spin" } else { "h-5 w-5" } />
                    </button>
                </div>

                <Show when=move || error_msg.get().is_some()>
                    <div role="alert" class="alert alert-error text-sm mx-6 my-2">
                        <span>{move || error_msg.get().unwrap()}</span>
                    </div>
                </Show>

                <div class="overflow-x-auto w-full">
                    <table class="table table-zebra w-full">
                        <thead>
                            <tr>
                                <th>"标题"</th>
                                <th class="hidden md:table-cell">"分类"</th>
                                <th class="hidden md:table-cell">"教练"</th>
                            </tr>
                        </thead>
                        <tbody>
                            <Show when=move || total() == 0 && !loading.get()>
                                <tr>
                                    <td colspan="3" class="text-center py-8 text-base-content/50">
                                        "暂无视频内容。"
                                    </td>
                                </tr>
                            </Show>
                            {move || videos.get().into_iter().map(|v| view! {
                                <tr>
                                    <td>{v.title}</td>
                                    <td class="hidden md:table-cell">{v.genre.unwrap_or_else(|| "-".to_string())}</td>
                                    <td class="hidden md:table-cell">{v.coach_name.unwrap_or_else(|| "-".to_string())}</td>
                                </tr>
                            }).collect_view()}
                        </tbody>
                    </table>
                </div>
            </div>
        </div>
    }
}

/// 教练工作台（教练与管理员可见，由路由守卫把关）
#[component]
pub fn StudioPage() -> impl IntoView {
    view! {
        <div class="min-h-screen bg-base-200 p-4 md:p-8 font-sans">
            <div class="max-w-7xl mx-auto space-y-8">
                <DashboardNavbar title="教练工作台" />
                <VideoTable />
            </div>
        </div>
    }
}

/// 管理控制台（仅管理员可见，由路由守卫把关）
#[component]
pub fn AdminConsolePage() -> impl IntoView {
    let session_ctx = use_session();

    let email = move || {
        session_ctx
            .state
            .get()
            .user
            .map(|u| u.email)
            .unwrap_or_default()
    };

    view! {
        <div class="min-h-screen bg-base-200 p-4 md:p-8 font-sans">
            <div class="max-w-7xl mx-auto space-y-8">
                <DashboardNavbar title="管理控制台" />

                <div class="stats shadow w-full stats-vertical md:stats-horizontal bg-base-100">
                    <div class="stat">
                        <div class="stat-title">"当前管理员"</div>
                        <div class="stat-value text-primary text-2xl">{email}</div>
                        <div class="stat-desc">"账号、教练与分类管理请使用对应后台接口"</div>
                    </div>
                </div>

                <VideoTable />
            </div>
        </div>
    }
}
