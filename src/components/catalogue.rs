use crate::api::types::{Genre, Role, VideoSummary};
use crate::components::icons::{Film, LogOut, RefreshCw};
use crate::session::{logout, use_session};
use crate::web::router::use_router;
use crate::{use_api, use_token_store};
use leptos::prelude::*;
use leptos::task::spawn_local;

/// 视频目录页（公开）
///
/// 未登录也可浏览；登录后导航栏显示用户与工作台入口。
#[component]
pub fn CataloguePage() -> impl IntoView {
    let session_ctx = use_session();
    let api = use_api();
    let tokens = use_token_store();
    let router = use_router();

    let (videos, set_videos) = signal(Vec::<VideoSummary>::new());
    let (genres, set_genres) = signal(Vec::<Genre>::new());
    let (selected_genre, set_selected_genre) = signal(Option::<String>::None);
    let (loading, set_loading) = signal(true);
    let (notification, set_notification) = signal(Option::<String>::None);

    // 分类列表只拉取一次
    {
        let api = api.clone();
        spawn_local(async move {
            match api.list_genres().await {
                Ok(list) => set_genres.set(list),
                Err(e) => set_notification.set(Some(format!("加载分类失败: {}", e))),
            }
        });
    }

    // 分类变化时重新加载目录（首次运行即为初始加载）
    Effect::new({
        let api = api.clone();
        move |_| {
            let genre = selected_genre.get();
            let api = api.clone();
            set_loading.set(true);
            spawn_local(async move {
                match api.list_videos(genre.as_deref()).await {
                    Ok(list) => set_videos.set(list),
                    Err(e) if e.is_logged_out() => {
                        // 会话已被传输层清空，路由守卫会处理后续跳转
                        set_notification.set(Some("登录已过期，请重新登录".to_string()));
                    }
                    Err(e) => set_notification.set(Some(format!("加载视频失败: {}", e))),
                }
                set_loading.set(false);
            });
        }
    });

    let on_genre_change = move |ev: leptos::web_sys::Event| {
        let value = event_target_value(&ev);
        set_selected_genre.set(if value.is_empty() { None } else { Some(value) });
    };

    // 3秒后清除通知
    Effect::new(move |_| {
        if notification.get().is_some() {
            set_timeout(
                move || set_notification.set(None),
                std::time::Duration::from_secs(3),
            );
        }
    });

    let is_authenticated = move || session_ctx.state.get().is_authenticated();
    let user_name = move || {
        session_ctx
            .state
            .get()
            .user
            .map(|u| u.full_name)
            .unwrap_or_default()
    };
    let user_role = move || session_ctx.state.get().user.map(|u| u.role.role);

    view! {
        <div class="min-h-screen bg-base-200 p-4 md:p-8 font-sans">
            <div class="max-w-7xl mx-auto space-y-8">
                <Show when=move || notification.get().is_some()>
                    <div class="toast toast-top toast-end z-50">
                        <div class="alert alert-error shadow-lg">
                            <span>{move || notification.get().unwrap()}</span>
                        </div>
                    </div>
                </Show>

                <div class="navbar bg-base-100 rounded-box shadow-xl">
                    <div class="flex-1 gap-2">
                        <Film attr:class="text-primary h-6 w-6" />
                        <a class="btn btn-ghost text-xl">"ClipCoach 视频目录"</a>
                    </div>
                    <div class="flex-none gap-2">
                        <Show
                            when=is_authenticated
                            fallback=move || view! {
                                <button on:click=move |_| router.navigate("/login") class="btn btn-primary">
                                    "登录"
                                </button>
                            }
                        >
                            <span class="badge badge-neutral hidden md:inline-flex">{user_name}</span>
                            <Show when=move || matches!(user_role(), Some(Role::Coach) | Some(Role::Admin))>
                                <button on:click=move |_| router.navigate("/studio") class="btn btn-outline">
                                    "教练工作台"
                                </button>
                            </Show>
                            <Show when=move || matches!(user_role(), Some(Role::Admin))>
                                <button on:click=move |_| router.navigate("/admin") class="btn btn-outline">
                                    "管理控制台"
                                </button>
                            </Show>
                            <button
                                on:click=move |_| logout(&session_ctx, &tokens)
                                class="btn btn-ghost btn-error gap-2"
                            >
                                <LogOut attr:class="h-4 w-4" /> "退出"
                            </button>
                        </Show>
                    </div>
                </div>

                <div class="card bg-base-100 shadow-xl">
                    <div class="card-body p-0">
                        <div class="flex items-center justify-between p-6 pb-2">
                            <div>
                                <h3 class="card-title">"训练视频"</h3>
                                <p class="text-base-content/70 text-sm">"按分类浏览全部公开视频。"</p>
                            </div>
                            <div class="flex items-center gap-2">
                                <select class="select select-bordered" on:change=on_genre_change>
                                    <option value="" selected=move || selected_genre.get().is_none()>
                                        "全部分类"
                                    </option>
                                    {move || genres.get().into_iter().map(|g| {
                                        let value = g.id.clone();
                                        let selected = move || selected_genre.get().as_deref() == Some(g.id.as_str());
                                        view! {
                                            <option value=value selected=selected>{g.name}</option>
                                        }
                                    }).collect_view()}
                                </select>
                                <Show when=move || loading.get()>
                                    <RefreshCw attr:class="h-5 w-5 animate-spin" />
                                </Show>
                            </div>
                        </div>

                        <div class="grid grid-cols-1 md:grid-cols-3 gap-4 p-6">
                            <Show when=move || videos.with(|v| v.is_empty()) && !loading.get()>
                                <div class="col-span-full text-center py-8 text-base-content/50">
                                    "该分类下暂无视频。"
                                </div>
                            </Show>
                            {move || videos.get().into_iter().map(|v| view! {
                                <div class="card bg-base-200 shadow">
                                    <div class="card-body">
                                        <h4 class="card-title text-base">{v.title.clone()}</h4>
                                        <div class="flex gap-2 text-sm text-base-content/70">
                                            {v.genre.clone().map(|g| view! {
                                                <span class="badge badge-outline">{g}</span>
                                            })}
                                            {v.coach_name.clone().map(|c| view! {
                                                <span>{format!("教练: {}", c)}</span>
                                            })}
                                        </div>
                                    </div>
                                </div>
                            }).collect_view()}
                        </div>
                    </div>
                </div>
            </div>
        </div>
    }
}
