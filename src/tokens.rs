//! 令牌持久化模块
//!
//! 将访问令牌与刷新令牌保存在两个独立的命名槽位中，
//! 使会话可以跨进程重启恢复。槽位内容是不透明字符串，
//! 本模块不对令牌做任何校验。


/// 底层键值存储抽象
///
/// 生产实现为 `web::LocalStorage`；测试中使用内存 HashMap。
/// 存储不可用视为降级：读取返回 `None`，写入为空操作。
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// 访问令牌槽位
const ACCESS_TOKEN_KEY: &str = "clipcoach_access_token";
/// 刷新令牌槽位
const REFRESH_TOKEN_KEY: &str = "clipcoach_refresh_token";

/// 令牌存储
///
/// 在 `Session` 的令牌发生变化时写入，登出时清空。
#[derive(Clone, Copy)]
pub struct TokenStore<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> TokenStore<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) {
        self.store.set(ACCESS_TOKEN_KEY, token);
    }

    pub fn set_refresh_token(&self, token: &str) {
        self.store.set(REFRESH_TOKEN_KEY, token);
    }

    /// 同时写入两个令牌（登录成功时调用）
    pub fn store_pair(&self, access: &str, refresh: &str) {
        self.store.set(ACCESS_TOKEN_KEY, access);
        self.store.set(REFRESH_TOKEN_KEY, refresh);
    }

    /// 清空两个槽位（登出或刷新失败时调用）
    pub fn clear(&self) {
        self.store.remove(ACCESS_TOKEN_KEY);
        self.store.remove(REFRESH_TOKEN_KEY);
    }
}
