use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;

/// 同一个 key 的并发请求合并为一次执行，所有调用方拿到同一个结果（成功或失败）
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    inflight: DashMap<K, Shared<BoxFuture<'static, V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// key 已有进行中的请求时，`fut` 不会被执行
    pub async fn run<F>(&self, key: K, fut: F) -> V
    where
        F: Future<Output = V> + Send + 'static,
    {
        let shared = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let shared = fut.boxed().shared();
                entry.insert(shared.clone());
                shared
            }
        };
        let result = shared.clone().await;
        // 只移除自己参与的那一轮，避免误删之后新建的请求
        self.inflight
            .remove_if(&key, |_, current| current.ptr_eq(&shared));
        result
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
