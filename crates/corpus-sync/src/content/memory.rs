//! 基于内存的内容仓库实现
//!
//! 供测试与示例使用：版本按注册顺序获得单调的新旧次序，支持注入
//! 各类故障（无效版本、物化失败、谎报成功），并统计 `ensure_cache`
//! 的并发度，方便断言单通道串行物化这一性质。

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use crate::content::{ContentStore, VersionId};
use crate::error::{CorpusSyncError, Result};

#[derive(Debug, Default)]
struct StoreState {
    /// 升序排列：下标越大版本越新
    versions: Vec<VersionId>,
    cached: HashSet<VersionId>,
    invalid: HashSet<VersionId>,
    fail_ensure: HashSet<VersionId>,
    lie_ensure: HashSet<VersionId>,
}

/// 内存内容仓库
#[derive(Debug)]
pub struct MemoryContentStore {
    state: RwLock<StoreState>,
    /// 可选的物化闸门：设置后每次 ensure_cache 消耗一个许可
    ensure_gate: Mutex<Option<Arc<Semaphore>>>,
    /// 可选的物化延迟（模拟慢速构建）
    ensure_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    ensure_calls: AtomicUsize,
    index_restricted: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            ensure_gate: Mutex::new(None),
            ensure_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            ensure_calls: AtomicUsize::new(0),
            index_restricted: AtomicBool::new(false),
        }
    }

    /// 注册一个新版本（追加在最新端）
    pub fn register_version(&self, id: impl Into<VersionId>) {
        let id = id.into();
        let mut state = self.state.write();
        if !state.versions.contains(&id) {
            state.versions.push(id);
        }
    }

    /// 按从旧到新的顺序批量注册版本
    pub fn register_versions<I, V>(&self, ids: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<VersionId>,
    {
        for id in ids {
            self.register_version(id);
        }
    }

    /// 从已知版本中移除（模拟 rebase 后端点消失）
    pub fn unregister_version(&self, id: &VersionId) {
        let mut state = self.state.write();
        state.versions.retain(|v| v != id);
        state.cached.remove(id);
    }

    /// 标记版本为无效（校验阶段会拒绝）
    pub fn mark_invalid(&self, id: impl Into<VersionId>) {
        let id = id.into();
        self.state.write().invalid.insert(id);
    }

    /// 注入物化失败：ensure_cache 返回 false
    pub fn fail_ensure_for(&self, id: impl Into<VersionId>) {
        let id = id.into();
        self.state.write().fail_ensure.insert(id);
    }

    /// 注入谎报成功：ensure_cache 返回 true 但不真正缓存
    pub fn lie_ensure_for(&self, id: impl Into<VersionId>) {
        let id = id.into();
        self.state.write().lie_ensure.insert(id);
    }

    /// 直接写入缓存成员（跳过物化流程，用于搭建测试前置状态）
    pub fn seed_cached(&self, id: impl Into<VersionId>) {
        let id = id.into();
        let mut state = self.state.write();
        if !state.versions.contains(&id) {
            state.versions.push(id.clone());
        }
        state.cached.insert(id);
    }

    pub fn set_ensure_delay(&self, delay: Option<Duration>) {
        *self.ensure_delay.lock() = delay;
    }

    pub fn set_ensure_gate(&self, gate: Option<Arc<Semaphore>>) {
        *self.ensure_gate.lock() = gate;
    }

    pub fn ensure_call_count(&self) -> usize {
        self.ensure_calls.load(AtomicOrdering::SeqCst)
    }

    /// 历史上同时在物化中的最大调用数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    pub fn is_index_restricted(&self) -> bool {
        self.index_restricted.load(AtomicOrdering::SeqCst)
    }

    fn position_of(&self, id: &VersionId) -> Option<usize> {
        self.state.read().versions.iter().position(|v| v == id)
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn list_available_versions(&self) -> Result<Vec<VersionId>> {
        let state = self.state.read();
        // 最新的在最前
        Ok(state.versions.iter().rev().cloned().collect())
    }

    async fn compare(&self, a: &VersionId, b: &VersionId) -> Result<Ordering> {
        let pos_a = self
            .position_of(a)
            .ok_or_else(|| CorpusSyncError::VersionNotFound(a.to_string()))?;
        let pos_b = self
            .position_of(b)
            .ok_or_else(|| CorpusSyncError::VersionNotFound(b.to_string()))?;
        Ok(pos_a.cmp(&pos_b))
    }

    async fn is_valid_version(&self, id: &VersionId) -> Result<bool> {
        let state = self.state.read();
        Ok(state.versions.contains(id) && !state.invalid.contains(id))
    }

    async fn latest_version_id(&self) -> Result<VersionId> {
        self.state
            .read()
            .versions
            .last()
            .cloned()
            .ok_or_else(|| CorpusSyncError::VersionNotFound("no versions available".to_string()))
    }

    async fn cached_version_list(&self) -> Result<Vec<VersionId>> {
        let state = self.state.read();
        Ok(state
            .versions
            .iter()
            .filter(|v| state.cached.contains(*v))
            .cloned()
            .collect())
    }

    async fn ensure_cache(&self, id: &VersionId) -> Result<bool> {
        self.ensure_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let current = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, AtomicOrdering::SeqCst);

        let gate = self.ensure_gate.lock().clone();
        let delay = *self.ensure_delay.lock();

        let result = async {
            if let Some(gate) = gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| CorpusSyncError::Store(format!("ensure gate closed: {}", e)))?;
                permit.forget();
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state.write();
            if !state.versions.contains(id) || state.fail_ensure.contains(id) {
                return Ok(false);
            }
            if state.lie_ensure.contains(id) {
                // 谎报成功：不写入缓存
                return Ok(true);
            }
            state.cached.insert(id.clone());
            Ok(true)
        }
        .await;

        self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        result
    }

    async fn clear_cache(&self, id: &VersionId) -> Result<()> {
        self.state.write().cached.remove(id);
        Ok(())
    }

    async fn clear_all_caches(&self) -> Result<()> {
        self.state.write().cached.clear();
        Ok(())
    }

    fn set_index_restriction(&self, restricted: bool) {
        self.index_restricted.store(restricted, AtomicOrdering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ordering_follows_registration() {
        let store = MemoryContentStore::new();
        store.register_versions(["v1", "v2", "v3"]);

        let v1 = VersionId::from("v1");
        let v3 = VersionId::from("v3");
        assert_eq!(store.compare(&v3, &v1).await.unwrap(), Ordering::Greater);
        assert_eq!(store.compare(&v1, &v3).await.unwrap(), Ordering::Less);
        assert_eq!(store.compare(&v1, &v1).await.unwrap(), Ordering::Equal);

        assert_eq!(store.latest_version_id().await.unwrap(), v3);
        // 列表最新在最前，与 compare 一致
        let listed = store.list_available_versions().await.unwrap();
        assert_eq!(listed.first().unwrap(), &v3);
    }

    #[tokio::test]
    async fn test_compare_unknown_version() {
        let store = MemoryContentStore::new();
        store.register_version("v1");
        let err = store
            .compare(&VersionId::from("v1"), &VersionId::from("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, CorpusSyncError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_ensure_and_clear_cache() {
        let store = MemoryContentStore::new();
        store.register_version("v1");
        let v1 = VersionId::from("v1");

        assert!(store.ensure_cache(&v1).await.unwrap());
        assert_eq!(store.cached_version_list().await.unwrap(), vec![v1.clone()]);

        store.clear_cache(&v1).await.unwrap();
        assert!(store.cached_version_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryContentStore::new();
        store.register_versions(["bad", "liar"]);
        store.fail_ensure_for("bad");
        store.lie_ensure_for("liar");

        assert!(!store.ensure_cache(&VersionId::from("bad")).await.unwrap());
        // 谎报成功：返回 true 但缓存里没有
        assert!(store.ensure_cache(&VersionId::from("liar")).await.unwrap());
        assert!(store.cached_version_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_restriction_passthrough() {
        let store = MemoryContentStore::new();
        assert!(!store.is_index_restricted());
        store.set_index_restriction(true);
        assert!(store.is_index_restricted());
    }
}
