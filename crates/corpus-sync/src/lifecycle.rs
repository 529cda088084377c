//! 进程生命周期管理
//!
//! 统一触发各模块的启动 / 停机切换。控制器实现 `LifecycleHook`：
//! 启动时按配置清缓存并读回持久化的 live 版本指针，停机时拒绝新
//! 任务、取消排队任务并清空缓存。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应进程级生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// 进程启动时调用
    async fn on_start(&self) -> Result<()>;

    /// 进程停机时调用
    async fn on_shutdown(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// 获取已注册的 Hook 数量
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：进程启动
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误但继续执行其他 Hook
    pub async fn notify_start(&self) -> Result<()> {
        info!("通知所有模块：进程启动");

        let mut errors = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_start().await {
                warn!("Hook #{} 启动失败: {}", index, e);
                errors.push(e);
            }
        }

        if !errors.is_empty() {
            warn!("{} 个模块启动失败，但所有模块都已尝试执行", errors.len());
            return Err(errors.into_iter().next().unwrap());
        }
        Ok(())
    }

    /// 通知所有 Hook：进程停机
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误但继续执行其他 Hook
    pub async fn notify_shutdown(&self) -> Result<()> {
        info!("通知所有模块：进程停机");

        let mut errors = Vec::new();
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_shutdown().await {
                warn!("Hook #{} 停机失败: {}", index, e);
                errors.push(e);
            }
        }

        if !errors.is_empty() {
            warn!("{} 个模块停机失败，但所有模块都已尝试执行", errors.len());
            return Err(errors.into_iter().next().unwrap());
        }
        Ok(())
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorpusSyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHook {
        starts: AtomicUsize,
        shutdowns: AtomicUsize,
        fail_start: bool,
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        async fn on_start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(CorpusSyncError::Other("boom".to_string()));
            }
            Ok(())
        }

        async fn on_shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let hook = Arc::new(CountingHook::default());
        let mut manager = LifecycleManager::new();
        manager.register_hook(hook.clone());
        assert_eq!(manager.hook_count(), 1);

        manager.notify_start().await.unwrap();
        manager.notify_shutdown().await.unwrap();
        assert_eq!(hook.starts.load(Ordering::SeqCst), 1);
        assert_eq!(hook.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_hook_does_not_block_others() {
        let failing = Arc::new(CountingHook { fail_start: true, ..Default::default() });
        let healthy = Arc::new(CountingHook::default());

        let mut manager = LifecycleManager::new();
        manager.register_hook(failing.clone());
        manager.register_hook(healthy.clone());

        // 第一个 Hook 失败，第二个仍然执行
        assert!(manager.notify_start().await.is_err());
        assert_eq!(healthy.starts.load(Ordering::SeqCst), 1);
    }
}
