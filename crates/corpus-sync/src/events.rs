//! 事件系统模块 - 版本同步过程中的各类事件
//!
//! 功能包括：
//! - 任务入队 / 索引完成 / 升级 / 失败事件
//! - 缓存淘汰与超额告警事件
//! - 事件广播和订阅机制

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::content::{SyncTarget, VersionId};
use crate::sync::job::SyncOutcome;

/// 同步事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 同步任务入队
    JobQueued {
        job_id: String,
        target: SyncTarget,
        queue_size: usize,
        timestamp: u64,
    },
    /// 版本索引完成（已通过缓存复核）
    VersionIndexed {
        version: VersionId,
        timestamp: u64,
    },
    /// live 版本升级
    VersionPromoted {
        old_version: Option<VersionId>,
        new_version: VersionId,
        /// 指针是否成功落盘
        persisted: bool,
        timestamp: u64,
    },
    /// 同步任务失败（含谎报成功被复核拦截的情况）
    SyncFailed {
        job_id: String,
        version: Option<VersionId>,
        outcome: SyncOutcome,
        timestamp: u64,
    },
    /// 版本被从缓存淘汰
    VersionEvicted {
        version: VersionId,
        timestamp: u64,
    },
    /// 淘汰后缓存仍然超额（没有可以安全淘汰的候选了）
    CacheOverBudget {
        cache_size: usize,
        max_cached_versions: usize,
        timestamp: u64,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::JobQueued { .. } => "job_queued",
            SyncEvent::VersionIndexed { .. } => "version_indexed",
            SyncEvent::VersionPromoted { .. } => "version_promoted",
            SyncEvent::SyncFailed { .. } => "sync_failed",
            SyncEvent::VersionEvicted { .. } => "version_evicted",
            SyncEvent::CacheOverBudget { .. } => "cache_over_budget",
        }
    }

    /// 获取事件时间戳
    pub fn timestamp(&self) -> u64 {
        match self {
            SyncEvent::JobQueued { timestamp, .. }
            | SyncEvent::VersionIndexed { timestamp, .. }
            | SyncEvent::VersionPromoted { timestamp, .. }
            | SyncEvent::SyncFailed { timestamp, .. }
            | SyncEvent::VersionEvicted { timestamp, .. }
            | SyncEvent::CacheOverBudget { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 最后事件时间
    pub last_event_time: Option<u64>,
}

/// 事件管理器
#[derive(Debug)]
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SyncEvent>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats.events_by_type.entry(event.event_type().to_string()).or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景（例如纯后台运行），仅打 debug
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 获取事件统计
    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> SyncEvent {
        SyncEvent::VersionIndexed {
            version: VersionId::from("v1"),
            timestamp: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let manager = EventManager::new(16);
        let mut rx = manager.subscribe();

        manager.emit(sample_event()).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "version_indexed");
        assert_eq!(event.timestamp(), 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let manager = EventManager::new(16);
        manager.emit(sample_event()).await;

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.events_by_type.get("version_indexed"), Some(&1));
        assert_eq!(stats.last_event_time, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let manager = EventManager::new(16);
        assert_eq!(manager.subscriber_count(), 0);
        let _rx = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 1);
    }
}
