//! 同步 worker
//!
//! 一次性任务：解析目标版本、校验、请求内容仓库物化，然后把结果
//! 恰好一次地回报给控制器。三个阶段依次为解析（LATEST → 具体
//! 版本）、校验（是否有效可索引）、物化（ensure_cache）。worker
//! 内部从不重试，重试策略（如果有）由调用方负责。

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::content::{ContentStore, SyncTarget};
use crate::sync::job::{JobCompletion, JobHandle, SyncOutcome};

pub(crate) struct SyncWorker {
    store: Arc<dyn ContentStore>,
    handle: JobHandle,
}

impl SyncWorker {
    pub(crate) fn new(store: Arc<dyn ContentStore>, handle: JobHandle) -> Self {
        Self { store, handle }
    }

    /// 执行同步任务
    ///
    /// 返回 `None` 表示任务在开始前已被取消：此时句柄已由取消方置为
    /// 终态，队列条目也已移除，不得再进入控制器回调。
    pub(crate) async fn run(self) -> Option<JobCompletion> {
        if !self.handle.mark_running() {
            debug!("Sync job {} was cancelled before it started, skipping", self.handle.id());
            return None;
        }

        // 解析阶段
        let version = match self.handle.target() {
            SyncTarget::Pinned(v) => v.clone(),
            SyncTarget::Latest => match self.store.latest_version_id().await {
                Ok(v) => {
                    debug!("Resolved latest version to {}", v);
                    v
                }
                Err(e) => {
                    error!("Failed to resolve latest version: {}", e);
                    return Some(self.handle.complete(None, SyncOutcome::StoreError));
                }
            },
        };

        // 校验阶段
        match self.store.is_valid_version(&version).await {
            Ok(true) => {}
            Ok(false) => {
                error!("Version {} is not a valid, indexable version", version);
                return Some(self.handle.complete(Some(version), SyncOutcome::InvalidVersion));
            }
            Err(e) => {
                error!("Failed to validate version {}: {}", version, e);
                return Some(self.handle.complete(Some(version), SyncOutcome::StoreError));
            }
        }

        // 物化阶段
        match self.store.ensure_cache(&version).await {
            Ok(true) => {
                info!("Version {} materialized into the cache", version);
                Some(self.handle.complete(Some(version), SyncOutcome::Success))
            }
            Ok(false) => {
                error!("Content store failed to materialize version {}", version);
                Some(self.handle.complete(Some(version), SyncOutcome::MaterializeFailed))
            }
            Err(e) => {
                error!("Content store error while materializing {}: {}", version, e);
                Some(self.handle.complete(Some(version), SyncOutcome::StoreError))
            }
        }
    }
}
