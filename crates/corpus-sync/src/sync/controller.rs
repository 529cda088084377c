//! 版本控制器
//!
//! 负责与内容仓库对话并跟踪应当对用户发布哪个版本：
//! - 持有 live 版本指针（含持久化读写）
//! - 维护同步任务队列，把 worker 提交到单通道执行器
//! - 接收完成回调，决定是否升级 live 指针
//! - 按大小上限淘汰缓存中的陈旧版本
//!
//! 升级协议的核心约束：live 指针永不回退（只有严格更新的版本才会
//! 替换它），并且任何升级 / 保护决策都以内容仓库汇报的缓存成员
//! 关系为准，而不是任务的自报结果。

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use crate::config::CorpusSyncConfig;
use crate::content::{ContentStore, SyncTarget, VersionId};
use crate::error::{CorpusSyncError, Result};
use crate::events::{EventManager, SyncEvent};
use crate::lifecycle::LifecycleHook;
use crate::storage::kv::KvStore;
use crate::storage::live_version::LiveVersionStore;
use crate::sync::job::{JobCompletion, JobHandle, QueuedJobInfo, SyncOutcome};
use crate::sync::queue::JobQueue;
use crate::sync::worker::SyncWorker;

/// 同步统计信息
#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub jobs_triggered_total: u64,
    pub jobs_succeeded_total: u64,
    pub jobs_failed_total: u64,
    pub jobs_cancelled_total: u64,
    pub dishonest_success_total: u64,
    pub promotions_total: u64,
    pub evictions_total: u64,
}

impl SyncMetrics {
    pub fn success_rate(&self) -> f64 {
        let finished = self.jobs_succeeded_total + self.jobs_failed_total;
        if finished == 0 {
            0.0
        } else {
            self.jobs_succeeded_total as f64 / finished as f64
        }
    }
}

/// 升级操作的结果报告
///
/// `persisted` 为 false 表示指针已在内存中更新、但落盘重试耗尽仍
/// 失败——持久态与内存态出现分歧，控制器会在下次启动 / 停机时
/// 尝试调和。
#[derive(Debug, Clone)]
pub struct PromotionReport {
    pub version: VersionId,
    pub persisted: bool,
}

struct ControllerState {
    config: CorpusSyncConfig,
    store: Arc<dyn ContentStore>,
    /// live 版本指针；读是线性化的，写必须持有 promotion_lock
    live_version: RwLock<Option<VersionId>>,
    /// 读-比较-写序列的互斥：回调升级与管理员升级共用同一把锁
    promotion_lock: AsyncMutex<()>,
    /// 完成回调串行化（单通道已经保证，这里是显式契约）
    callback_lock: AsyncMutex<()>,
    queue: JobQueue,
    /// 单通道执行器的提交端；停机后置空拒绝新任务
    lane_tx: RwLock<Option<mpsc::UnboundedSender<SyncWorker>>>,
    live_store: LiveVersionStore,
    events: EventManager,
    metrics: tokio::sync::RwLock<SyncMetrics>,
    /// 指针有未落盘的值
    pointer_dirty: AtomicBool,
}

/// 版本控制器
///
/// 可克隆（内部共享状态）。通常一个进程只需要一个。
#[derive(Clone)]
pub struct VersionController {
    state: Arc<ControllerState>,
}

impl VersionController {
    /// 创建版本控制器并启动单通道执行器
    pub async fn new(config: CorpusSyncConfig, store: Arc<dyn ContentStore>) -> Result<Self> {
        config.validate()?;

        let kv = Arc::new(KvStore::new(&config.data_dir).await?);
        let live_store = LiveVersionStore::new(kv, config.persist_retry.clone());
        let events = EventManager::new(config.event_capacity);
        let (lane_tx, lane_rx) = mpsc::unbounded_channel();

        let state = Arc::new(ControllerState {
            config,
            store,
            live_version: RwLock::new(None),
            promotion_lock: AsyncMutex::new(()),
            callback_lock: AsyncMutex::new(()),
            queue: JobQueue::new(),
            lane_tx: RwLock::new(Some(lane_tx)),
            live_store,
            events,
            metrics: tokio::sync::RwLock::new(SyncMetrics::default()),
            pointer_dirty: AtomicBool::new(false),
        });

        Self::spawn_lane(Arc::downgrade(&state), lane_rx);

        Ok(Self { state })
    }

    /// 单通道执行器：逐个运行 worker，任意时刻至多一个物化操作在途
    fn spawn_lane(state: Weak<ControllerState>, mut lane_rx: mpsc::UnboundedReceiver<SyncWorker>) {
        tokio::spawn(async move {
            debug!("Single-lane sync executor started");
            while let Some(worker) = lane_rx.recv().await {
                // 开始前已被取消的任务直接跳过（不进入回调）
                let Some(completion) = worker.run().await else {
                    continue;
                };
                match state.upgrade() {
                    Some(state) => state.sync_job_complete_callback(completion).await,
                    None => break,
                }
            }
            debug!("Single-lane sync executor stopped");
        });
    }

    /// 触发一个同步任务，立即返回其句柄（非阻塞）
    ///
    /// `None` 表示 LATEST（内容仓库当前认为最新的版本）。任务按提交
    /// 顺序在单通道上执行；句柄可用于等待或尽力取消。
    pub async fn trigger_sync_job(&self, version: Option<VersionId>) -> Result<JobHandle> {
        let target = SyncTarget::from_option(version);

        let (handle, queue_size) = {
            let lane = self.state.lane_tx.read();
            let sender = lane.as_ref().ok_or_else(|| {
                CorpusSyncError::ShuttingDown("controller is shutting down, rejecting new sync jobs".to_string())
            })?;

            let handle = JobHandle::new(target.clone());
            // 入队与提交在同一把锁内完成：队列顺序与执行顺序一致
            self.state.queue.push_back(handle.clone());
            let worker = SyncWorker::new(self.state.store.clone(), handle.clone());
            if sender.send(worker).is_err() {
                handle.cancel();
                self.state.queue.prune_settled();
                return Err(CorpusSyncError::ShuttingDown(
                    "sync executor is no longer running".to_string(),
                ));
            }
            (handle, self.state.queue.len())
        };

        info!("Adding sync job for version {} to the queue ({})", target, queue_size);
        self.state.metrics.write().await.jobs_triggered_total += 1;
        self.state
            .events
            .emit(SyncEvent::JobQueued {
                job_id: handle.id().to_string(),
                target,
                queue_size,
                timestamp: chrono::Utc::now().timestamp_millis() as u64,
            })
            .await;

        Ok(handle)
    }

    /// 管理员驱动的同步升级，与 follow-latest 模式无关
    ///
    /// 目标版本尚未缓存时会触发同步任务并阻塞等待（受
    /// `sync_wait_timeout` 约束）。任务失败或谎报成功都不会改动
    /// 指针，也不会产生持久化写入。
    pub async fn set_live_version(&self, version: VersionId) -> Result<PromotionReport> {
        let cached = self.state.store.cached_version_list().await?;
        if !cached.contains(&version) {
            warn!("New version hasn't been synced yet. Requesting sync job.");

            let handle = self.trigger_sync_job(Some(version.clone())).await?;
            let completion = match self.state.config.sync_wait_timeout() {
                Some(limit) => tokio::time::timeout(limit, handle.wait()).await.map_err(|_| {
                    CorpusSyncError::Timeout(format!(
                        "sync job for {} did not finish within {:?}",
                        version, limit
                    ))
                })??,
                None => handle.wait().await?,
            };

            if !completion.outcome.is_success() {
                error!("Unable to complete sync job for {}: {}", version, completion.outcome);
                return Err(CorpusSyncError::JobFailed { outcome: completion.outcome });
            }

            // 升级路径同样不信任自报成功
            let cached_now = self.state.store.cached_version_list().await?;
            if !cached_now.contains(&version) {
                error!(
                    "Sync job for {} reported success but the version is not cached, refusing to promote.",
                    version
                );
                return Err(CorpusSyncError::JobFailed { outcome: SyncOutcome::DishonestSuccess });
            }
        }

        let _promotion = self.state.promotion_lock.lock().await;
        let persisted = self.state.promote_locked(version.clone()).await;
        Ok(PromotionReport { version, persisted })
    }

    /// 当前 live 版本（线性化读）
    pub fn get_live_version(&self) -> Result<VersionId> {
        self.state.live_version.read().clone().ok_or_else(|| {
            CorpusSyncError::NotInitialized("live version has not been initialized yet".to_string())
        })
    }

    /// 检查指定版本当前是否在使用中
    ///
    /// 目前等价于"是否为 live 版本"；保留为扩展点，将来可能覆盖
    /// A/B 测试等多版本在用的策略。
    pub fn is_version_in_use(&self, version: &VersionId) -> bool {
        self.state.is_version_in_use(version)
    }

    /// 队列中任务的观测快照
    pub fn queued_jobs(&self) -> Vec<QueuedJobInfo> {
        self.state.queue.snapshot()
    }

    /// 指示内容仓库清空全部已物化版本
    pub async fn clear_all_caches(&self) -> Result<()> {
        info!("Clearing all cached versions.");
        self.state.store.clear_all_caches().await
    }

    /// 索引限制开关的配置透传
    pub fn set_index_restriction(&self, restricted: bool) {
        self.state.store.set_index_restriction(restricted);
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.state.metrics.read().await.clone()
    }

    /// 订阅同步事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.state.events.subscribe()
    }

    /// 启动：按配置清缓存，读回持久化的 live 版本指针
    pub async fn on_start(&self) -> Result<()> {
        self.state.start().await
    }

    /// 停机：拒绝新任务、取消排队任务、不等待在途任务、清空缓存
    pub async fn on_shutdown(&self) -> Result<()> {
        self.state.shutdown().await
    }
}

#[async_trait]
impl LifecycleHook for VersionController {
    async fn on_start(&self) -> Result<()> {
        self.state.start().await
    }

    async fn on_shutdown(&self) -> Result<()> {
        self.state.shutdown().await
    }
}

impl ControllerState {
    fn is_version_in_use(&self, version: &VersionId) -> bool {
        self.live_version.read().as_ref() == Some(version)
    }

    /// 同步任务完成回调
    ///
    /// 由单通道执行器在每个任务结束后调用；即使将来有多个调用方，
    /// callback_lock 也保证同一时刻只有一次回调在处理。
    async fn sync_job_complete_callback(&self, completion: JobCompletion) {
        let _serial = self.callback_lock.lock().await;

        // 1. 这个任务即将处理完毕，从队头移除
        if let Some(head) = self.queue.pop_front() {
            if head.id() != completion.job_id {
                warn!(
                    "Job queue head {} does not match completed job {}; queue bookkeeping is off",
                    head.id(),
                    completion.job_id
                );
            }
        }

        let timestamp = chrono::Utc::now().timestamp_millis() as u64;

        // 2. 失败任务：记录后放弃，不升级也不淘汰
        if !completion.outcome.is_success() {
            error!(
                "Sync worker reported a failure to synchronise {} ({}). Giving up...",
                completion.version.as_ref().map(|v| v.as_str()).unwrap_or("<unresolved>"),
                completion.outcome
            );
            {
                let mut metrics = self.metrics.write().await;
                metrics.jobs_failed_total += 1;
                if completion.outcome == SyncOutcome::Cancelled {
                    metrics.jobs_cancelled_total += 1;
                }
            }
            self.events
                .emit(SyncEvent::SyncFailed {
                    job_id: completion.job_id,
                    version: completion.version,
                    outcome: completion.outcome,
                    timestamp,
                })
                .await;
            return;
        }

        let Some(version) = completion.version.clone() else {
            error!("Sync worker reported success without a resolved version, ignoring");
            return;
        };

        // 3. 防御性复核：自报成功不可信，以缓存成员关系为准
        match self.store.cached_version_list().await {
            Ok(cached) if !cached.contains(&version) => {
                error!(
                    "Sync job informed version controller that a version was ready and it lied. \
                     The version is no longer cached. Terminating sync job."
                );
                {
                    let mut metrics = self.metrics.write().await;
                    metrics.jobs_failed_total += 1;
                    metrics.dishonest_success_total += 1;
                }
                self.events
                    .emit(SyncEvent::SyncFailed {
                        job_id: completion.job_id,
                        version: Some(version),
                        outcome: SyncOutcome::DishonestSuccess,
                        timestamp,
                    })
                    .await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to re-validate cached versions after sync of {}: {}", version, e);
                self.metrics.write().await.jobs_failed_total += 1;
                self.events
                    .emit(SyncEvent::SyncFailed {
                        job_id: completion.job_id,
                        version: Some(version),
                        outcome: SyncOutcome::StoreError,
                        timestamp,
                    })
                    .await;
                return;
            }
        }

        // 4. follow-latest 模式下决定是否升级
        if self.config.follow_latest {
            {
                let _promotion = self.promotion_lock.lock().await;
                let current = self.live_version.read().clone();
                let newer = match &current {
                    None => true,
                    Some(live) => match self.store.compare(&version, live).await {
                        Ok(Ordering::Greater) => true,
                        Ok(_) => false,
                        Err(CorpusSyncError::VersionNotFound(_)) => {
                            // 当前 live 版本找不到了，多半有人 rebase 后 force-push
                            info!(
                                "Failed to find current live version, someone probably rebased and force-pushed. Tut tut."
                            );
                            true
                        }
                        Err(e) => {
                            error!("Failed to compare {} against the live version: {}", version, e);
                            false
                        }
                    },
                };

                if newer {
                    self.promote_locked(version.clone()).await;
                } else {
                    info!(
                        "Not changing live version as part of sync job as the version ({}) just indexed \
                         is older than (or the same as) the current one ({}).",
                        version,
                        current.as_ref().map(|v| v.as_str()).unwrap_or("<none>")
                    );
                }
            }

            // 刚有版本上线，更早的在途同步请求大概率已经过时
            let cancelled = self.queue.cancel_all_but_newest();
            if cancelled > 0 {
                self.metrics.write().await.jobs_cancelled_total += cancelled as u64;
            }
        } else {
            info!(
                "New content version {} indexed and available. Not changing live version until told to do so.",
                version
            );
        }

        self.metrics.write().await.jobs_succeeded_total += 1;
        self.events
            .emit(SyncEvent::VersionIndexed { version: version.clone(), timestamp })
            .await;

        // 6. 成功之后总是运行缓存清理，刚索引的版本受保护
        if let Err(e) = self.cleanup_cache(&version).await {
            error!("Cache cleanup after indexing {} failed: {}", version, e);
        }

        debug!("Sync job completed - callback received and finished.");
    }

    /// 升级 live 指针；调用方必须已持有 promotion_lock
    ///
    /// 返回指针是否成功落盘。落盘重试耗尽时仍更新内存指针（持久态
    /// 与内存态的分歧被显式记账，启动 / 停机时调和）。
    async fn promote_locked(&self, new_version: VersionId) -> bool {
        let old = self.live_version.read().clone();
        info!(
            "Changing live version from {} to {}",
            old.as_ref().map(|v| v.as_str()).unwrap_or("<none>"),
            new_version
        );

        let persisted = self.live_store.save_with_retry(&new_version).await;
        self.pointer_dirty.store(!persisted, AtomicOrdering::SeqCst);

        *self.live_version.write() = Some(new_version.clone());

        self.metrics.write().await.promotions_total += 1;
        self.events
            .emit(SyncEvent::VersionPromoted {
                old_version: old,
                new_version,
                persisted,
                timestamp: chrono::Utc::now().timestamp_millis() as u64,
            })
            .await;

        persisted
    }

    /// 按配置维护内容仓库的缓存规模
    async fn cleanup_cache(&self, just_indexed: &VersionId) -> Result<()> {
        // 队列保洁
        let pruned = self.queue.prune_settled();
        if pruned > 0 {
            debug!("Pruned {} settled sync jobs from the queue", pruned);
        }
        info!("Sync job queue currently of size ({})", self.queue.len());

        let max_cache_size = self.config.max_cached_versions;
        let cached = self.store.cached_version_list().await?;
        if cached.len() <= max_cache_size {
            info!("Not evicting cache as we have enough space: current cache size is {}.", cached.len());
            return Ok(());
        }

        info!("Cache is too full ({}) finding and deleting old versions", cached.len());

        // 全量版本列表最新在前；倒着走就是从最旧的候选开始淘汰
        let all_versions = self.store.list_available_versions().await?;
        for candidate in all_versions.iter().rev() {
            let cached_now = self.store.cached_version_list().await?;
            if cached_now.len() <= max_cache_size {
                info!("Cache clear complete");
                break;
            }
            if !cached_now.contains(candidate) {
                continue;
            }
            // 绝不淘汰正在使用的版本和刚索引的版本
            if self.is_version_in_use(candidate) || candidate == just_indexed {
                continue;
            }

            info!("Requesting to delete the content at version {} from the cache.", candidate);
            self.store.clear_cache(candidate).await?;
            self.metrics.write().await.evictions_total += 1;
            self.events
                .emit(SyncEvent::VersionEvicted {
                    version: candidate.clone(),
                    timestamp: chrono::Utc::now().timestamp_millis() as u64,
                })
                .await;
        }

        let remaining = self.store.cached_version_list().await?;
        if remaining.len() > max_cache_size {
            warn!(
                "Warning unable to reduce cache to target size: current cache size is {}",
                remaining.len()
            );
            self.events
                .emit(SyncEvent::CacheOverBudget {
                    cache_size: remaining.len(),
                    max_cached_versions: max_cache_size,
                    timestamp: chrono::Utc::now().timestamp_millis() as u64,
                })
                .await;
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if self.config.clear_cache_on_start {
            info!("Clearing all caches on startup (config-driven).");
            self.store.clear_all_caches().await?;
        }

        let durable = self.live_store.load().await?;
        let initial = durable
            .as_ref()
            .map(|record| record.version.clone())
            .or_else(|| self.config.initial_live_version.clone());

        match initial {
            Some(version) => {
                info!("Setting live version of the site from persisted store to {}", version);
                *self.live_version.write() = Some(version.clone());

                // 持久记录缺失或与生效值不一致时补写（调和分歧）
                let durable_matches =
                    durable.as_ref().map(|record| record.version == version).unwrap_or(false);
                if !durable_matches {
                    let persisted = self.live_store.save_with_retry(&version).await;
                    self.pointer_dirty.store(!persisted, AtomicOrdering::SeqCst);
                }
            }
            None => {
                warn!("No initial live version available; waiting for the first promotion.");
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Informed of imminent shutdown; no longer accepting sync jobs.");

        // 关闭执行通道：新任务被拒绝，在途任务继续但不等待
        *self.lane_tx.write() = None;

        let cancelled = self.queue.cancel_all();
        if cancelled > 0 {
            info!("Cancelled {} queued sync jobs during shutdown", cancelled);
            self.metrics.write().await.jobs_cancelled_total += cancelled as u64;
        }

        // 指针有未落盘的值，停机前再补一次
        if self.pointer_dirty.load(AtomicOrdering::SeqCst) {
            let current = self.live_version.read().clone();
            if let Some(version) = current {
                if self.live_store.save_with_retry(&version).await {
                    self.pointer_dirty.store(false, AtomicOrdering::SeqCst);
                }
            }
        }

        self.store.clear_all_caches().await?;
        Ok(())
    }
}
