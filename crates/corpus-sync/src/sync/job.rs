//! 同步任务的显式生命周期
//!
//! 每个任务是一个显式状态机（queued → running → 终态），携带取消
//! token 与可等待的完成通道，而不是依赖执行框架不透明的
//! future-cancel 语义。

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::content::{SyncTarget, VersionId};
use crate::error::{CorpusSyncError, Result};

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// 等待执行
    Queued,
    /// 正在执行
    Running,
    /// 执行成功
    Succeeded,
    /// 执行失败
    Failed,
    /// 已取消
    Cancelled,
}

impl JobState {
    /// 是否已进入终态
    pub fn is_settled(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "等待执行"),
            JobState::Running => write!(f, "正在执行"),
            JobState::Succeeded => write!(f, "执行成功"),
            JobState::Failed => write!(f, "执行失败"),
            JobState::Cancelled => write!(f, "已取消"),
        }
    }
}

/// 同步任务结果分类
///
/// 取代裸布尔成功标志，让调用方能区分失败原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// 物化成功
    Success,
    /// 目标不是一个有效、可索引的版本
    InvalidVersion,
    /// 内容仓库物化失败（ensure_cache 返回 false）
    MaterializeFailed,
    /// 任务自报成功但缓存中并不存在该版本
    DishonestSuccess,
    /// 内容仓库调用出错
    StoreError,
    /// 任务在开始前被取消
    Cancelled,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::InvalidVersion => "invalid_version",
            SyncOutcome::MaterializeFailed => "materialize_failed",
            SyncOutcome::DishonestSuccess => "dishonest_success",
            SyncOutcome::StoreError => "store_error",
            SyncOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 任务完成信息（worker 回调控制器时携带）
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub job_id: String,
    /// 已解析的版本（LATEST 解析失败时可能缺省）
    pub version: Option<VersionId>,
    pub outcome: SyncOutcome,
}

/// 队列中任务的观测快照
#[derive(Debug, Clone, Serialize)]
pub struct QueuedJobInfo {
    pub job_id: String,
    pub target: SyncTarget,
    pub state: JobState,
    pub queued_at: u64,
}

#[derive(Debug)]
struct HandleState {
    job_id: String,
    target: SyncTarget,
    queued_at: u64,
    state: RwLock<JobState>,
    cancel_token: CancellationToken,
    completion_tx: watch::Sender<Option<JobCompletion>>,
}

/// 同步任务句柄
///
/// 可克隆；任意数量的持有者都可以等待完成或请求取消。取消是
/// 尽力而为：只能阻止尚未开始的任务，正在执行的任务不会被打断，
/// 其完成回调仍会触发。
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<HandleState>,
}

impl JobHandle {
    pub(crate) fn new(target: SyncTarget) -> Self {
        let (completion_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(HandleState {
                job_id: Uuid::new_v4().to_string(),
                target,
                queued_at: chrono::Utc::now().timestamp_millis() as u64,
                state: RwLock::new(JobState::Queued),
                cancel_token: CancellationToken::new(),
                completion_tx,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.job_id
    }

    pub fn target(&self) -> &SyncTarget {
        &self.inner.target
    }

    pub fn queued_at(&self) -> u64 {
        self.inner.queued_at
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.read()
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// 请求取消；返回是否真的阻止了任务执行
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.write();
        self.inner.cancel_token.cancel();
        if *state == JobState::Queued {
            *state = JobState::Cancelled;
            drop(state);
            let completion = JobCompletion {
                job_id: self.inner.job_id.clone(),
                version: match &self.inner.target {
                    SyncTarget::Pinned(v) => Some(v.clone()),
                    SyncTarget::Latest => None,
                },
                outcome: SyncOutcome::Cancelled,
            };
            let _ = self.inner.completion_tx.send_replace(Some(completion));
            true
        } else {
            false
        }
    }

    /// 等待任务进入终态并返回完成信息
    pub async fn wait(&self) -> Result<JobCompletion> {
        let mut rx = self.inner.completion_tx.subscribe();
        loop {
            if let Some(completion) = rx.borrow_and_update().clone() {
                return Ok(completion);
            }
            rx.changed().await.map_err(|_| {
                CorpusSyncError::Cancelled("任务完成通道已关闭".to_string())
            })?;
        }
    }

    pub fn info(&self) -> QueuedJobInfo {
        QueuedJobInfo {
            job_id: self.inner.job_id.clone(),
            target: self.inner.target.clone(),
            state: self.state(),
            queued_at: self.inner.queued_at,
        }
    }

    /// 尝试进入运行态；任务已被取消时返回 false
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = self.inner.state.write();
        if *state == JobState::Queued {
            *state = JobState::Running;
            true
        } else {
            false
        }
    }

    /// 写入终态并广播完成信息（worker 专用，恰好调用一次）
    pub(crate) fn complete(&self, version: Option<VersionId>, outcome: SyncOutcome) -> JobCompletion {
        {
            let mut state = self.inner.state.write();
            *state = match outcome {
                SyncOutcome::Success => JobState::Succeeded,
                SyncOutcome::Cancelled => JobState::Cancelled,
                _ => JobState::Failed,
            };
        }
        let completion = JobCompletion {
            job_id: self.inner.job_id.clone(),
            version,
            outcome,
        };
        let _ = self.inner.completion_tx.send_replace(Some(completion.clone()));
        completion
    }

    /// 取消是否已被请求（对正在执行的任务，请求不会生效，只是记录）
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_lifecycle() {
        let handle = JobHandle::new(SyncTarget::Pinned(VersionId::from("v1")));
        assert_eq!(handle.state(), JobState::Queued);
        assert!(!handle.is_settled());

        assert!(handle.mark_running());
        assert_eq!(handle.state(), JobState::Running);

        handle.complete(Some(VersionId::from("v1")), SyncOutcome::Success);
        assert_eq!(handle.state(), JobState::Succeeded);
        assert!(handle.is_settled());

        let completion = handle.wait().await.unwrap();
        assert_eq!(completion.version, Some(VersionId::from("v1")));
        assert!(completion.outcome.is_success());
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let handle = JobHandle::new(SyncTarget::Latest);
        assert!(handle.cancel());
        assert_eq!(handle.state(), JobState::Cancelled);
        // 已取消的任务不能再进入运行态
        assert!(!handle.mark_running());

        let completion = handle.wait().await.unwrap();
        assert_eq!(completion.outcome, SyncOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_running_job_has_no_effect() {
        let handle = JobHandle::new(SyncTarget::Pinned(VersionId::from("v2")));
        assert!(handle.mark_running());
        // 正在执行的任务不会被打断
        assert!(!handle.cancel());
        assert_eq!(handle.state(), JobState::Running);
        assert!(handle.is_cancel_requested());
    }

    #[tokio::test]
    async fn test_wait_from_multiple_holders() {
        let handle = JobHandle::new(SyncTarget::Pinned(VersionId::from("v3")));
        let h2 = handle.clone();
        let waiter = tokio::spawn(async move { h2.wait().await.unwrap() });

        handle.mark_running();
        handle.complete(Some(VersionId::from("v3")), SyncOutcome::MaterializeFailed);

        let completion = waiter.await.unwrap();
        assert_eq!(completion.outcome, SyncOutcome::MaterializeFailed);
        assert_eq!(handle.state(), JobState::Failed);
    }
}
