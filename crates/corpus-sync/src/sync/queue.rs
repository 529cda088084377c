//! 任务队列
//!
//! 并发安全的 FIFO，保存未完成 / 刚完成任务的句柄，最旧的在队头。
//! 它是取消与背压的记账结构，不是调度结构——实际执行顺序由单通道
//! 执行器决定。不变式：队头始终对应完成回调正在处理或即将处理的
//! 那个任务（每次回调都会从队头弹出）。

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::info;

use crate::sync::job::{JobHandle, QueuedJobInfo};

#[derive(Debug, Default)]
pub struct JobQueue {
    inner: Mutex<VecDeque<JobHandle>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }

    pub fn push_back(&self, handle: JobHandle) {
        self.inner.lock().push_back(handle);
    }

    pub fn pop_front(&self) -> Option<JobHandle> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// 队列保洁：移除已进入终态的句柄，返回移除数量
    pub fn prune_settled(&self) -> usize {
        let mut queue = self.inner.lock();
        let before = queue.len();
        queue.retain(|handle| !handle.is_settled());
        before - queue.len()
    }

    /// 取消并移除除最新一个以外的全部排队任务，返回取消数量
    ///
    /// 刚有更新的版本上线时，更早的在途同步请求大概率已经过时。
    /// 尽力而为：正在执行的任务不受影响。
    pub fn cancel_all_but_newest(&self) -> usize {
        let mut cancelled = 0;
        let mut queue = self.inner.lock();
        while queue.len() > 1 {
            if let Some(handle) = queue.pop_front() {
                handle.cancel();
                cancelled += 1;
                info!(
                    "Cancelling pending (old) sync job {} as a newer version just went live. Queue is currently: ({})",
                    handle.id(),
                    queue.len()
                );
            }
        }
        cancelled
    }

    /// 取消并清空全部排队任务（停机用），返回取消数量
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        let mut queue = self.inner.lock();
        while let Some(handle) = queue.pop_front() {
            if handle.cancel() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// 队列内容快照（观测用）
    pub fn snapshot(&self) -> Vec<QueuedJobInfo> {
        self.inner.lock().iter().map(|handle| handle.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{SyncTarget, VersionId};
    use crate::sync::job::{JobState, SyncOutcome};

    fn pinned(id: &str) -> JobHandle {
        JobHandle::new(SyncTarget::Pinned(VersionId::from(id)))
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        let a = pinned("a");
        let b = pinned("b");
        queue.push_back(a.clone());
        queue.push_back(b.clone());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap().id(), a.id());
        assert_eq!(queue.pop_front().unwrap().id(), b.id());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_prune_settled() {
        let queue = JobQueue::new();
        let done = pinned("done");
        done.mark_running();
        done.complete(Some(VersionId::from("done")), SyncOutcome::Success);
        let pending = pinned("pending");

        queue.push_back(done);
        queue.push_back(pending.clone());

        assert_eq!(queue.prune_settled(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front().unwrap().id(), pending.id());
    }

    #[test]
    fn test_cancel_all_but_newest() {
        let queue = JobQueue::new();
        let old1 = pinned("old1");
        let old2 = pinned("old2");
        let newest = pinned("newest");
        queue.push_back(old1.clone());
        queue.push_back(old2.clone());
        queue.push_back(newest.clone());

        assert_eq!(queue.cancel_all_but_newest(), 2);
        assert_eq!(old1.state(), JobState::Cancelled);
        assert_eq!(old2.state(), JobState::Cancelled);
        // 最新的一个保留且未被取消
        assert_eq!(queue.len(), 1);
        assert_eq!(newest.state(), JobState::Queued);
    }

    #[test]
    fn test_cancel_all() {
        let queue = JobQueue::new();
        let a = pinned("a");
        let b = pinned("b");
        queue.push_back(a.clone());
        queue.push_back(b.clone());

        assert_eq!(queue.cancel_all(), 2);
        assert!(queue.is_empty());
        assert_eq!(a.state(), JobState::Cancelled);
        assert_eq!(b.state(), JobState::Cancelled);
    }

    #[test]
    fn test_snapshot() {
        let queue = JobQueue::new();
        queue.push_back(pinned("a"));
        queue.push_back(JobHandle::new(SyncTarget::Latest));

        let infos = queue.snapshot();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].target, SyncTarget::Pinned(VersionId::from("a")));
        assert_eq!(infos[1].target, SyncTarget::Latest);
        assert_eq!(infos[0].state, JobState::Queued);
    }
}
