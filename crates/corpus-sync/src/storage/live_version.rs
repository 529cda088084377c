//! live 版本指针的持久化
//!
//! 指针是本核心拥有的唯一持久化状态：一条固定键下的记录，进程
//! 重启后由控制器在启动阶段读回。写入失败按 `PersistRetryPolicy`
//! 有界重试。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::content::VersionId;
use crate::error::Result;
use crate::storage::kv::KvStore;
use crate::storage::retry_policy::PersistRetryPolicy;

/// live 版本指针的存储键
pub const LIVE_VERSION_KEY: &str = "sync:live_version";

/// 持久化的指针记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveVersionRecord {
    pub version: VersionId,
    /// 最近一次写入的时间戳（毫秒）
    pub updated_at: u64,
}

#[derive(Debug)]
pub struct LiveVersionStore {
    kv: Arc<KvStore>,
    retry: PersistRetryPolicy,
}

impl LiveVersionStore {
    pub fn new(kv: Arc<KvStore>, retry: PersistRetryPolicy) -> Self {
        Self { kv, retry }
    }

    /// 读取持久化的指针记录
    pub async fn load(&self) -> Result<Option<LiveVersionRecord>> {
        self.kv.get(LIVE_VERSION_KEY).await
    }

    /// 写入指针并落盘
    pub async fn save(&self, version: &VersionId) -> Result<()> {
        let record = LiveVersionRecord {
            version: version.clone(),
            updated_at: chrono::Utc::now().timestamp_millis() as u64,
        };
        self.kv.set(LIVE_VERSION_KEY, &record).await?;
        self.kv.flush().await
    }

    /// 带退避重试的写入；返回最终是否写入成功
    ///
    /// 重试耗尽后只记日志不报错——内存指针仍会更新，未落盘状态由
    /// 控制器记账并在下次启动 / 停机时调和。
    pub async fn save_with_retry(&self, version: &VersionId) -> bool {
        let mut attempt = 0u32;
        loop {
            match self.save(version).await {
                Ok(()) => return true,
                Err(e) => {
                    if !self.retry.should_retry(attempt) {
                        error!("Unable to save new live version {} to durable storage: {}", version, e);
                        return false;
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Saving live version {} failed (attempt {}): {}; retrying in {:?}",
                        version, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
