use std::fmt;

use crate::sync::job::SyncOutcome;

#[derive(Debug)]
pub enum CorpusSyncError {
    KvStore(String),
    Serialization(String),
    IO(String),
    /// 内容仓库（content store）调用失败
    Store(String),
    /// 版本不存在（比较器找不到端点时会返回此错误，例如 rebase 之后）
    VersionNotFound(String),
    NotInitialized(String),
    ShuttingDown(String),
    Timeout(String),
    /// 同步任务以非成功状态结束
    JobFailed { outcome: SyncOutcome },
    Cancelled(String),
    Config(String),
    InvalidArgument(String),
    Other(String),
}

impl fmt::Display for CorpusSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusSyncError::KvStore(e) => write!(f, "KV store error: {}", e),
            CorpusSyncError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CorpusSyncError::IO(e) => write!(f, "IO error: {}", e),
            CorpusSyncError::Store(e) => write!(f, "Content store error: {}", e),
            CorpusSyncError::VersionNotFound(e) => write!(f, "Version not found: {}", e),
            CorpusSyncError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            CorpusSyncError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            CorpusSyncError::Timeout(e) => write!(f, "Timeout: {}", e),
            CorpusSyncError::JobFailed { outcome } => {
                write!(f, "Sync job failed: {}", outcome.as_str())
            }
            CorpusSyncError::Cancelled(e) => write!(f, "Cancelled: {}", e),
            CorpusSyncError::Config(e) => write!(f, "Config error: {}", e),
            CorpusSyncError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            CorpusSyncError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for CorpusSyncError {}

impl From<std::io::Error> for CorpusSyncError {
    fn from(error: std::io::Error) -> Self {
        CorpusSyncError::IO(error.to_string())
    }
}

impl From<serde_json::Error> for CorpusSyncError {
    fn from(error: serde_json::Error) -> Self {
        CorpusSyncError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for CorpusSyncError {
    fn from(error: bincode::Error) -> Self {
        CorpusSyncError::Serialization(error.to_string())
    }
}

impl CorpusSyncError {
    /// 判断是否是任务失败错误
    pub fn is_job_failure(&self) -> bool {
        matches!(self, CorpusSyncError::JobFailed { .. })
    }

    /// 获取任务失败结果（如果这是一个任务失败错误）
    pub fn job_outcome(&self) -> Option<SyncOutcome> {
        match self {
            CorpusSyncError::JobFailed { outcome } => Some(*outcome),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CorpusSyncError>;
