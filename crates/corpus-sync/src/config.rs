//! 控制器配置

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::content::VersionId;
use crate::error::{CorpusSyncError, Result};
use crate::storage::retry_policy::PersistRetryPolicy;

/// 版本控制器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSyncConfig {
    /// 本地数据目录（live 版本指针等持久化状态）
    pub data_dir: PathBuf,
    /// 缓存中最多保留的物化版本数
    pub max_cached_versions: usize,
    /// follow-latest（自动升级）模式：新索引的更新版本自动成为 live
    pub follow_latest: bool,
    /// 启动时是否清空全部缓存
    pub clear_cache_on_start: bool,
    /// 持久化指针缺失时的初始 live 版本
    pub initial_live_version: Option<VersionId>,
    /// set_live_version 阻塞等待同步任务的上限（秒）；None 表示无限等待
    pub sync_wait_timeout_secs: Option<u64>,
    /// 指针落盘失败的重试策略
    pub persist_retry: PersistRetryPolicy,
    /// 事件广播通道容量
    pub event_capacity: usize,
}

impl Default for CorpusSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./corpus-sync-data"),
            max_cached_versions: 3,
            follow_latest: false,
            clear_cache_on_start: false,
            initial_live_version: None,
            sync_wait_timeout_secs: Some(600),
            persist_retry: PersistRetryPolicy::default(),
            event_capacity: 100,
        }
    }
}

impl CorpusSyncConfig {
    pub fn builder() -> CorpusSyncConfigBuilder {
        CorpusSyncConfigBuilder::default()
    }

    pub fn sync_wait_timeout(&self) -> Option<Duration> {
        self.sync_wait_timeout_secs.map(Duration::from_secs)
    }

    /// 配置合法性检查
    pub fn validate(&self) -> Result<()> {
        if self.max_cached_versions == 0 {
            return Err(CorpusSyncError::Config(
                "max_cached_versions 必须至少为 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(CorpusSyncError::Config("event_capacity 必须至少为 1".to_string()));
        }
        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct CorpusSyncConfigBuilder {
    config: CorpusSyncConfig,
}

impl CorpusSyncConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn max_cached_versions(mut self, max: usize) -> Self {
        self.config.max_cached_versions = max;
        self
    }

    pub fn follow_latest(mut self, follow: bool) -> Self {
        self.config.follow_latest = follow;
        self
    }

    pub fn clear_cache_on_start(mut self, clear: bool) -> Self {
        self.config.clear_cache_on_start = clear;
        self
    }

    pub fn initial_live_version(mut self, version: impl Into<VersionId>) -> Self {
        self.config.initial_live_version = Some(version.into());
        self
    }

    pub fn sync_wait_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.sync_wait_timeout_secs = secs;
        self
    }

    pub fn persist_retry(mut self, policy: PersistRetryPolicy) -> Self {
        self.config.persist_retry = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> CorpusSyncConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CorpusSyncConfig::default();
        assert_eq!(config.max_cached_versions, 3);
        assert!(!config.follow_latest);
        assert!(!config.clear_cache_on_start);
        assert!(config.initial_live_version.is_none());
        assert_eq!(config.sync_wait_timeout(), Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CorpusSyncConfig::builder()
            .data_dir("/tmp/corpus")
            .max_cached_versions(5)
            .follow_latest(true)
            .initial_live_version("v1")
            .sync_wait_timeout_secs(None)
            .build();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/corpus"));
        assert_eq!(config.max_cached_versions, 5);
        assert!(config.follow_latest);
        assert_eq!(config.initial_live_version, Some(VersionId::from("v1")));
        assert_eq!(config.sync_wait_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_zero_cache() {
        let config = CorpusSyncConfig { max_cached_versions: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(CorpusSyncError::Config(_))));
    }
}
