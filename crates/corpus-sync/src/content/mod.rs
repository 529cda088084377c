//! 内容仓库协作接口
//!
//! 本模块定义同步核心与底层内容仓库之间的契约：
//! - 枚举可用版本、按新旧比较版本
//! - 查询 / 建立 / 清除已物化（缓存）的版本
//!
//! 内容如何解析、存储、检索不在本 crate 范围内，核心只负责编排
//! 对"版本"的访问。

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod memory;

pub use memory::MemoryContentStore;

/// 版本标识符
///
/// 不透明 token（例如 revision hash 或单调 tag），命名内容语料的一个
/// 不可变快照。新旧次序完全由内容仓库的比较器决定，核心从不解析
/// token 的内部结构。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VersionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 同步目标
///
/// `Latest` 是 LATEST 哨兵值（标识符缺省），表示"内容仓库当前认为
/// 最新的版本"；`Pinned` 指定一个具体版本。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncTarget {
    Latest,
    Pinned(VersionId),
}

impl SyncTarget {
    /// 从可选的版本标识符构造目标（None 即 LATEST）
    pub fn from_option(version: Option<VersionId>) -> Self {
        match version {
            Some(v) => SyncTarget::Pinned(v),
            None => SyncTarget::Latest,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Latest => write!(f, "latest"),
            SyncTarget::Pinned(v) => write!(f, "{}", v),
        }
    }
}

/// 内容仓库契约
///
/// 核心消费此 trait；实现方负责版本的实际物化与存储格式。
/// 缓存成员关系（哪些版本已物化）以仓库的汇报为准——核心从不
/// 把任务自报的成功当作缓存成员关系的依据。
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// 枚举全部已知版本，按新旧降序（最新的在最前），与 `compare` 一致
    async fn list_available_versions(&self) -> Result<Vec<VersionId>>;

    /// 按新旧比较两个版本（`Greater` 表示 a 比 b 更新）
    ///
    /// 端点不存在时返回 `VersionNotFound`（例如历史被 force-push 改写）。
    async fn compare(&self, a: &VersionId, b: &VersionId) -> Result<Ordering>;

    /// 判断标识符是否指向一个有效、可索引的版本
    async fn is_valid_version(&self, id: &VersionId) -> Result<bool>;

    /// 内容仓库当前认为最新的版本
    async fn latest_version_id(&self) -> Result<VersionId>;

    /// 当前已物化（缓存）的版本集合
    async fn cached_version_list(&self) -> Result<Vec<VersionId>>;

    /// 物化一个版本；返回是否成功
    async fn ensure_cache(&self, id: &VersionId) -> Result<bool>;

    /// 清除单个已物化版本
    async fn clear_cache(&self, id: &VersionId) -> Result<()>;

    /// 清除全部已物化版本
    async fn clear_all_caches(&self) -> Result<()>;

    /// 索引限制开关的配置透传（核心算法不使用）
    fn set_index_restriction(&self, restricted: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_id_display() {
        let id = VersionId::from("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn test_sync_target_from_option() {
        assert_eq!(SyncTarget::from_option(None), SyncTarget::Latest);
        assert_eq!(
            SyncTarget::from_option(Some(VersionId::from("v1"))),
            SyncTarget::Pinned(VersionId::from("v1"))
        );
        assert_eq!(SyncTarget::Latest.to_string(), "latest");
        assert_eq!(SyncTarget::Pinned(VersionId::from("v1")).to_string(), "v1");
    }
}
