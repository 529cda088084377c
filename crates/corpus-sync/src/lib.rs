//! corpus-sync - 内容版本同步与缓存生命周期管理
//!
//! 决定向用户发布内容语料的哪个不可变"版本"，异步地把新版本物化
//! （索引）成可查询的缓存，并在大小上限内淘汰陈旧版本：
//! - 🔁 单通道任务流水线：任意时刻至多一个物化操作在途
//! - 🔒 升级协议：live 指针只会前进，永不回退
//! - 🕵️ 防御性复核：任务自报成功不可信，以缓存成员关系为准
//! - 🗑️ 缓存淘汰：绝不移除正在使用或刚索引的版本
//! - 💾 持久化指针：live 版本落盘，重启后恢复
//! - ⚙️ 事件系统：升级 / 索引 / 淘汰 / 失败的统一广播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use corpus_sync::{CorpusSyncConfig, MemoryContentStore, VersionController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 内容仓库协作方（生产环境换成真实实现）
//!     let store = Arc::new(MemoryContentStore::new());
//!     store.register_version("v1");
//!
//!     // 配置控制器
//!     let config = CorpusSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .max_cached_versions(3)
//!         .follow_latest(true)
//!         .build();
//!
//!     let controller = VersionController::new(config, store).await?;
//!     controller.on_start().await?;
//!
//!     // 触发一次 LATEST 同步并等待完成
//!     let handle = controller.trigger_sync_job(None).await?;
//!     handle.wait().await?;
//!     println!("live version = {}", controller.get_live_version()?);
//!
//!     controller.on_shutdown().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod storage;
pub mod sync;
pub mod version;

// 重新导出核心类型，方便使用
pub use config::{CorpusSyncConfig, CorpusSyncConfigBuilder};
pub use content::{ContentStore, MemoryContentStore, SyncTarget, VersionId};
pub use error::{CorpusSyncError, Result};
pub use events::{EventManager, EventStats, SyncEvent};
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use storage::{KvStore, LiveVersionRecord, LiveVersionStore, PersistRetryPolicy};
pub use sync::{
    JobCompletion, JobHandle, JobState, PromotionReport, QueuedJobInfo, SyncMetrics, SyncOutcome,
    VersionController,
};
