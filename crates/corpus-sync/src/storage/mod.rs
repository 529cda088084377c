//! 本地持久化
//!
//! 核心唯一的持久化状态是 live 版本指针；底下是一个 sled 属性
//! 存储加一层带重试的指针读写。

pub mod kv;
pub mod live_version;
pub mod retry_policy;

pub use kv::KvStore;
pub use live_version::{LiveVersionRecord, LiveVersionStore, LIVE_VERSION_KEY};
pub use retry_policy::PersistRetryPolicy;
