//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 本 crate 唯一的持久化状态是 live 版本指针；这里提供一个小而全的
//! 属性存储：bincode 序列化的类型化读写、删除与落盘 flush。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;

use crate::error::{CorpusSyncError, Result};

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    base_path: PathBuf,
    db: Arc<Db>,
}

impl KvStore {
    /// 创建新的 KV 存储实例
    pub async fn new(base_path: &Path) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| CorpusSyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 打开 sled 数据库（上一个实例可能刚释放锁，重试多次带退避）
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            CorpusSyncError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        Ok(Self { base_path, db: Arc::new(db) })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// 写入类型化的值（bincode 序列化）
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = bincode::serialize(value)?;
        self.db
            .insert(key.as_bytes(), data)
            .map_err(|e| CorpusSyncError::KvStore(format!("写入键 {} 失败: {}", key, e)))?;
        Ok(())
    }

    /// 读取类型化的值；键不存在时返回 None
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let data = self
            .db
            .get(key.as_bytes())
            .map_err(|e| CorpusSyncError::KvStore(format!("读取键 {} 失败: {}", key, e)))?;
        match data {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| CorpusSyncError::KvStore(format!("删除键 {} 失败: {}", key, e)))?;
        Ok(())
    }

    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        self.db
            .contains_key(key.as_bytes())
            .map_err(|e| CorpusSyncError::KvStore(format!("查询键 {} 失败: {}", key, e)))
    }

    /// 强制落盘
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| CorpusSyncError::KvStore(format!("flush 失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::new(temp_dir.path()).await.unwrap();

        let sample = Sample { name: "v1".to_string(), count: 3 };
        kv.set("sample", &sample).await.unwrap();

        let loaded: Option<Sample> = kv.get("sample").await.unwrap();
        assert_eq!(loaded, Some(sample));
        assert!(kv.contains_key("sample").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::new(temp_dir.path()).await.unwrap();

        let loaded: Option<Sample> = kv.get("missing").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let kv = KvStore::new(temp_dir.path()).await.unwrap();

        kv.set("key", &Sample { name: "x".to_string(), count: 1 }).await.unwrap();
        kv.delete("key").await.unwrap();
        assert!(!kv.contains_key("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_value_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let kv = KvStore::new(temp_dir.path()).await.unwrap();
            kv.set("durable", &Sample { name: "y".to_string(), count: 7 }).await.unwrap();
            kv.flush().await.unwrap();
        }

        let kv = KvStore::new(temp_dir.path()).await.unwrap();
        let loaded: Option<Sample> = kv.get("durable").await.unwrap();
        assert_eq!(loaded.unwrap().count, 7);
    }
}
