//! 版本同步演示
//!
//! 演示完整流程：触发同步 → 自动升级 → 缓存淘汰 → 管理员指定版本。
//!
//! 运行方式：
//! ```bash
//! cargo run --example version_sync_demo
//! ```

use std::sync::Arc;

use corpus_sync::{ContentStore, CorpusSyncConfig, MemoryContentStore, SyncEvent, VersionController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("🚀 corpus-sync 版本同步演示\n");

    // 1. 准备内容仓库：四个版本，v1 最旧
    let store = Arc::new(MemoryContentStore::new());
    store.register_versions(["v1", "v2", "v3", "v4"]);

    let data_dir = tempfile::tempdir()?;
    let config = CorpusSyncConfig::builder()
        .data_dir(data_dir.path())
        .max_cached_versions(2)
        .follow_latest(true)
        .build();

    let controller = VersionController::new(config, store.clone()).await?;
    controller.on_start().await?;

    // 2. 订阅事件
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::VersionPromoted { old_version, new_version, .. } => {
                    println!(
                        "📌 live 版本: {} -> {}",
                        old_version.map(|v| v.to_string()).unwrap_or_else(|| "<none>".into()),
                        new_version
                    );
                }
                SyncEvent::VersionEvicted { version, .. } => {
                    println!("🗑️  淘汰缓存版本: {}", version);
                }
                _ => {}
            }
        }
    });

    // 3. 依次同步 v1..v4：follow-latest 模式下 live 指针一路前进，
    //    缓存上限为 2，旧版本会被淘汰
    for id in ["v1", "v2", "v3"] {
        let handle = controller.trigger_sync_job(Some(id.into())).await?;
        let completion = handle.wait().await?;
        println!("✅ 同步完成: {:?} ({})", completion.version, completion.outcome);
    }

    // LATEST 哨兵：解析到 v4
    let handle = controller.trigger_sync_job(None).await?;
    let completion = handle.wait().await?;
    println!("✅ LATEST 解析并同步: {:?}", completion.version);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    println!("\n当前 live 版本: {}", controller.get_live_version()?);
    println!("当前缓存: {:?}", store.cached_version_list().await?);

    // 4. 管理员手动回退到 v2（会重新物化并阻塞等待）
    let report = controller.set_live_version("v2".into()).await?;
    println!("\n管理员指定 live 版本: {} (persisted={})", report.version, report.persisted);
    println!("此时 v2 是否在用: {}", controller.is_version_in_use(&"v2".into()));

    let metrics = controller.metrics().await;
    println!(
        "\n📊 统计: triggered={} succeeded={} promotions={} evictions={}",
        metrics.jobs_triggered_total,
        metrics.jobs_succeeded_total,
        metrics.promotions_total,
        metrics.evictions_total
    );

    controller.on_shutdown().await?;
    println!("\n👋 演示结束");
    Ok(())
}
