use std::sync::Arc;
use std::time::Duration;

use d_backup::group_into_chains;
use d_backup::Coordinator;
use d_backup::InMemoryKv;

use crate::commons::backup_config;
use crate::commons::enable_logger;
use crate::commons::local_store;
use crate::commons::wait_until;

fn chain_dirs(path: &std::path::Path) -> usize {
    std::fs::read_dir(path.join("v2"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gc_retains_newest_chains_on_disk() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = backup_config(dir.path(), Duration::from_secs(60), 2);
    let store = local_store(&config).await;
    let kv = Arc::new(InMemoryKv::new());

    // Not started yet: build five chains without the collector running
    let coordinator = Coordinator::new(config, kv.clone(), store.clone()).unwrap();
    let mut fulls = Vec::new();
    for i in 0..5 {
        kv.put(format!("k{i}"), "v");
        fulls.push(coordinator.trigger_full_snapshot(false).await.unwrap());
        kv.put(format!("d{i}"), "v");
        coordinator.trigger_delta_snapshot().await.unwrap().unwrap();
    }
    assert_eq!(chain_dirs(dir.path()), 5);

    coordinator.start(false).unwrap();
    assert!(wait_until(Duration::from_secs(5), || chain_dirs(dir.path()) == 2).await);

    let set = group_into_chains(&store.list().await.unwrap());
    assert!(set.orphans.is_empty());
    let kept: Vec<_> = set.chains.iter().map(|c| c.full.clone()).collect();
    assert_eq!(kept, fulls[3..].to_vec());
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_final_snapshot_outlives_one_cycle() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = backup_config(dir.path(), Duration::from_secs(60), 1);
    let store = local_store(&config).await;
    let kv = Arc::new(InMemoryKv::new());
    kv.put("a", "1");

    let coordinator = Coordinator::new(config, kv.clone(), store.clone()).unwrap();
    let last_words = coordinator.trigger_full_snapshot(true).await.unwrap();
    let newer = coordinator.trigger_full_snapshot(false).await.unwrap();
    let gc = coordinator.garbage_collector();

    let report = gc.collect_once().await.unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.exempted, 1);

    let report = gc.collect_once().await.unwrap();
    assert_eq!(report.deleted, vec![last_words]);
    assert_eq!(store.list().await.unwrap(), vec![newer]);
}
