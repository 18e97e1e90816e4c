use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use d_backup::Coordinator;
use d_backup::InMemoryKv;
use d_backup::Restorer;

use crate::commons::backup_config;
use crate::commons::enable_logger;
use crate::commons::local_store;
use crate::commons::wait_until;

/// Puts and deletes keys until `stop` is raised.
fn spawn_writer(
    kv: Arc<InMemoryKv>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut i: u64 = 0;
        while !stop.load(Ordering::SeqCst) {
            kv.put(format!("key-{}", i % 50), format!("value-{i}"));
            if i % 7 == 0 {
                kv.delete(format!("key-{}", (i / 2) % 50).as_bytes());
            }
            i += 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restore_matches_store_at_abort() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = backup_config(dir.path(), Duration::from_millis(20), 7);
    let store = local_store(&config).await;
    let kv = Arc::new(InMemoryKv::new());
    kv.put("seed", "0");

    let coordinator = Coordinator::new(config, kv.clone(), store.clone()).unwrap();
    coordinator.start(true).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = spawn_writer(kv.clone(), stop.clone());
    assert!(
        wait_until(Duration::from_secs(10), || {
            coordinator
                .latest_snapshots()
                .map(|latest| latest.deltas.len() >= 3)
                .unwrap_or(false)
        })
        .await
    );
    stop.store(true, Ordering::SeqCst);
    writer.await.unwrap();

    let ack = coordinator.abort_and_wait().await.unwrap().unwrap();
    assert_eq!(ack.last_revision, kv.revision());
    assert_eq!(ack.latest.last_revision(), Some(kv.revision()));

    let restored = InMemoryKv::new();
    let report = Restorer::new(store).restore_latest(&restored).await.unwrap();
    assert_eq!(report.last_revision, kv.revision());
    assert!(report.deltas_applied >= 3);
    assert_eq!(restored.entries(), kv.entries());

    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_resumes_chain_on_disk() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = backup_config(dir.path(), Duration::from_secs(60), 7);
    let kv = Arc::new(InMemoryKv::new());

    let first = Coordinator::new(config.clone(), kv.clone(), local_store(&config).await).unwrap();
    kv.put("a", "1");
    let full = first.trigger_full_snapshot(false).await.unwrap();
    kv.put("b", "2");
    first.trigger_delta_snapshot().await.unwrap().unwrap();
    first.shutdown().await;

    // A new process over the same directory
    kv.put("c", "3");
    let store = local_store(&config).await;
    let second = Coordinator::new(config, kv.clone(), store.clone()).unwrap();
    second.start(false).unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || {
            second.latest_snapshots().map(|l| l.full.is_some()).unwrap_or(false)
        })
        .await
    );
    assert_eq!(second.latest_snapshots().unwrap().full, Some(full.clone()));

    let delta = second.trigger_delta_snapshot().await.unwrap().unwrap();
    assert!(delta.same_chain(&full));
    assert_eq!(delta.start_revision, 3);

    let restored = InMemoryKv::new();
    Restorer::new(store).restore_latest(&restored).await.unwrap();
    assert_eq!(restored.entries(), kv.entries());
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_triggers_race_with_loop_without_gaps() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = backup_config(dir.path(), Duration::from_millis(10), 100);
    let store = local_store(&config).await;
    let kv = Arc::new(InMemoryKv::new());
    kv.put("seed", "0");

    let coordinator = Arc::new(Coordinator::new(config, kv.clone(), store.clone()).unwrap());
    coordinator.start(true).unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || {
            coordinator.latest_snapshots().map(|l| l.full.is_some()).unwrap_or(false)
        })
        .await
    );

    let stop = Arc::new(AtomicBool::new(false));
    let writer = spawn_writer(kv.clone(), stop.clone());
    let mut triggers = Vec::new();
    for i in 0..10 {
        let coordinator = coordinator.clone();
        triggers.push(tokio::spawn(async move {
            if i % 4 == 0 {
                coordinator.trigger_full_snapshot(false).await.map(Some)
            } else {
                coordinator.trigger_delta_snapshot().await
            }
        }));
    }
    for trigger in triggers {
        trigger.await.unwrap().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    writer.await.unwrap();
    coordinator.abort_and_wait().await.unwrap().unwrap();

    let chain = Restorer::new(store.clone()).latest_chain().await.unwrap();
    chain.validate().unwrap();
    let restored = InMemoryKv::new();
    Restorer::new(store).restore_chain(&chain, &restored).await.unwrap();
    assert_eq!(restored.entries(), kv.entries());
    coordinator.shutdown().await;
}
