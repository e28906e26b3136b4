use std::time::{Duration, Instant};

use marketwatch_db::{Combination, EntryStatus, MonitorDb};
use tempfile::TempDir;
use tokio::sync::oneshot;

async fn open_db(tmp: &TempDir) -> MonitorDb {
    MonitorDb::open(tmp.path().join("lock.db")).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_writer_waits_for_open_transaction() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let (started_tx, started_rx) = oneshot::channel();
    let db_tx = db.clone();

    let tx_handle = tokio::spawn(async move {
        let mut tx = db_tx.begin_write().await.unwrap();
        let combo = Combination::new("S1", "I1").unwrap();
        tx.upsert(&combo, EntryStatus::New, MonitorDb::now())
            .await
            .unwrap();
        let _ = started_tx.send(());
        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.commit().await.unwrap();
    });

    let _ = started_rx.await;

    let db_second = db.clone();
    let mut second_handle = tokio::spawn(async move {
        let mut tx = db_second.begin_write().await.unwrap();
        let active = tx.read_active_set().await.unwrap();
        tx.commit().await.unwrap();
        active.len()
    });

    let early = tokio::time::timeout(Duration::from_millis(50), &mut second_handle).await;
    assert!(early.is_err(), "second writer should wait for the first");

    tx_handle.await.unwrap();
    // The second writer sees the committed state of the first
    assert_eq!(second_handle.await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_do_not_wait_for_writer() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let (started_tx, started_rx) = oneshot::channel();
    let db_tx = db.clone();

    let tx_handle = tokio::spawn(async move {
        let mut tx = db_tx.begin_write().await.unwrap();
        let combo = Combination::new("S1", "I1").unwrap();
        tx.upsert(&combo, EntryStatus::New, MonitorDb::now())
            .await
            .unwrap();
        let _ = started_tx.send(());
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.commit().await.unwrap();
    });

    let _ = started_rx.await;
    let started = Instant::now();
    let active = db.active_entries().await.unwrap();
    let elapsed = started.elapsed();

    // Snapshot isolation: the uncommitted row is invisible
    assert!(active.is_empty());
    assert!(
        elapsed < Duration::from_millis(250),
        "read blocked on writer: {:?}",
        elapsed
    );

    tx_handle.await.unwrap();
    assert_eq!(db.active_entries().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_writer_leaves_state_unchanged() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp).await;

    let (started_tx, started_rx) = oneshot::channel();
    let db_tx = db.clone();

    let handle = tokio::spawn(async move {
        let mut tx = db_tx.begin_write().await.unwrap();
        let combo = Combination::new("S1", "I1").unwrap();
        tx.upsert(&combo, EntryStatus::New, MonitorDb::now())
            .await
            .unwrap();
        let _ = started_tx.send(());
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.commit().await.unwrap();
    });

    let _ = started_rx.await;
    handle.abort();
    let _ = handle.await;

    let tx = tokio::time::timeout(Duration::from_secs(2), db.begin_write())
        .await
        .expect("writer lock released after abort")
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(db.registry_stats().await.unwrap().total, 0);
    assert!(db.verify_mirror().await.unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writer_in_another_handle_waits_for_open_transaction() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("lock.db");
    // Separate handles share only the file, like a daemon and a CLI process
    let daemon = MonitorDb::open(&path).await.unwrap();
    let cli = MonitorDb::open_existing(&path).await.unwrap();

    let s1 = Combination::new("S1", "I1").unwrap();
    let s2 = Combination::new("S2", "I2").unwrap();
    let seeded_at = MonitorDb::now() - chrono::Duration::days(10);
    {
        let mut tx = daemon.begin_write().await.unwrap();
        tx.upsert(&s1, EntryStatus::New, seeded_at).await.unwrap();
        tx.upsert(&s2, EntryStatus::New, seeded_at).await.unwrap();
        tx.transition(&s1, EntryStatus::Unchecked, seeded_at)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let mut scan = daemon.begin_write().await.unwrap();
    assert_eq!(scan.read_active_set().await.unwrap().len(), 1);

    let mut cleanup = tokio::spawn(async move {
        let mut tx = cli.begin_write().await.unwrap();
        let stale = tx
            .read_stale(MonitorDb::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        for entry in &stale {
            assert!(tx.delete(&entry.combination).await.unwrap());
        }
        tx.commit().await.unwrap();
        stale.len()
    });

    let early = tokio::time::timeout(Duration::from_millis(100), &mut cleanup).await;
    assert!(early.is_err(), "writer in another handle should wait");

    scan.transition(&s2, EntryStatus::Unchecked, seeded_at)
        .await
        .unwrap();
    scan.commit().await.unwrap();

    // The waiting writer starts after the commit and sees both entries stale
    assert_eq!(cleanup.await.unwrap(), 2);
    assert_eq!(daemon.registry_stats().await.unwrap().total, 0);
    assert!(daemon.verify_mirror().await.unwrap().is_clean());
}
