//! Concurrency tests for directory operations.
//!
//! Focus areas:
//! - Mutations on different directories from many threads all succeed
//! - Listings running alongside mutations never fail or show reserved files
//! - Instances opened on the same backing root share one lock
//! - The async facade behaves like the sync API under `join!`

mod common;

use common::{TestFs, test_key};
use ivfs_core::fs::PosixFs;
#[cfg(feature = "async")]
use ivfs_core::IvFsAsync;
use ivfs_core::{FsConfig, IvFs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const WORKERS: usize = 8;
const ROUNDS: usize = 20;

#[test]
fn parallel_create_remove_with_concurrent_listing() {
    let t = TestFs::with_config(FsConfig::new().with_long_name_max(62));
    let fs = Arc::new(t.fs);
    let stop = Arc::new(AtomicBool::new(false));

    let listers: Vec<_> = (0..4)
        .map(|_| {
            let fs = Arc::clone(&fs);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut listings = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let entries = fs.list_directory("/").expect("listing failed");
                    for entry in &entries {
                        let name = entry.name.to_string_lossy();
                        assert!(name.starts_with("worker-"), "unexpected entry {name}");
                    }
                    listings += 1;
                }
                listings
            })
        })
        .collect();

    let workers: Vec<_> = (0..WORKERS)
        .map(|w| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                // Every other worker uses a name long enough for a companion file
                let dir = if w % 2 == 0 {
                    format!("/worker-{w}")
                } else {
                    format!("/worker-{w}-{}", "z".repeat(60))
                };
                let child = format!("{dir}/child");
                for round in 0..ROUNDS {
                    fs.create_directory(&dir, 0o755)
                        .unwrap_or_else(|e| panic!("worker {w} round {round} create: {e}"));
                    fs.create_directory(&child, 0o755).unwrap();
                    let names: Vec<_> = fs
                        .list_directory(&dir)
                        .unwrap()
                        .into_iter()
                        .map(|e| e.name)
                        .collect();
                    assert_eq!(names, vec!["child"]);
                    fs.remove_directory(&child).unwrap();
                    fs.remove_directory(&dir)
                        .unwrap_or_else(|e| panic!("worker {w} round {round} remove: {e}"));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }
    stop.store(true, Ordering::Relaxed);
    for lister in listers {
        assert!(lister.join().expect("lister panicked") > 0);
    }

    assert!(fs.list_directory("/").unwrap().is_empty());
    assert!(TestFs::temp_aliases(t.tmp.path()).is_empty());
    assert!(fs.diagnostics().events().is_empty());

    let metrics = fs.lock_metrics();
    assert!(metrics.exclusive_total() >= (WORKERS * ROUNDS * 4) as u64);
}

#[test]
fn instances_on_same_root_share_the_lock() {
    let t = TestFs::new();
    let other = IvFs::with_raw_fs(t.cipherdir(), FsConfig::new(), test_key(), Arc::new(PosixFs::new()))
        .unwrap();

    let before = other.lock_metrics().exclusive_total();
    t.fs.create_directory("/shared", 0o755).unwrap();
    assert!(other.lock_metrics().exclusive_total() > before);

    // And they see each other's work
    assert_eq!(
        other
            .list_directory("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect::<Vec<_>>(),
        vec!["shared"]
    );
    other.remove_directory("/shared").unwrap();
    assert!(t.names("/").is_empty());
}

#[test]
fn same_name_race_has_one_winner() {
    let t = TestFs::new();
    let fs = Arc::new(t.fs);

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || fs.create_directory("/contested", 0o755).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ok| ok)
        .count();

    assert_eq!(winners, 1);
    let backing = fs.backing_path(&"/contested".into()).unwrap();
    assert!(backing.join(ivfs_core::fs::DIRIV_FILENAME).is_file());
    assert!(fs.diagnostics().events().is_empty());
}

#[cfg(feature = "async")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_operations_via_join() {
    let t = TestFs::new();
    let fs = IvFsAsync::new(t.fs);

    let (a, b, c) = tokio::join!(
        fs.create_directory("/one", 0o755),
        fs.create_directory("/two", 0o755),
        fs.create_directory("/three", 0o755),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let mut names: Vec<_> = fs
        .list_directory("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["one", "three", "two"]);

    let (a, b, c) = tokio::join!(
        fs.remove_directory("/one"),
        fs.remove_directory("/two"),
        fs.remove_directory("/three"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert!(fs.list_directory("/").await.unwrap().is_empty());
}

#[cfg(feature = "async")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_operations_complete_under_timeout() {
    let t = TestFs::new();
    let fs = IvFsAsync::new(t.fs);

    let work = async {
        for i in 0..50 {
            let path = format!("/d{i}");
            fs.create_directory(&path, 0o755).await?;
            fs.remove_directory(&path).await?;
        }
        Ok::<_, ivfs_core::DirOpError>(())
    };
    tokio::time::timeout(std::time::Duration::from_secs(30), work)
        .await
        .expect("operations deadlocked")
        .unwrap();
}
