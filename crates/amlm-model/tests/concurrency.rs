//! The threadsafe model under concurrent writers and readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use amlm_core::{Promise, TaskError, TaskRunner, ThreadPool, ThreadPoolConfig};
use amlm_model::{ScanResult, ThreadsafeTreeModel, TreeItem, TreeModelConfig, Variant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_concurrent_writers_keep_tree_consistent() {
    init_tracing();
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();
    let dirs: Vec<_> = (0..4)
        .map(|i| model.append_child(root, vec![Variant::from(format!("dir{i}"))]).unwrap())
        .collect();

    let inserted = Arc::new(AtomicUsize::new(0));
    let counter = inserted.clone();
    model.signals().rows_inserted.connect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let model = model.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut checks = 0;
            while !done.load(Ordering::SeqCst) {
                assert!(model.check_consistency().is_ok());
                checks += 1;
            }
            checks
        })
    };

    let writers: Vec<_> = dirs
        .iter()
        .map(|&dir| {
            let model = model.clone();
            std::thread::spawn(move || {
                for n in 0..100 {
                    let id = model.append_child(dir, vec![Variant::from(n)]).unwrap();
                    if n % 10 == 0 {
                        assert!(model.delete_subtree(id));
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.join().unwrap() > 0);

    for dir in dirs {
        assert_eq!(model.row_count(dir), 90);
    }
    assert_eq!(inserted.load(Ordering::SeqCst), 400);
    assert!(model.check_consistency().is_ok());
}

#[test]
fn test_task_results_land_in_tree() {
    init_tracing();
    let pool = Arc::new(ThreadPool::new(ThreadPoolConfig::with_threads(2)).unwrap());
    let runner = TaskRunner::new(pool);
    let model = ThreadsafeTreeModel::new(TreeModelConfig::scan_results());
    let root = model.root();

    let scan = runner.start(|promise: &Promise<String>| -> Result<(), TaskError> {
        for name in ["a.flac", "b.flac", "c.mp3"] {
            promise.report_result(format!("file:///music/{name}"));
        }
        Ok(())
    });

    let sink = model.clone();
    let inserted = scan
        .tap(move |url| {
            let item = TreeItem::from(ScanResult::for_media_url(url.clone(), |_| false));
            sink.append_item(root, item).unwrap();
        })
        .then(|f| f.result_count());

    assert_eq!(inserted.get().unwrap(), 3);
    assert_eq!(model.row_count(root), 3);
    let first = model.child_at(root, 0).unwrap();
    assert_eq!(model.data(first, 1), Variant::from("file:///music/a.flac"));
}

#[test]
fn test_write_context_is_atomic_for_readers() {
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();

    let observed = Arc::new(AtomicUsize::new(usize::MAX));
    let m = model.clone();
    let o = observed.clone();
    model.signals().rows_inserted.connect(move |_| {
        // Runs after the batch: both rows are visible at once.
        o.store(m.row_count(root), Ordering::SeqCst);
    });

    {
        let mut ctx = model.write().unwrap();
        ctx.append_child(root, vec![Variant::from("a")]).unwrap();
        ctx.append_child(root, vec![Variant::from("b")]).unwrap();
    }
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_competing_deletes_keep_removal_signals_paired() {
    init_tracing();
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();
    let rows: Vec<_> = (0..200)
        .map(|n| model.append_child(root, vec![Variant::from(n)]).unwrap())
        .collect();

    let announced = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));
    let a = announced.clone();
    model.signals().rows_about_to_be_removed.connect(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });
    let r = removed.clone();
    model.signals().rows_removed.connect(move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    let deleted = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let model = model.clone();
            let rows = rows.clone();
            let deleted = deleted.clone();
            std::thread::spawn(move || {
                for id in rows {
                    if model.delete_subtree(id) {
                        deleted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(deleted.load(Ordering::SeqCst), 200);
    assert_eq!(announced.load(Ordering::SeqCst), 200);
    assert_eq!(removed.load(Ordering::SeqCst), 200);
    assert_eq!(model.row_count(root), 0);
}

#[test]
fn test_undoable_moves_under_concurrent_writers() {
    init_tracing();
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();
    let left = model.append_child(root, vec![Variant::from("left")]).unwrap();
    let right = model.append_child(root, vec![Variant::from("right")]).unwrap();
    let items: Vec<_> = (0..8)
        .map(|n| model.append_child(left, vec![Variant::from(n)]).unwrap())
        .collect();

    let done = Arc::new(AtomicBool::new(false));
    let shuffler = {
        let model = model.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if let Some(first) = model.child_at(left, 0) {
                    model.move_item(first, left, model.row_count(left));
                }
            }
        })
    };

    for &item in &items {
        let (mut undo, mut redo) = (amlm_model::noop(), amlm_model::noop());
        assert!(model.request_change_parent(item, right, &mut undo, &mut redo));
        assert!(undo());
        assert_eq!(model.parent_of(item), Some(left));
        assert!(model.check_consistency().is_ok());
    }
    done.store(true, Ordering::SeqCst);
    shuffler.join().unwrap();
    assert_eq!(model.row_count(left), 8);
}
