// Cross-thread behaviour: writers, waiters, deletion and teardown
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tagbase::{EventKind, EventSpec, TagValue, Tagbase, TagbaseConfig};

#[test]
fn waiter_is_woken_by_another_session() {
    let db = Arc::new(Tagbase::default());
    let reader = db.connect("reader");
    reader.add_tag("PyBYTE", "BYTE", 10).unwrap();
    let id = reader
        .event_add(EventSpec::new("PyBYTE[5]", EventKind::Change))
        .unwrap();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            let session = db.connect("writer");
            thread::sleep(Duration::from_millis(20));
            session.write("PyBYTE[5]", 7).unwrap();
        })
    };

    let notification = reader.event_wait(Duration::from_secs(5));
    writer.join().unwrap();
    assert_eq!(notification.map(|n| n.id), Some(id));
}

#[test]
fn no_notification_escapes_after_delete() {
    let db = Arc::new(Tagbase::new(TagbaseConfig::new().with_queue_capacity(1 << 16)));
    let owner = db.connect("owner");
    owner.add_tag("Hot", "DINT", 1).unwrap();
    let id = owner
        .event_add(EventSpec::new("Hot", EventKind::Write))
        .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let db = db.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let session = db.connect(&format!("writer-{}", w));
                let mut i = 0i64;
                while !stop.load(Ordering::Relaxed) {
                    session.write("Hot", i).unwrap();
                    i += 1;
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    owner.event_del(id);

    // Writers keep hammering the tag after the delete has returned
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }

    while let Some(n) = owner.event_poll() {
        assert_ne!(n.id, id, "notification delivered after event_del");
    }
    assert!(owner.event_wait(Duration::from_millis(10)).is_none());
}

#[test]
fn writers_to_different_tags_do_not_interfere() {
    let db = Arc::new(Tagbase::default());
    let setup = db.connect("setup");
    for t in 0..4 {
        setup.add_tag(&format!("T{}", t), "LINT", 8).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                let session = db.connect("worker");
                for i in 0..500i64 {
                    let address = format!("T{}[{}]", t, i % 8);
                    session.write(&address, i * (t + 1)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for t in 0..4i64 {
        let value = setup.read(&format!("T{}[3]", t)).unwrap();
        // Element 3 was last written at i = 499
        assert_eq!(value, TagValue::Int(499 * (t + 1)));
    }
}

#[test]
fn concurrent_writes_never_tear() {
    let db = Arc::new(Tagbase::default());
    let setup = db.connect("setup");
    setup.add_tag("Pair", "DINT", 2).unwrap();
    setup
        .event_add(EventSpec::new("Pair", EventKind::Change))
        .unwrap();

    let handles: Vec<_> = [1i32, 2]
        .into_iter()
        .map(|v| {
            let db = db.clone();
            thread::spawn(move || {
                let session = db.connect("writer");
                for _ in 0..200 {
                    session
                        .write("Pair", TagValue::from(vec![v, v]))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Every notification captured the pair atomically
    while let Some(n) = setup.event_poll() {
        let a = n.value.element(0).cloned();
        let b = n.value.element(1).cloned();
        assert_eq!(a, b);
    }
}

#[test]
fn dropping_a_session_removes_its_registrations() {
    let db = Tagbase::default();
    let keeper = db.connect("keeper");
    keeper.add_tag("PyBYTE", "BYTE", 10).unwrap();

    let transient = db.connect("transient");
    transient
        .event_add(EventSpec::new("PyBYTE", EventKind::Write))
        .unwrap();
    transient
        .event_add(EventSpec::new("PyBYTE[1]", EventKind::Change))
        .unwrap();
    assert_eq!(db.stats().num_events, 2);
    assert_eq!(db.stats().num_sessions, 2);

    drop(transient);
    assert_eq!(db.stats().num_events, 0);
    assert_eq!(db.stats().num_sessions, 1);
    keeper.write("PyBYTE[1]", 1).unwrap();
}

#[test]
fn session_count_is_observable_through_events() {
    let db = Tagbase::default();
    let watcher = db.connect("watcher");
    let id = watcher
        .event_add(EventSpec::new("_status.SessionCount", EventKind::Change))
        .unwrap();

    let other = db.connect("other");
    let n = watcher.event_wait(Duration::from_millis(500)).unwrap();
    assert_eq!(n.id, id);
    assert_eq!(n.value, TagValue::Int(2));

    drop(other);
    let n = watcher.event_wait(Duration::from_millis(500)).unwrap();
    assert_eq!(n.value, TagValue::Int(1));
}
