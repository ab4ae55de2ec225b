//! Replays the reference client sequence against an in-process store
//!
//! Run with `RUST_LOG=debug cargo run --example demo` to see the store's
//! own logging.

use std::thread;
use std::time::Duration;
use tagbase::{EventKind, EventSpec, MemberDef, Tagbase, TagbaseConfig};

fn main() -> tagbase::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db = Tagbase::new(TagbaseConfig::new());
    let session = db.connect("demo");

    session.define_type(
        "PyDAX_Type",
        &[
            MemberDef::new("Mem1", "BOOL", 10),
            MemberDef::new("Mem2", "BOOL", 1),
            MemberDef::new("Mem3", "BOOL", 3),
        ],
    )?;
    println!("Type: {}", session.serialize_type("PyDAX_TYPE")?);

    session.add_tag("PyCDTTAG", "PyDAX_TYPE", 1)?;
    println!("PyCDTTAG = {}", session.read("PyCDTTAG")?);

    session.add_tag("PyBYTE", "BYTE", 10)?;
    session.add_tag("PyINT", "INT", 10)?;
    // Identical redeclaration is accepted
    session.add_tag("PyINT", "INT", 10)?;

    let id = session.event_add(
        EventSpec::new("PyBYTE[5]", EventKind::Change)
            .with_user_data("PyBYTE[5] watcher")
            .with_callback(|n| println!("  callback: {} -> {}", n.tag_name, n.value)),
    )?;
    println!("Registered event {}", id);

    let writer = db.connect("writer");
    let handle = thread::spawn(move || -> tagbase::Result<()> {
        for value in [7, 7, 8] {
            thread::sleep(Duration::from_millis(50));
            writer.write("PyBYTE[5]", value)?;
        }
        Ok(())
    });

    for _ in 0..3 {
        match session.event_wait(Duration::from_millis(500)) {
            Some(n) => println!(
                "Event {} ({}) on {}: {} [{}]",
                n.id,
                n.kind,
                n.tag_name,
                n.value,
                n.user_data::<&str>().copied().unwrap_or("-")
            ),
            None => println!("Timeout"),
        }
    }

    match handle.join() {
        Ok(result) => result?,
        Err(_) => eprintln!("writer thread panicked"),
    }

    println!("{:?}", db.stats());
    Ok(())
}
