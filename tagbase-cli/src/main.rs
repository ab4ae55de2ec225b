//! Tagbase CLI Application
//!
//! Command-line driver for the tagbase library. It starts an in-process
//! store and:
//! - Defines types and tags from a TOML script (or the built-in demo)
//! - Registers event subscriptions
//! - Replays scripted writes from a second session
//! - Prints notifications as they are delivered

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tagbase::Tagbase;

mod config;
mod report;
mod script;

/// Tagbase - drive an in-process tag database from a script
#[derive(Parser, Debug)]
#[command(name = "tagbase-cli")]
#[command(about = "Run tag database scripts and print event notifications", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a TOML script (types, tags, events, writes)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run the built-in reference scenario
    #[arg(long)]
    demo: bool,

    /// Maximum number of event waits
    #[arg(short = 'n', long, value_name = "COUNT", default_value_t = 10)]
    iterations: usize,

    /// Timeout of each event wait (default: the server's default_wait_ms)
    #[arg(short, long, value_name = "MS")]
    wait_ms: Option<u64>,

    /// Print records as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Tagbase CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using tagbase library v{}", tagbase::VERSION);

    let app_config = if let Some(path) = &args.config {
        log::info!("Loading configuration from: {:?}", path);
        config::load_config(path)?
    } else if args.demo {
        config::AppConfig::demo()
    } else {
        println!("Tagbase - No script specified");
        println!("\nQuick Start:");
        println!("  tagbase-cli --demo");
        println!("  tagbase-cli --config script.toml --json");
        println!("\nUse --help for more options");
        return Ok(());
    };

    run(&args, app_config)
}

/// Apply the script, wait for notifications and print the final state
fn run(args: &Args, app_config: config::AppConfig) -> Result<()> {
    let reporter = report::Reporter::new(args.json);
    let db = Arc::new(Tagbase::new(app_config.server.clone()));
    let wait = args
        .wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| db.config().default_wait());

    let session = db.connect("cli");
    let events = script::apply(&session, &app_config)?;
    log::info!(
        "Script applied: {} types, {} tags, {} events",
        app_config.types.len(),
        app_config.tags.len(),
        events.len()
    );

    let writer = script::spawn_writer(db.clone(), app_config.writes.clone());

    let mut delivered = 0;
    for _ in 0..args.iterations {
        match session.event_wait(wait) {
            Some(n) => {
                delivered += 1;
                println!("{}", reporter.notification(&n)?);
            }
            None if writer.is_finished() && session.pending() == 0 => {
                log::debug!("Writer finished and no notifications pending");
                break;
            }
            None => log::debug!("Wait timed out after {:?}", wait),
        }
    }

    let written = writer
        .join()
        .map_err(|_| anyhow!("writer thread panicked"))??;
    log::info!("{} writes applied, {} notifications delivered", written, delivered);

    if !args.json {
        println!("\nTag values:");
    }
    for tag in session.list_tags() {
        let value = session.read(&tag.name)?;
        println!("{}", reporter.value(&tag.name, &value)?);
    }
    println!("{}", reporter.stats(&db.stats())?);

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
