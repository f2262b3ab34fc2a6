//! CLI entry point: a single entry-point that optionally accepts a
//! database file path, restoring and persisting session state around a
//! single root HCH run. Logging is configured once at startup, CLI args
//! are parsed via `clap`, and top-level errors propagate via `anyhow`.
//! There is no terminal guard and no event loop, just one driver prompt
//! per scheduler step.

mod action_parser;
mod driver;
mod hypertext_parser;
mod persist;

use anyhow::{Context as _, Result};
use clap::Parser;
use driver::CliDriver;
use hch_context::Context;
use hch_datastore::Datastore;
use hch_hypertext::{Hypertext, render_locked};
use hch_scheduler::Scheduler;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "hch", version, about = "HCH (Humans Consulting HCH) test bed")]
struct Args {
    /// Optional path to a session file to restore from and persist to on exit.
    pub db: Option<PathBuf>,

    /// Seed the root question non-interactively instead of prompting for it.
    #[arg(long = "root")]
    pub root: Option<String>,

    /// Raise the tracing filter to debug (stackable: -v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn configure_logging(verbose: u8) -> Option<WorkerGuard> {
    static INIT: Once = Once::new();
    let mut guard = None;
    INIT.call_once(|| {
        let default_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
        let file_appender = tracing_appender::rolling::never(".", "hch.log");
        let (nb_writer, g) = tracing_appender::non_blocking(file_appender);
        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(nb_writer)
            .try_init()
            .is_ok()
        {
            guard = Some(g);
        }
    });
    guard
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.verbose);
    info!(target: "runtime", db = ?args.db, "startup");

    let (mut store, mut scheduler, mut automation_cache) = bootstrap(&args)?;

    let mut driver = CliDriver::new();
    let answer = loop {
        match scheduler.step(&mut store, &mut driver, &mut automation_cache) {
            Ok(Some(answer)) => break Some(answer),
            Ok(None) => {
                if driver.hit_eof() {
                    break None;
                }
            }
            Err(err) => return Err(err).context("scheduler step failed"),
        }
    };

    if let Some(answer) = answer {
        let rendered = match store.lookup(answer) {
            Ok(hch_datastore::Lookup::Filled(h)) => render_locked(h, &|a| store.resolve(a).unwrap_or(a)),
            _ => "<unresolved>".to_string(),
        };
        println!("{rendered}");
        info!(target: "runtime", "root_answered");
    } else {
        info!(target: "runtime", "exiting on driver eof before root answered");
    }

    if let Some(path) = &args.db {
        persist::save(path, &store, &automation_cache, &scheduler)
            .with_context(|| format!("saving session to {}", path.display()))?;
    }

    Ok(())
}

fn bootstrap(args: &Args) -> Result<(Datastore<Hypertext>, Scheduler, HashMap<String, hch_actions::Action>)> {
    if let Some(path) = &args.db
        && path.exists()
    {
        let restored = persist::load(path)?;
        info!(target: "runtime", path = %path.display(), "session restored");
        return Ok((restored.store, restored.scheduler, restored.automation_cache));
    }

    let mut store = Datastore::new();
    let question_text = args
        .root
        .clone()
        .unwrap_or_else(prompt_for_root_question);
    let question = store.allocate_filled(Hypertext::text(question_text));
    let scratch = store.allocate_filled(Hypertext::text(""));
    let root_workspace = hch_workspace::build(&mut store, None, question, scratch, Vec::new());
    let root_context = Context::default_for(&store, root_workspace).context("building root context")?;
    let scheduler = Scheduler::new(root_context);
    Ok((store, scheduler, HashMap::new()))
}

fn prompt_for_root_question() -> String {
    use std::io::{self, Write};
    print!("Root question: ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
    line.trim().to_string()
}
