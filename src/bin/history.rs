//! history - list or delete a driver's stored detection events

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;

use driver_watch::{history, store, LogNotifier, SqliteStore, StoreClient};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the event database.
    #[arg(long, env = "DRIVER_WATCH_DB_PATH", default_value = "driver_watch.db")]
    db_path: String,
    /// Driver whose history to operate on.
    #[arg(long, env = "DRIVER_WATCH_USER_ID")]
    user_id: String,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every stored event as one JSON object per line.
    List,
    /// Delete events by id.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    store::validate_segment(&args.user_id)
        .map_err(|e| anyhow!("invalid user id '{}': {}", args.user_id, e))?;

    let store = {
        let _stage = ui.stage("Open event store");
        StoreClient::start(SqliteStore::open(&args.db_path)?)?
    };

    match args.command {
        Command::List => {
            let events = {
                let _stage = ui.stage("Read history");
                history::list(&store, &args.user_id)?
            };
            for event in &events {
                println!("{}", serde_json::to_string(event)?);
            }
            eprintln!("{} event(s) for {}", events.len(), args.user_id);
        }
        Command::Delete { ids } => {
            let bar = ui.progress(ids.len() as u64, "Deleting");
            let mut failed = 0usize;
            for id in &ids {
                if let Err(e) = history::delete(&store, &args.user_id, id, &LogNotifier) {
                    log::error!("{}", e);
                    failed += 1;
                }
                bar.inc(1);
            }
            bar.finish_and_clear();
            if failed > 0 {
                store.shutdown();
                return Err(anyhow!("{} of {} deletions failed", failed, ids.len()));
            }
            eprintln!("deleted {} event(s)", ids.len());
        }
    }

    store.shutdown();
    Ok(())
}
