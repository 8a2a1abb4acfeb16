use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use mixtape_core::config::MixtapeConfig;
use mixtape_core::{Recurrence, Schedule, UpstreamSource};
use mixtape_jobs::archive::ArchivePairs;
use mixtape_resolver::{extract_item_ids, HttpPageFetcher, PageFetcher, PageForm, SourceStore};
use mixtape_scheduler::{next_fire_for, CronExpression, ScheduleStore};
use mixtape_snapshots::SnapshotStore;
use rusqlite::Connection;
use tracing::{info, warn};

mod cli;

use cli::{
    AddSchedule, ArchiveCommand, Cli, Commands, ScheduleCommand, SnapshotCommand, SourceCommand,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixtape=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // explicit --config / MIXTAPE_CONFIG > ~/.mixtape/mixtape.toml
    let config = MixtapeConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        MixtapeConfig::default()
    });

    match cli.command {
        Commands::Schedules(cmd) => schedules(&config, ScheduleStore::new(open_db(&config)?), cmd),
        Commands::Executions { schedule_id, limit } => {
            let store = ScheduleStore::new(open_db(&config)?);
            let execs = store.list_executions(&schedule_id, limit)?;
            println!("Executions ({})", execs.len());
            for e in execs {
                println!(
                    "  {} | {} | {} | {}ms | {}",
                    e.started_at.format("%Y-%m-%d %H:%M:%S"),
                    e.status,
                    e.error_code.as_deref().unwrap_or("-"),
                    (e.finished_at - e.started_at).num_milliseconds(),
                    e.error.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }
        Commands::Snapshots(cmd) => {
            snapshots(SnapshotStore::new(open_db(&config)?, config.snapshots.retention), cmd)
        }
        Commands::Sources(cmd) => sources(SourceStore::new(open_db(&config)?), cmd),
        Commands::Archive(cmd) => archive(ArchivePairs::new(open_db(&config)?), cmd),
        Commands::Scrape { collection_id } => scrape(&config, &collection_id).await,
    }
}

fn schedules(
    config: &MixtapeConfig,
    store: ScheduleStore,
    cmd: ScheduleCommand,
) -> anyhow::Result<()> {
    match cmd {
        ScheduleCommand::List => {
            let fallback = CronExpression::parse(&config.scheduler.fallback_cron)
                .or_else(|_| CronExpression::parse(mixtape_core::config::DEFAULT_FALLBACK_CRON))?;
            let now = Utc::now();
            let all = store.list()?;
            println!("Schedules ({})", all.len());
            for s in all {
                let next = if s.enabled {
                    next_fire_for(&s, &fallback, now).to_rfc3339()
                } else {
                    "disabled".to_string()
                };
                println!(
                    "  {} | {} | {} ({}) | {} | runs {} | next {}",
                    s.id, s.job_type, s.target_name, s.target_id, s.recurrence, s.run_count, next
                );
            }
        }
        ScheduleCommand::Add(args) => {
            let schedule = new_schedule(args)?;
            store.upsert(&schedule)?;
            println!("Added schedule: {}", schedule.id);
        }
        ScheduleCommand::Enable { id } => {
            store.set_enabled(&id, true)?;
            println!("Enabled {id}");
        }
        ScheduleCommand::Disable { id } => {
            store.set_enabled(&id, false)?;
            println!("Disabled {id}");
        }
        ScheduleCommand::Delete { id } => {
            store.delete(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn new_schedule(args: AddSchedule) -> anyhow::Result<Schedule> {
    let params: serde_json::Value =
        serde_json::from_str(&args.params).context("--params is not valid JSON")?;
    let job_type = args.job.into();
    // reject parameters the job would fail on at run time
    mixtape_core::JobParams::parse(job_type, &params)?;

    let recurrence = match (args.every, args.cron) {
        (Some(every), None) => Recurrence::interval(&every),
        (None, Some(cron)) => Recurrence::cron(&cron),
        (None, None) => Recurrence::interval("daily"),
        (Some(_), Some(_)) => bail!("use either --every or --cron"),
    };
    let name = if args.name.is_empty() {
        args.target.clone()
    } else {
        args.name
    };
    Ok(Schedule::new(&args.owner, &args.target, &name, job_type, params, recurrence))
}

fn snapshots(store: SnapshotStore, cmd: SnapshotCommand) -> anyhow::Result<()> {
    match cmd {
        SnapshotCommand::List {
            owner,
            collection,
            limit,
        } => {
            let snaps = store.list(&owner, &collection, limit)?;
            println!("Snapshots ({})", snaps.len());
            for s in snaps {
                println!(
                    "  {} | {} | {} | {} items | {}",
                    s.id,
                    s.created_at.format("%Y-%m-%d %H:%M:%S"),
                    s.cause,
                    s.item_count,
                    s.note.as_deref().unwrap_or(""),
                );
            }
        }
        SnapshotCommand::Show { owner, id } => {
            let s = store.get(&owner, &id)?;
            println!("Snapshot: {}", s.id);
            println!("  Collection: {} ({})", s.collection_name, s.collection_id);
            println!("  Cause: {}", s.cause);
            println!("  Created: {}", s.created_at);
            println!("  Items ({}):", s.item_count);
            for item in &s.item_ids {
                println!("    {item}");
            }
        }
        SnapshotCommand::Delete { owner, id } => {
            store.delete(&owner, &id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn sources(store: SourceStore, cmd: SourceCommand) -> anyhow::Result<()> {
    match cmd {
        SourceCommand::List { owner, target } => {
            let list = store.list_for_target(&owner, &target)?;
            println!("Sources ({})", list.len());
            for s in list {
                println!(
                    "  {} | {} | {} | last {} via {}",
                    s.id,
                    s.kind,
                    s.source_collection_id
                        .as_deref()
                        .or(s.query.as_deref())
                        .unwrap_or("-"),
                    s.last_status.as_deref().unwrap_or("never"),
                    s.last_pathway.as_deref().unwrap_or("-"),
                );
            }
        }
        SourceCommand::Add {
            owner,
            target,
            kind,
            collection,
            query,
        } => {
            let mut source = match collection {
                Some(id) => UpstreamSource::collection(&owner, &target, kind.into(), &id),
                None => UpstreamSource::search(&owner, &target, query.as_deref().unwrap_or("")),
            };
            source.kind = kind.into();
            source.query = query;
            store.add(&source)?;
            println!("Added source: {}", source.id);
        }
        SourceCommand::Remove { owner, id } => {
            store.delete(&owner, &id)?;
            println!("Removed {id}");
        }
    }
    Ok(())
}

fn archive(pairs: ArchivePairs, cmd: ArchiveCommand) -> anyhow::Result<()> {
    match cmd {
        ArchiveCommand::List { owner } => {
            let list = pairs.list(&owner)?;
            println!("Archive pairs ({})", list.len());
            for p in list {
                println!("  {} -> {}", p.target_id, p.archive_id);
            }
        }
        ArchiveCommand::Pair {
            owner,
            target,
            archive,
        } => {
            pairs.pair(&owner, &target, &archive)?;
            println!("Paired {target} -> {archive}");
        }
        ArchiveCommand::Unpair { owner, target } => {
            if pairs.unpair(&owner, &target)? {
                println!("Unpaired {target}");
            } else {
                println!("No archive paired with {target}");
            }
        }
    }
    Ok(())
}

async fn scrape(config: &MixtapeConfig, collection_id: &str) -> anyhow::Result<()> {
    let fetcher = HttpPageFetcher::new(&config.resolver)?;
    for form in PageForm::ORDER {
        match fetcher.fetch(form, collection_id).await {
            Ok(body) => {
                let ids = extract_item_ids(&body);
                println!("{} page: {} items", form.as_str(), ids.len());
                for id in ids {
                    println!("  {id}");
                }
            }
            Err(e) => println!("{} page: {e}", form.as_str()),
        }
    }
    Ok(())
}

/// Open the shared database and run every schema migration (idempotent).
fn open_db(config: &MixtapeConfig) -> anyhow::Result<Connection> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;

    mixtape_scheduler::db::init_db(&db)?;
    mixtape_snapshots::db::init_db(&db)?;
    mixtape_resolver::db::init_db(&db)?;
    mixtape_jobs::archive::init_db(&db)?;
    Ok(db)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
