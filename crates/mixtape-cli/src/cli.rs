use clap::{Args, Parser, Subcommand, ValueEnum};
use mixtape_core::{JobType, SourceKind};

#[derive(Parser)]
#[command(name = "mixtape")]
#[command(about = "Playlist automation: schedules, snapshots and raid sources", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.mixtape/mixtape.toml)
    #[arg(long, global = true, env = "MIXTAPE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage automation schedules
    #[command(subcommand)]
    Schedules(ScheduleCommand),
    /// Execution history of one schedule, most recent first
    Executions {
        schedule_id: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Inspect stored snapshots
    #[command(subcommand)]
    Snapshots(SnapshotCommand),
    /// Manage raid sources of a target collection
    #[command(subcommand)]
    Sources(SourceCommand),
    /// Manage archive pairings used by rotation
    #[command(subcommand)]
    Archive(ArchiveCommand),
    /// Fetch a public collection page and print the item ids found
    Scrape {
        collection_id: String,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// List every schedule with its next fire time
    List,
    /// Create a schedule
    Add(AddSchedule),
    Enable {
        id: String,
    },
    Disable {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum JobTypeArg {
    Reshuffle,
    Raid,
    Rotate,
}

impl From<JobTypeArg> for JobType {
    fn from(arg: JobTypeArg) -> Self {
        match arg {
            JobTypeArg::Reshuffle => JobType::Reshuffle,
            JobTypeArg::Raid => JobType::Raid,
            JobTypeArg::Rotate => JobType::Rotate,
        }
    }
}

#[derive(Args)]
pub struct AddSchedule {
    #[arg(long)]
    pub owner: String,
    /// Target collection id
    #[arg(long)]
    pub target: String,
    /// Target collection display name
    #[arg(long, default_value = "")]
    pub name: String,
    #[arg(long, value_enum)]
    pub job: JobTypeArg,
    /// Job parameters as JSON, e.g. '{"mode":"swap","count":5}'
    #[arg(long, default_value = "null")]
    pub params: String,
    /// Named interval (hourly, every-6h, daily, weekly, ...)
    #[arg(long, conflicts_with = "cron")]
    pub every: Option<String>,
    /// Five-field cron expression
    #[arg(long)]
    pub cron: Option<String>,
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    List {
        owner: String,
        collection: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    Show {
        owner: String,
        id: String,
    },
    Delete {
        owner: String,
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceKindArg {
    Owned,
    External,
    SearchQuery,
}

impl From<SourceKindArg> for SourceKind {
    fn from(arg: SourceKindArg) -> Self {
        match arg {
            SourceKindArg::Owned => SourceKind::Owned,
            SourceKindArg::External => SourceKind::External,
            SourceKindArg::SearchQuery => SourceKind::SearchQuery,
        }
    }
}

#[derive(Subcommand)]
pub enum SourceCommand {
    List {
        owner: String,
        target: String,
    },
    Add {
        owner: String,
        target: String,
        #[arg(long, value_enum)]
        kind: SourceKindArg,
        /// Source collection id (owned / external)
        #[arg(long)]
        collection: Option<String>,
        /// Search text (search-query), or enrichment hint
        #[arg(long)]
        query: Option<String>,
    },
    Remove {
        owner: String,
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    List {
        owner: String,
    },
    Pair {
        owner: String,
        target: String,
        archive: String,
    },
    Unpair {
        owner: String,
        target: String,
    },
}
