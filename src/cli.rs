use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Discover, filter, score and publish today's ranking
    Build(BuildArgs),
    /// Aggregate dated history snapshots into trailing-window leaderboards
    Rollup(RollupArgs),
    /// Derive the compact rank/id/name list from a ranked table
    Channels(ChannelsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Ranked table output; its previous contents also seed the pool
    #[arg(long, default_value = "top500_ranked.csv")]
    pub out: PathBuf,

    /// JSON snapshot output
    #[arg(long, default_value = "public/data/top500.json")]
    pub json_out: PathBuf,

    /// Directory receiving dated history copies
    #[arg(long, default_value = "public/data/history")]
    pub history_dir: PathBuf,

    #[arg(long, default_value = "seeds/seed_channel_ids.txt")]
    pub seeds: PathBuf,

    #[arg(long, default_value = "blocked_channel_ids.txt")]
    pub blocklist: PathBuf,

    #[arg(long, default_value = "blocked_keywords.txt")]
    pub blocked_keywords: PathBuf,

    /// Cache of ids surfaced by earlier discovery runs
    #[arg(long, default_value = "data/discovered_channel_ids.txt")]
    pub discovered_cache: PathBuf,

    /// Where intermediate state is dumped when a run under-yields
    #[arg(long, default_value = "data/diagnostics")]
    pub diagnostics_dir: PathBuf,

    /// Run free-text discovery against the platform
    #[arg(long, env = "DISCOVER", default_value_t = true, action = clap::ArgAction::Set)]
    pub discover: bool,

    /// Overrides MAX_CANDIDATES
    #[arg(long)]
    pub max_new: Option<usize>,

    /// Overrides MIN_DURATION_SEC
    #[arg(long)]
    pub min_duration_sec: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct RollupArgs {
    #[arg(long, default_value = "public/data/history")]
    pub history_dir: PathBuf,

    #[arg(long, default_value = "public/data")]
    pub out_dir: PathBuf,

    /// Reference date (YYYY-MM-DD); defaults to today in UTC
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct ChannelsArgs {
    #[arg(long, default_value = "top500_ranked.csv")]
    pub ranked: PathBuf,

    #[arg(long, default_value = "channels.csv")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 500)]
    pub limit: usize,
}
