//! Command dispatch: wires configuration, the platform client and the stores
//! into the build, rollup and channel-list commands.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::cli::{BuildArgs, ChannelsArgs, Cli, Command, RollupArgs};
use crate::clients::{ContentPlatform, YouTubeClient, YouTubeConfig};
use crate::config::Config;
use crate::model::Snapshot;
use crate::pipeline::rollup::RollupJob;
use crate::pipeline::{PipelineSettings, RankingPipeline, RunError, RunReport, SourcePaths};
use crate::store::{FsHistoryStore, FsSnapshotStore, SnapshotPaths, SnapshotStore, export_channel_list};
use crate::util::retry::RetryConfig;
use crate::util::time;

/// Runs the selected command to completion.
///
/// # Errors
/// Returns the run-level failure; [`RunError::exit_code`] maps it to a
/// process status.
pub async fn run(cli: Cli) -> Result<(), RunError> {
    match cli.command {
        Command::Build(args) => build(&args, time::now()).await.map(|_| ()),
        Command::Rollup(args) => rollup(&args, time::now()).await,
        Command::Channels(args) => channels(&args).await,
    }
}

fn snapshot_store(args: &BuildArgs) -> FsSnapshotStore {
    FsSnapshotStore::new(SnapshotPaths {
        csv: args.out.clone(),
        json: Some(args.json_out.clone()),
        history_dir: Some(args.history_dir.clone()),
        diagnostics_dir: args.diagnostics_dir.clone(),
        discovered_cache: Some(args.discovered_cache.clone()),
    })
}

/// Writes an empty snapshot when nothing has been published yet, so
/// consumers always find a well-formed file.
async fn ensure_placeholder(store: &dyn SnapshotStore, generated_at: DateTime<Utc>) {
    match store.snapshot_exists().await {
        Ok(true) => info!("keeping previously published snapshot"),
        Ok(false) => {
            if let Err(err) = store.publish(&Snapshot::empty(generated_at)).await {
                warn!(error = ?err, "failed to write placeholder snapshot");
            }
        }
        Err(err) => warn!(error = ?err, "could not check for an existing snapshot"),
    }
}

fn platform_client(config: &Config) -> Result<YouTubeClient, RunError> {
    let api_key = config.api_key()?;
    let client = YouTubeClient::new(YouTubeConfig {
        base_url: config.yt_api_base_url().to_string(),
        api_key: api_key.to_string(),
        region_code: config.search_region_code().map(ToString::to_string),
        connect_timeout: config.yt_connect_timeout(),
        total_timeout: config.yt_total_timeout(),
        retry: RetryConfig::new(
            config.http_max_retries(),
            config.http_backoff_base_ms(),
            config.http_backoff_cap_ms(),
        ),
    })?;
    Ok(client)
}

fn settings_for(config: &Config, args: &BuildArgs) -> PipelineSettings {
    let mut settings = PipelineSettings::from_config(config);
    settings.discover = args.discover;
    if let Some(max_new) = args.max_new {
        settings.max_candidates = max_new;
    }
    if let Some(min_duration) = args.min_duration_sec {
        settings.gates.min_duration_secs = min_duration;
    }
    settings
}

/// Runs the ranking pipeline and publishes its snapshot.
///
/// Configuration is validated before any network call. On a configuration
/// error an empty snapshot is written only if none exists yet.
///
/// # Errors
/// See [`RankingPipeline::run`].
pub async fn build(args: &BuildArgs, generated_at: DateTime<Utc>) -> Result<RunReport, RunError> {
    let store = Arc::new(snapshot_store(args));

    let prepared = Config::from_env()
        .map_err(RunError::from)
        .and_then(|config| platform_client(&config).map(|client| (config, client)));
    let (config, client) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            if matches!(err, RunError::Config(_)) {
                error!(error = %err, "configuration error, no network calls made");
                ensure_placeholder(store.as_ref(), generated_at).await;
            }
            return Err(err);
        }
    };

    let platform: Arc<dyn ContentPlatform> = Arc::new(client);
    let pipeline = RankingPipeline::builder(settings_for(&config, args))
        .with_sources(SourcePaths {
            seeds: Some(args.seeds.clone()),
            blocklist: Some(args.blocklist.clone()),
            blocked_keywords: Some(args.blocked_keywords.clone()),
            discovered_cache: Some(args.discovered_cache.clone()),
            existing: Some(args.out.clone()),
        })
        .with_platform(platform)
        .with_store(store)
        .build()?;

    pipeline.run(generated_at).await
}

/// Writes one rollup per configured window.
///
/// # Errors
/// Fails on invalid configuration or when a rollup cannot be written.
pub async fn rollup(args: &RollupArgs, generated_at: DateTime<Utc>) -> Result<(), RunError> {
    let config = Config::from_env()?;
    let today = args.today.unwrap_or_else(|| generated_at.date_naive());
    let store = Arc::new(FsHistoryStore::new(args.history_dir.clone(), args.out_dir.clone()));

    let reports = RollupJob::new(store, config.rollup_windows().to_vec(), config.output_cap())
        .run(today, generated_at)
        .await?;
    info!(windows = reports.len(), %today, "rollups finished");
    Ok(())
}

/// # Errors
/// Fails when the ranked table cannot be read or the list cannot be written.
pub async fn channels(args: &ChannelsArgs) -> Result<(), RunError> {
    export_channel_list(&args.ranked, &args.out, args.limit)
        .await
        .with_context(|| format!("failed to derive channel list from {}", args.ranked.display()))?;
    Ok(())
}
