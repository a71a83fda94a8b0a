//! Coffer CLI: operate on a Coffer catalog and blob store directly.
//!
//! Configuration comes from the environment (see `coffer_core::config`). Without
//! DATABASE_URL the catalog is in-memory and only lives for one command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coffer_cli::{format_bytes, Runtime};
use coffer_core::{Config, TenantScope};
use coffer_infra::{init_telemetry, shutdown_telemetry, StagingSweeper, TelemetryConfig};
use coffer_processing::MediaKind;
use coffer_worker::{ThumbnailJob, ThumbnailOutcome};
use futures::TryStreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "coffer", about = "Coffer file storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file; an existing file with the same name gets a new version
    Upload {
        #[arg(long)]
        tenant: Uuid,
        /// Path to the file to upload
        file: PathBuf,
        /// Display name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        folder: Option<Uuid>,
        /// Upload in chunks of this many bytes instead of one request
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Show a file's version history, newest first
    Versions {
        #[arg(long)]
        tenant: Uuid,
        id: Uuid,
    },
    /// Write an active file's content to disk
    Download {
        #[arg(long)]
        tenant: Uuid,
        id: Uuid,
        #[arg(long)]
        output: PathBuf,
    },
    /// Make a copy of an older version the latest one
    RestoreVersion {
        #[arg(long)]
        tenant: Uuid,
        /// Current latest version
        id: Uuid,
        /// Version to restore
        target: Uuid,
    },
    /// Move files (and their whole version chains) to the trash
    Trash {
        #[arg(long)]
        tenant: Uuid,
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Bring trashed files back
    Untrash {
        #[arg(long)]
        tenant: Uuid,
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Permanently delete files and release their storage
    Purge {
        #[arg(long)]
        tenant: Uuid,
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Storage usage against quota
    Stats {
        #[arg(long)]
        tenant: Uuid,
        /// Output format: json or table
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Set a tenant's quota
    SetQuota {
        #[arg(long)]
        tenant: Uuid,
        #[arg(long, conflicts_with = "unlimited", required_unless_present = "unlimited")]
        bytes: Option<i64>,
        #[arg(long)]
        unlimited: bool,
    },
    /// Remove abandoned chunked-upload sessions
    SweepStaging {
        /// Override the configured session TTL
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Render previews for media files that have none
    BackfillThumbnails {
        #[arg(long, default_value = "100")]
        limit: i64,
    },
}

#[derive(Serialize)]
struct BackfillReport {
    scanned: usize,
    stored: usize,
    skipped: usize,
    orphaned: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    let telemetry = TelemetryConfig::from_env("coffer-cli", config.environment())?;
    init_telemetry(&telemetry)?;

    let runtime = Runtime::from_config(config).await?;
    let result = run(&runtime, cli.command).await;
    runtime.shutdown().await;
    shutdown_telemetry().await;
    result
}

async fn run(runtime: &Runtime, command: Commands) -> anyhow::Result<()> {
    let service = &runtime.service;
    match command {
        Commands::Upload {
            tenant,
            file,
            name,
            folder,
            chunk_size,
        } => {
            let scope = TenantScope::new(tenant);
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(String::from)
                    .context("Cannot derive a name from the path; pass --name")?,
            };
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let stored = match chunk_size {
                Some(size) if size > 0 && data.len() > size => {
                    upload_chunked(runtime, scope, data, size, &name, folder).await?
                }
                _ => service.upload_whole(scope, data.into(), &name, folder).await?,
            };
            print_json(&stored)?;
        }
        Commands::Versions { tenant, id } => {
            let versions = service.list_versions(TenantScope::new(tenant), id).await?;
            for v in versions {
                println!(
                    "v{:<4} {}  {:>10}  {}{}  {}",
                    v.version_number,
                    v.upload_id,
                    format_bytes(v.size_bytes),
                    v.lifecycle_state,
                    if v.is_latest { " (latest)" } else { "" },
                    v.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
        Commands::Download { tenant, id, output } => {
            let (file, mut stream) = service.download(TenantScope::new(tenant), id).await?;
            let mut out = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("Failed to create {}", output.display()))?;
            while let Some(chunk) = stream.try_next().await? {
                out.write_all(&chunk).await?;
            }
            out.flush().await?;
            println!("{} -> {}", file.file_name, output.display());
        }
        Commands::RestoreVersion { tenant, id, target } => {
            let restored = service
                .restore_version(TenantScope::new(tenant), id, target)
                .await?;
            print_json(&restored)?;
        }
        Commands::Trash { tenant, ids } => {
            let n = service.soft_delete(TenantScope::new(tenant), &ids).await?;
            println!("{} rows trashed", n);
        }
        Commands::Untrash { tenant, ids } => {
            let n = service
                .restore_from_trash(TenantScope::new(tenant), &ids)
                .await?;
            println!("{} rows restored", n);
        }
        Commands::Purge { tenant, ids } => {
            let n = service.purge(TenantScope::new(tenant), &ids).await?;
            println!("{} rows purged", n);
        }
        Commands::Stats { tenant, format } => {
            let stats = service.get_storage_stats(TenantScope::new(tenant)).await?;
            match format.as_str() {
                "json" => print_json(&stats)?,
                _ => {
                    println!("Tenant:  {}", stats.tenant_id);
                    println!("Used:    {}", format_bytes(stats.used_bytes));
                    match stats.quota_bytes {
                        Some(quota) => {
                            println!("Quota:   {}", format_bytes(quota));
                            println!("Usage:   {:.2}%", stats.percentage);
                        }
                        None => println!("Quota:   unlimited"),
                    }
                }
            }
        }
        Commands::SetQuota {
            tenant,
            bytes,
            unlimited,
        } => {
            let quota = if unlimited { None } else { bytes };
            let stats = service.set_quota(TenantScope::new(tenant), quota).await?;
            print_json(&stats)?;
        }
        Commands::SweepStaging { ttl_secs } => {
            let assembler = service.assembler().clone();
            let sweeper = match ttl_secs {
                Some(ttl) => {
                    StagingSweeper::new(assembler, Duration::from_secs(ttl), Duration::from_secs(60))
                }
                None => StagingSweeper::from_config(assembler, &runtime.config),
            };
            let removed = sweeper.sweep_once().await?;
            println!("{} staging sessions removed", removed);
        }
        Commands::BackfillThumbnails { limit } => {
            let report = backfill_thumbnails(runtime, limit).await?;
            print_json(&report)?;
        }
    }
    Ok(())
}

async fn upload_chunked(
    runtime: &Runtime,
    scope: TenantScope,
    data: Vec<u8>,
    chunk_size: usize,
    name: &str,
    folder: Option<Uuid>,
) -> anyhow::Result<coffer_core::models::LogicalFile> {
    let service = &runtime.service;
    let total = u32::try_from(data.len().div_ceil(chunk_size))
        .context("Too many chunks for one upload")?;
    let session = service.initiate_chunked_upload(scope).await?;
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        service
            .upload_chunk(
                scope,
                session,
                index as u32,
                total,
                name,
                folder,
                bytes::Bytes::copy_from_slice(chunk),
            )
            .await
            .with_context(|| format!("Chunk {} of {} failed", index, total))?;
    }
    Ok(service.merge_chunks(scope, session, name, folder).await?)
}

/// Run preview jobs inline rather than through the queue so the report is complete.
async fn backfill_thumbnails(runtime: &Runtime, limit: i64) -> anyhow::Result<BackfillReport> {
    let files = runtime
        .service
        .catalog()
        .files_missing_thumbnails(&MediaKind::previewable_extensions(), limit)
        .await?;

    let processor = Arc::clone(&runtime.processor);
    let mut report = BackfillReport {
        scanned: files.len(),
        stored: 0,
        skipped: 0,
        orphaned: 0,
        failed: 0,
    };
    for file in &files {
        match processor.process(&ThumbnailJob::from(file)).await {
            Ok(ThumbnailOutcome::Stored(_)) => report.stored += 1,
            Ok(ThumbnailOutcome::Skipped) => report.skipped += 1,
            Ok(ThumbnailOutcome::Orphaned) => report.orphaned += 1,
            Err(e) => {
                tracing::warn!(upload_id = %file.upload_id, error = %e, "Preview failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
