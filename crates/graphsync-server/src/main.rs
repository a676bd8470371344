//! CLI entry point for graphsync.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use graphsync_core::config::GraphSyncConfig;
use graphsync_core::{RdfSyntax, UserAttributes};
use graphsync_cqrs::UpdateContext;
use graphsync_server::Daemon;

#[derive(Parser)]
#[command(name = "graphsync")]
#[command(about = "Label-aware RDF store replication over a durable topic")]
struct Cli {
    /// Config file prefix (default: graphsync).
    #[arg(short, long, default_value = "graphsync")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply topic messages to every configured store.
    Consume {
        /// Apply what is waiting and exit instead of polling.
        #[arg(long)]
        once: bool,
    },

    /// Publish an RDF file as a patch on the update topic.
    Update {
        #[arg(short, long)]
        store: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Media type of the file; guessed from its extension when absent.
        #[arg(long)]
        content_type: Option<String>,

        /// Label expression forwarded as the `Security-Label` header.
        #[arg(long)]
        security_label: Option<String>,

        #[arg(long)]
        request_id: Option<String>,

        /// Caller attributes, e.g. "role=admin, clearance=secret".
        #[arg(long)]
        user: Option<String>,

        /// Publish deletes instead of adds.
        #[arg(long)]
        delete: bool,
    },

    /// Manage store backups.
    Backups {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// List backups, newest first.
    List,
    /// Check a backup against its checksum.
    Verify { path: PathBuf },
    /// Show size, checksum status and recorded offsets of a backup.
    Details { name: String },
    /// Delete a backup and its sidecar files.
    Delete { name: String },
    /// Roll a store back to a backup and its offsets, then checkpoint it
    /// so the next start recovers from there.
    Restore { name: String },
    /// Catch up with the topic, then back up all stores or one.
    Create {
        #[arg(short, long)]
        store: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = GraphSyncConfig::load(&cli.config)?;

    match cli.command {
        Command::Consume { once } => consume(config, once).await,
        Command::Update {
            store,
            file,
            content_type,
            security_label,
            request_id,
            user,
            delete,
        } => {
            let ctx = UpdateContext {
                request_id,
                security_label,
                user: user.as_deref().map(UserAttributes::parse).transpose()?,
            };
            update(config, &store, &file, content_type.as_deref(), ctx, delete).await
        }
        Command::Backups { action } => backups(config, action).await,
    }
}

async fn consume(config: GraphSyncConfig, once: bool) -> anyhow::Result<()> {
    let on_shutdown = config.backup.on_shutdown;
    let daemon = Daemon::open(config)?;
    daemon.recover()?;

    if once {
        let reports = tokio::task::spawn_blocking(move || {
            let reports = daemon.drain()?;
            if on_shutdown {
                daemon.backup(None)?;
            }
            Ok::<_, graphsync_server::ServerError>(reports)
        })
        .await??;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Signal handler failed");
        }
        tracing::info!("Shutdown requested");
        let _ = tx.send(true);
    });
    daemon.run(rx).await?;
    Ok(())
}

async fn update(
    config: GraphSyncConfig,
    store: &str,
    file: &Path,
    content_type: Option<&str>,
    ctx: UpdateContext,
    delete: bool,
) -> anyhow::Result<()> {
    let syntax = match content_type {
        Some(ct) => RdfSyntax::from_media_type(ct)
            .ok_or_else(|| anyhow::anyhow!("Unsupported content type: {ct}"))?,
        None => syntax_from_extension(file)?,
    };
    let body = std::fs::read(file)?;

    let daemon = Daemon::open(config)?;
    let store = daemon.registry().get(store)?;
    let pipeline = daemon.pipeline();
    let outcome = if delete {
        let quads = graphsync_ingest::parser::parse_all(
            syntax,
            &graphsync_ingest::parser::base_iri(pipeline.topic()),
            &body,
        )?;
        pipeline.delete_data(store, &ctx, quads).await?
    } else {
        pipeline.load(store, &ctx, syntax, &body).await?
    };

    if pipeline.is_connected() {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

async fn backups(config: GraphSyncConfig, action: BackupAction) -> anyhow::Result<()> {
    match action {
        BackupAction::List => {
            let dir = graphsync_backup::resolve_dir(config.backup.dir.as_deref());
            let entries = graphsync_backup::list(&dir)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        BackupAction::Verify { path } => {
            if graphsync_backup::verify(&path)? {
                println!("{}: ok", path.display());
            } else {
                anyhow::bail!("{}: checksum mismatch", path.display());
            }
        }
        BackupAction::Details { name } => {
            let dir = graphsync_backup::resolve_dir(config.backup.dir.as_deref());
            let details = graphsync_backup::details(&dir, &name)?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        BackupAction::Delete { name } => {
            let dir = graphsync_backup::resolve_dir(config.backup.dir.as_deref());
            let entry = graphsync_backup::delete(&dir, &name)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        BackupAction::Restore { name } => {
            let daemon = Daemon::open(config)?;
            let report = tokio::task::spawn_blocking(move || {
                let report = daemon.restore_backup(&name)?;
                daemon.backup(Some(&report.store))?;
                Ok::<_, graphsync_server::ServerError>(report)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        BackupAction::Create { store } => {
            let daemon = Daemon::open(config)?;
            let names = tokio::task::spawn_blocking(move || {
                daemon.recover()?;
                daemon.drain()?;
                daemon.backup(store.as_deref())
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
    }
    Ok(())
}

fn syntax_from_extension(file: &Path) -> anyhow::Result<RdfSyntax> {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "ttl" => Ok(RdfSyntax::Turtle),
        "nt" => Ok(RdfSyntax::NTriples),
        "nq" => Ok(RdfSyntax::NQuads),
        "trig" => Ok(RdfSyntax::TriG),
        "rdf" | "owl" | "xml" => Ok(RdfSyntax::RdfXml),
        _ => anyhow::bail!(
            "Cannot tell the syntax of {}; pass --content-type",
            file.display()
        ),
    }
}
