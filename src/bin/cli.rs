//! Lightbox command-line interface

use anyhow::Result;
use clap::{Parser, Subcommand};
use lightbox_core::Core;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lightbox", about = "Event-sourced media asset catalog")]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Point the catalog at a media root (rehomes existing assets)
    Init {
        /// Media root directory
        root: PathBuf,
        /// Scan the root immediately after configuring it
        #[arg(short, long)]
        scan: bool,
    },

    /// Scan the configured root for new and changed files
    Scan,

    /// List all assets, newest first
    List,

    /// Full-text search over paths and metadata
    Search {
        /// FTS query (supports phrases and prefix matching)
        query: String,
    },

    /// Set an asset's workflow status
    Status { asset_id: String, status: String },

    /// Tag management
    #[command(subcommand)]
    Tag(TagCommands),

    /// Show the full derivation lineage of an asset
    Lineage { asset_id: String },

    /// Show the audit trail, optionally scoped to one asset
    History {
        asset_id: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Replay the shared event log and compact it
    Resync,

    /// Check consistency between the asset table and the search index
    Parity,
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Create a tag
    Create {
        name: String,
        #[arg(short, long)]
        color: Option<String>,
    },
    /// Delete a tag
    Delete { tag_id: String },
    /// List all tags
    List,
    /// Attach a tag to an asset
    Add { asset_id: String, tag_id: String },
    /// Detach a tag from an asset
    Remove { asset_id: String, tag_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let core = match cli.data_dir {
        Some(data_dir) => Core::new_with_config(data_dir).await?,
        None => Core::new().await?,
    };

    let result = run(&core, cli.command).await;
    core.shutdown().await?;
    result
}

async fn run(core: &Core, command: Commands) -> Result<()> {
    match command {
        Commands::Init { root, scan } => {
            core.set_root(root.clone()).await?;
            println!("Catalog root set to {:?}", root);
            if scan {
                let indexed = core.scan().await?;
                println!("Indexed {} assets", indexed);
            }
        }

        Commands::Scan => {
            let indexed = core.scan().await?;
            println!("Indexed {} assets", indexed);
        }

        Commands::List => {
            for asset in core.assets().await? {
                print_asset(&asset);
            }
        }

        Commands::Search { query } => {
            for asset in core.search(&query).await? {
                print_asset(&asset);
            }
        }

        Commands::Status { asset_id, status } => {
            core.update_asset_status(&asset_id, &status).await?;
            println!("{} -> {}", asset_id, status);
        }

        Commands::Tag(tag_command) => run_tag(core, tag_command).await?,

        Commands::Lineage { asset_id } => {
            for asset in core.lineage(&asset_id).await? {
                print_asset(&asset);
            }
        }

        Commands::History { asset_id, limit } => {
            let rows = match asset_id {
                Some(asset_id) => core.asset_history(&asset_id, limit).await?,
                None => core.recent_history(limit).await?,
            };
            for row in rows {
                let detail = match (&row.field, &row.old_value, &row.new_value) {
                    (Some(field), Some(old), Some(new)) => {
                        format!(" {}: {} -> {}", field, old, new)
                    }
                    (Some(field), _, Some(new)) => format!(" {}: {}", field, new),
                    (Some(field), Some(old), _) => format!(" {}: was {}", field, old),
                    _ => String::new(),
                };
                println!(
                    "{} {} {}{}",
                    row.timestamp, row.asset_id, row.action, detail
                );
            }
        }

        Commands::Resync => {
            core.resync().await?;
            println!("Resync complete");
        }

        Commands::Parity => {
            let parity = core.index_parity().await?;
            if parity.is_consistent() {
                println!(
                    "Consistent: {} assets, {} index rows",
                    parity.asset_rows, parity.index_rows
                );
            } else {
                println!(
                    "INCONSISTENT: {} assets, {} index rows, {} orphaned, {} stale",
                    parity.asset_rows, parity.index_rows, parity.orphan_rows, parity.stale_rows
                );
            }
        }
    }
    Ok(())
}

async fn run_tag(core: &Core, command: TagCommands) -> Result<()> {
    match command {
        TagCommands::Create { name, color } => {
            let tag = core.create_tag(&name, color).await?;
            println!("{} {}", tag.id, tag.name);
        }
        TagCommands::Delete { tag_id } => {
            if core.delete_tag(&tag_id).await? {
                println!("Deleted {}", tag_id);
            } else {
                println!("No such tag: {}", tag_id);
            }
        }
        TagCommands::List => {
            for tag in core.tags().await? {
                println!(
                    "{} {} {}",
                    tag.id,
                    tag.name,
                    tag.color.as_deref().unwrap_or("-")
                );
            }
        }
        TagCommands::Add { asset_id, tag_id } => {
            core.tag_asset(&asset_id, &tag_id).await?;
            println!("Tagged {} with {}", asset_id, tag_id);
        }
        TagCommands::Remove { asset_id, tag_id } => {
            core.untag_asset(&asset_id, &tag_id).await?;
            println!("Untagged {} from {}", asset_id, tag_id);
        }
    }
    Ok(())
}

fn print_asset(asset: &lightbox_core::domain::Asset) {
    let tags = if asset.tags.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = asset.tags.iter().map(|t| t.name.as_str()).collect();
        format!(" [{}]", names.join(", "))
    };
    println!(
        "{} {:5} {:8} {}{}",
        asset.id, asset.kind, asset.status, asset.path, tags
    );
}
