use anyhow::Result;
use clap::{Parser, Subcommand};
use skusweep_core::DeleteCategory;
use skusweep_sync::{connect_pipeline, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "skusweep")]
#[command(about = "Reconcile duplicate SKUs across catalog, inventory, and document stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile every SKU known to the inventory source-of-truth.
    Full,
    /// Reconcile a comma-separated list of SKU identifiers.
    Skus {
        /// e.g. "sku1,sku2,sku3"
        list: String,
    },
    /// Consume a previously exported pending checkpoint and delete its rows.
    Delete {
        #[arg(value_parser = parse_category)]
        category: DeleteCategory,
    },
}

fn parse_category(value: &str) -> Result<DeleteCategory, String> {
    match value.to_ascii_uppercase().as_str() {
        "BT" | "BIGTICKET" => Ok(DeleteCategory::BigTicket),
        "SL" | "SOFTLINE" => Ok(DeleteCategory::SoftLine),
        other => Err(format!("unknown category {other:?}; expected BT or SL")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let pipeline = connect_pipeline(SyncConfig::from_env()).await?;

    match cli.command {
        Commands::Full => {
            let summary = pipeline.run_full().await?;
            println!(
                "run {} complete: candidates={} bt={} sl={} others={} invoked={} rows_deleted={}",
                summary.run_id,
                summary.candidate_skus,
                summary.big_ticket,
                summary.soft_line,
                summary.others,
                summary.notify.invoked,
                summary.big_ticket_rows_deleted + summary.soft_line_rows_deleted
            );
        }
        Commands::Skus { list } => {
            let skus: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
            let summary = pipeline.run_manual(&skus).await?;
            println!(
                "run {} complete: candidates={} bt={} sl={} others={} invoked={} rows_deleted={}",
                summary.run_id,
                summary.candidate_skus,
                summary.big_ticket,
                summary.soft_line,
                summary.others,
                summary.notify.invoked,
                summary.big_ticket_rows_deleted + summary.soft_line_rows_deleted
            );
        }
        Commands::Delete { category } => {
            let outcome = pipeline.deletion().delete_category(category).await?;
            println!("deletion outcome: {outcome:?}");
        }
    }

    Ok(())
}
