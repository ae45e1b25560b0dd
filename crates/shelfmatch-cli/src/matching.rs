//! The `match` subcommand: run the matching pipeline over pending items,
//! streaming progress to stdout.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use shelfmatch_catalog::CatalogClient;
use shelfmatch_core::{DetectedItem, MatchStrategy, RetailerRegistry};
use shelfmatch_db::ItemFilter;
use shelfmatch_pipeline::{execute_match_run, MatchDeps, ProgressEvent};
use shelfmatch_vision::VisionClient;

#[derive(Debug, clap::Args)]
pub struct MatchArgs {
    /// Restrict the run to items from one source image
    #[arg(long)]
    image: Option<Uuid>,

    /// Selection strategy: "tiered" or "joint" (defaults to config)
    #[arg(long)]
    strategy: Option<String>,

    /// Concurrent item pipelines (clamped to the supported range)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Maximum number of items to process
    #[arg(long, default_value_t = 100)]
    limit: i64,

    /// Also re-run items that already hold a selected match
    #[arg(long)]
    rematch: bool,
}

pub async fn run(args: MatchArgs) -> anyhow::Result<()> {
    let config = shelfmatch_core::load_app_config()?;

    let strategy = match args.strategy.as_deref() {
        None => config.match_strategy,
        Some(raw) => MatchStrategy::from_str(raw)?,
    };
    let concurrency = shelfmatch_pipeline::clamp_concurrency(
        args.concurrency.unwrap_or(config.match_max_concurrent_items),
    );

    let pool_config = shelfmatch_db::PoolConfig::from_app_config(&config);
    let pool = shelfmatch_db::connect_pool(&config.database_url, pool_config).await?;
    shelfmatch_db::run_migrations(&pool).await?;

    let retailers = shelfmatch_core::load_retailers(&config.retailers_path)?;
    let registry = RetailerRegistry::from_file(&retailers);

    let rows = shelfmatch_db::list_items(
        &pool,
        ItemFilter {
            image_id: args.image,
            include_matched: args.rematch,
        },
        args.limit,
    )
    .await?;

    if rows.is_empty() {
        println!("no items to match");
        return Ok(());
    }

    let items: Vec<DetectedItem> = rows
        .iter()
        .map(|row| {
            let mut item = row.to_detected_item();
            item.retailer = item.retailer.map(|r| registry.canonicalize(&r));
            item
        })
        .collect();

    let catalog = Arc::new(CatalogClient::new(
        &config.catalog_base_url,
        config.catalog_api_key.as_deref(),
        config.catalog_timeout_secs,
        config.match_max_retries,
        config.match_retry_backoff_base_ms,
    )?);
    let vision = Arc::new(VisionClient::new(
        &config.vision_base_url,
        config.vision_api_key.as_deref(),
        config.vision_timeout_secs,
        config.match_max_retries,
        config.match_retry_backoff_base_ms,
    )?);

    let deps = Arc::new(MatchDeps {
        pool: pool.clone(),
        catalog,
        vision,
        strategy,
        search_limit: config.catalog_search_limit,
    });

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let run_row =
        shelfmatch_db::create_match_run(&pool, strategy.as_str(), "cli", items.len() as i32)
            .await?;
    println!(
        "match run {} ({} items, strategy {strategy}, concurrency {concurrency})",
        run_row.public_id,
        items.len()
    );

    let (events_tx, events_rx) = mpsc::channel::<ProgressEvent>(64);
    let printer = tokio::spawn(print_progress(events_rx));

    let summary = execute_match_run(deps, items, run_row.id, concurrency, events_tx).await?;
    printer.await?;

    if summary.counters.errors > 0 {
        anyhow::bail!(
            "{} of {} items failed — see output above",
            summary.counters.errors,
            summary.total
        );
    }
    Ok(())
}

async fn print_progress(mut events_rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = events_rx.recv().await {
        match event {
            ProgressEvent::Start { total } => println!("matching {total} items..."),
            ProgressEvent::Progress {
                processed,
                total,
                item_id,
                outcome,
                detail,
                ..
            } => {
                let detail = detail.map(|d| format!(" — {d}")).unwrap_or_default();
                println!("[{processed}/{total}] {item_id}: {outcome}{detail}");
            }
            ProgressEvent::Complete { summary } => {
                println!(
                    "done: {} matched, {} no match, {} errors",
                    summary.counters.succeeded, summary.counters.no_match, summary.counters.errors
                );
                for report in summary.items.iter().filter(|r| r.outcome == "error") {
                    println!(
                        "  failed {}: {}",
                        report.item_id,
                        report.detail.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            ProgressEvent::Error { message } => eprintln!("run error: {message}"),
        }
    }
}
