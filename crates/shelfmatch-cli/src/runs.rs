//! The `runs` subcommand: list recent match runs.

#[derive(Debug, clap::Args)]
pub struct RunsArgs {
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

pub async fn run(args: RunsArgs) -> anyhow::Result<()> {
    let pool = shelfmatch_db::connect_pool_from_env().await?;

    let rows = shelfmatch_db::list_match_runs(&pool, args.limit).await?;
    if rows.is_empty() {
        println!("no match runs recorded");
        return Ok(());
    }

    for row in &rows {
        let when = row
            .completed_at
            .or(row.started_at)
            .unwrap_or(row.created_at)
            .format("%Y-%m-%d %H:%M:%S");
        println!(
            "{}  {when}  {:<9}  {}  total {} / matched {} / no match {} / errors {}{}",
            row.public_id,
            row.status,
            row.strategy,
            row.total_items,
            row.succeeded,
            row.no_match,
            row.errors,
            row.error_message
                .as_deref()
                .map(|m| format!("  ({m})"))
                .unwrap_or_default()
        );
    }

    Ok(())
}
