//! The `items` subcommand: list detected items and their selections.

use uuid::Uuid;

use shelfmatch_db::ItemFilter;

#[derive(Debug, clap::Args)]
pub struct ItemsArgs {
    /// Restrict to items from one source image
    #[arg(long)]
    image: Option<Uuid>,

    /// Only show items without a selected match
    #[arg(long)]
    unmatched_only: bool,

    #[arg(long, default_value_t = 50)]
    limit: i64,
}

pub async fn run(args: ItemsArgs) -> anyhow::Result<()> {
    let pool = shelfmatch_db::connect_pool_from_env().await?;

    let rows = shelfmatch_db::list_items(
        &pool,
        ItemFilter {
            image_id: args.image,
            include_matched: !args.unmatched_only,
        },
        args.limit,
    )
    .await?;

    if rows.is_empty() {
        println!("no items found");
        return Ok(());
    }

    for row in &rows {
        let label = [row.brand.as_deref(), row.product_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let label = if label.is_empty() {
            "(no metadata)"
        } else {
            label.as_str()
        };

        match (&row.selected_catalog_key, &row.selected_tier) {
            (Some(key), Some(tier)) => {
                let confidence = row
                    .selected_confidence
                    .map(|c| format!(" {c:.2}"))
                    .unwrap_or_default();
                println!("{}  {label}  -> {key} ({tier}{confidence})", row.id);
            }
            _ => println!("{}  {label}  -> unmatched", row.id),
        }
    }

    Ok(())
}
