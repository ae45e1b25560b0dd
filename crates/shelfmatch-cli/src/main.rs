mod items;
mod matching;
mod runs;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "shelfmatch-cli")]
#[command(about = "Shelfmatch command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the matching pipeline over detected items
    Match(matching::MatchArgs),
    /// List detected items and their selected matches
    Items(items::ItemsArgs),
    /// List recent match runs
    Runs(runs::RunsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Match(args) => matching::run(args).await,
        Commands::Items(args) => items::run(args).await,
        Commands::Runs(args) => runs::run(args).await,
    }
}
