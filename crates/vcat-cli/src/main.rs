mod crawl;
mod purge;
mod scan;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "vcat")]
#[command(about = "Vendor catalog crawl pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a bulk extraction job for a profile and wait for the result.
    Crawl(crawl::CrawlArgs),
    /// Print a site's discovered category/product structure.
    Scan(scan::ScanArgs),
    /// Delete a terminal job together with its staged and catalog data.
    Purge(purge::PurgeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Crawl(args) => crawl::run(args).await,
        Commands::Scan(args) => scan::run(args).await,
        Commands::Purge(args) => purge::run(args).await,
    }
}
