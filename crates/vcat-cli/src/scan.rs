use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use vcat_scraper::{DomainLimiter, ExtractionRules, NavNode, NodeKind, PageClient, StructureScanner};

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Root URL to scan from.
    #[arg(long)]
    pub url: String,
    /// Descend to the configured depth bound instead of one level.
    #[arg(long)]
    pub deep: bool,
}

pub async fn run(args: ScanArgs) -> anyhow::Result<()> {
    let config = vcat_core::load_app_config()?;

    let limiter = Arc::new(DomainLimiter::new(Duration::from_millis(
        config.crawler_inter_request_delay_ms,
    )));
    let client = PageClient::new(
        config.crawler_request_timeout_secs,
        &config.crawler_user_agent,
        config.crawler_max_retries,
        config.crawler_retry_backoff_base_secs,
        limiter,
    )?;
    let rules = ExtractionRules::default();
    let depth = if args.deep { config.scan_max_depth } else { 1 };

    let scanner = StructureScanner::new(&client, &rules, depth);
    let tree = scanner.scan(&args.url).await?;
    print_tree(&tree, 0);

    Ok(())
}

fn print_tree(node: &NavNode, indent: usize) {
    let marker = match node.kind {
        NodeKind::Category => '+',
        NodeKind::Product => '-',
    };
    println!("{:width$}{marker} {} ({})", "", node.name, node.url, width = indent * 2);
    for child in &node.children {
        print_tree(child, indent + 1);
    }
}
