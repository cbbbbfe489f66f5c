//! Fetch one feed, normalize it and print each article with its summaries.
//!
//!   cargo run --bin fetch_feed -- https://www.cbc.ca/cmlink/rss-canada

use clap::{Parser, ValueEnum};
use common::{FeedConfig, FeedFormat, FetchConfig};

use wirefeed::clock::{Clock, SystemClock};
use wirefeed::fetcher::{HttpFetcher, SourceFetcher};
use wirefeed::normalize::normalize;
use wirefeed::summarize::summarize;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Rss,
    Headlines,
}

#[derive(Parser, Debug)]
#[command(name = "fetch_feed", about = "Fetch and normalize a single feed")]
struct Args {
    /// Feed URL
    url: String,

    #[arg(long, value_enum, default_value = "rss")]
    format: Format,

    /// Sentences per summary
    #[arg(long, default_value_t = 2)]
    sentences: usize,

    /// Articles to print
    #[arg(long, default_value_t = 5)]
    limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let source = FeedConfig {
        url: args.url.clone(),
        title: None,
        format: match args.format {
            Format::Rss => FeedFormat::Rss,
            Format::Headlines => FeedFormat::Headlines,
        },
    };

    let fetcher = HttpFetcher::new(&FetchConfig::default())?;
    println!("\n{}", "=".repeat(60));
    println!("Fetching: {}", source.url);
    println!("{}", "=".repeat(60));

    let items = match fetcher.fetch(&source).await {
        Ok(items) => items,
        Err(e) => {
            println!("✗ Failed ({}): {}", e.class(), e);
            return Ok(());
        }
    };
    println!("✓ {} items", items.len());

    let now = SystemClock.now();
    for (i, raw) in items.iter().take(args.limit).enumerate() {
        let article = normalize(raw, now);
        println!("\n  {}. {}", i + 1, article.title);
        println!("     Source:    {}", article.source);
        println!("     Link:      {}", article.link);
        println!("     Published: {}", article.published_at.to_rfc3339());
        if let Some(image) = &article.image {
            println!("     Image:     {}", image);
        }
        let text = if article.raw_content.is_empty() {
            &article.title
        } else {
            &article.raw_content
        };
        println!("     Summary:   {}", summarize(text, args.sentences));
    }
    Ok(())
}
