use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::archiver::ListingWriter;
use crate::config::{CrawlConfig, Variant};
use crate::discover;
use crate::fetcher::{Fetcher, PageSource};
use crate::filter;
use crate::parser::Extractor;

/// Counters for one crawl.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub fetch_failures: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub written: usize,
}

/// Runs a full crawl against the live site described by `config`.
///
/// The output file is opened before anything is fetched, so an unwritable
/// path fails the run without touching the network.
pub fn run(config: &CrawlConfig) -> Result<RunSummary> {
    let mut writer = ListingWriter::open(&config.output)?;
    let fetcher = Fetcher::new(&config.user_agent, config.delay).context("Failed to build HTTP client")?;
    let extractor = Extractor::new(config.status_rules.clone())?;

    let summary = crawl(&fetcher, config, &extractor, &mut writer)?;
    info!(
        "Wrote {} records to {} ({} filtered, {} failed)",
        summary.written,
        writer.path().display(),
        summary.filtered_out,
        summary.fetch_failures
    );
    Ok(summary)
}

/// Discovers candidate URLs from `config.root_url` and processes them.
pub fn crawl<S: PageSource>(
    source: &S,
    config: &CrawlConfig,
    extractor: &Extractor,
    writer: &mut ListingWriter,
) -> Result<RunSummary> {
    let mut urls = match config.variant {
        Variant::Sitemap => discover::discover_sitemap_urls(source, &config.root_url)?,
        Variant::Landing => discover::discover_lot_urls(source, &config.root_url)?,
    };
    let discovered = urls.len();
    if let Some(limit) = config.limit {
        urls.truncate(limit);
    }

    let mut summary = process_urls(source, &urls, extractor, writer, config.include_sold)?;
    summary.discovered = discovered;
    Ok(summary)
}

/// Fetches, extracts, filters and writes each URL in order. A page that
/// fails to fetch is logged and skipped; a failed write aborts the run.
pub fn process_urls<S: PageSource>(
    source: &S,
    urls: &[String],
    extractor: &Extractor,
    writer: &mut ListingWriter,
    include_sold: bool,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        discovered: urls.len(),
        ..Default::default()
    };
    let total = urls.len();

    for (idx, url) in urls.iter().enumerate() {
        summary.processed += 1;
        info!("[{}/{}] Fetching {}", idx + 1, total, url);

        let html = match source.fetch_html(url) {
            Ok(html) => html,
            Err(e) => {
                warn!("Skipping {url}: {e}");
                summary.fetch_failures += 1;
                continue;
            }
        };

        let listing = extractor.extract(&html, url);
        if !filter::should_keep(&listing, include_sold) {
            debug!("Dropping {url}: status {}", listing.status);
            summary.filtered_out += 1;
            continue;
        }

        if writer.append(&listing)? {
            summary.written += 1;
            info!(
                "Collected lot {} from {}",
                listing.lot_number.as_deref().unwrap_or("?"),
                url
            );
        } else {
            summary.duplicates += 1;
        }
    }

    Ok(summary)
}
