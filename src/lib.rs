pub mod archiver;
pub mod cli;
pub mod config;
pub mod discover;
pub mod fetcher;
pub mod filter;
pub mod logger;
pub mod models;
pub mod parser;
pub mod pipeline;

pub use archiver::ListingWriter;
pub use config::{CrawlConfig, StatusRules, Variant};
pub use fetcher::{FetchError, Fetcher, PageSource};
pub use models::{Listing, ListingStatus};
pub use parser::Extractor;
pub use pipeline::RunSummary;

use std::process::ExitCode;

/// Shared entry point of both binaries: parse flags, crawl, map the outcome
/// to an exit code.
pub fn main_for(variant: Variant) -> ExitCode {
    logger::init();

    let config = match cli::parse_args(variant, std::env::args().skip(1)) {
        Ok(cli::Command::Run(config)) => config,
        Ok(cli::Command::Help) => {
            println!("{}", cli::usage(variant));
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("{}", cli::usage(variant));
            return ExitCode::from(variant.failure_code());
        }
    };

    match pipeline::run(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Scrape failed: {e:#}");
            ExitCode::from(variant.failure_code())
        }
    }
}
