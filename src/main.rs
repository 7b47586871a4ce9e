use std::process::ExitCode;

use auction_scraper::Variant;

fn main() -> ExitCode {
    auction_scraper::main_for(Variant::Sitemap)
}
