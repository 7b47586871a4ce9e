use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::models::ListingStatus;

pub const DEFAULT_SITEMAP_URL: &str = "https://www.auctionhouse.co.uk/sitemap.xml";
pub const DEFAULT_LANDING_URL: &str = "https://www.auctionhouse.co.uk/national";
pub const DEFAULT_DELAY_SECS: f64 = 0.75;

const SITEMAP_USER_AGENT: &str = "auction-scraper/0.1 (+https://example.com/contact)";
const LANDING_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Which entry point is running. Decides the discovery strategy and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Sitemap,
    Landing,
}

impl Variant {
    pub fn default_root(&self) -> &'static str {
        match self {
            Variant::Sitemap => DEFAULT_SITEMAP_URL,
            Variant::Landing => DEFAULT_LANDING_URL,
        }
    }

    pub fn default_output(&self) -> &'static str {
        match self {
            Variant::Sitemap => "auctionhouse_properties.csv",
            Variant::Landing => "national_lots.csv",
        }
    }

    pub fn default_user_agent(&self) -> &'static str {
        match self {
            Variant::Sitemap => SITEMAP_USER_AGENT,
            Variant::Landing => LANDING_USER_AGENT,
        }
    }

    /// Process exit code used when the run fails.
    pub fn failure_code(&self) -> u8 {
        match self {
            Variant::Sitemap => 1,
            Variant::Landing => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub variant: Variant,
    pub root_url: String,
    pub output: PathBuf,
    pub delay: Duration,
    pub limit: Option<usize>,
    pub include_sold: bool,
    pub user_agent: String,
    pub status_rules: StatusRules,
}

impl CrawlConfig {
    pub fn new(variant: Variant) -> Self {
        CrawlConfig {
            variant,
            root_url: variant.default_root().to_string(),
            output: PathBuf::from(variant.default_output()),
            delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
            limit: None,
            include_sold: false,
            user_agent: variant.default_user_agent().to_string(),
            status_rules: StatusRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusRule {
    pub keyword: String,
    pub status: ListingStatus,
}

/// Ordered keyword table mapping free page text onto [`ListingStatus`].
/// The first keyword contained in the text wins.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRules {
    rules: Vec<StatusRule>,
}

impl StatusRules {
    pub fn new(rules: Vec<StatusRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| StatusRule {
                keyword: r.keyword.trim().to_lowercase(),
                status: r.status,
            })
            .filter(|r| !r.keyword.is_empty())
            .collect();
        StatusRules { rules }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<StatusRule> =
            serde_json::from_str(json).context("Status rules must be a JSON array of {keyword, status}")?;
        if rules.is_empty() {
            bail!("Status rules file contains no rules");
        }
        Ok(StatusRules::new(rules))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read status rules from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid status rules in {}", path.display()))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.keyword.as_str())
    }

    /// Maps status text onto a status. Text matching no keyword is unknown.
    pub fn classify(&self, text: &str) -> ListingStatus {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| text.contains(&r.keyword))
            .map(|r| r.status)
            .unwrap_or(ListingStatus::Unknown)
    }
}

impl Default for StatusRules {
    fn default() -> Self {
        use ListingStatus::*;
        let table = [
            ("unsold", ForSale),
            ("unavailable", Withdrawn),
            ("not available", Withdrawn),
            ("no longer available", Withdrawn),
            ("available", ForSale),
            ("for sale", ForSale),
            ("bidding open", ForSale),
            ("instock", ForSale),
            ("withdrawn", Withdrawn),
            ("postponed", Withdrawn),
            ("sold prior", Sold),
            ("sold", Sold),
            ("exchanged", Sold),
            ("completed", Sold),
            ("contracted", Sold),
        ];
        StatusRules::new(
            table
                .iter()
                .map(|(keyword, status)| StatusRule {
                    keyword: keyword.to_string(),
                    status: *status,
                })
                .collect(),
        )
    }
}
