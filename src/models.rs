use std::fmt;

use serde::{Deserialize, Serialize};

/// Column order of the output file. Must match the field order of [`Listing`].
pub const CSV_HEADER: [&str; 7] = [
    "title",
    "address",
    "guide_price",
    "status",
    "auction_date",
    "lot_number",
    "url",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    ForSale,
    Sold,
    Withdrawn,
    #[default]
    Unknown,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::ForSale => "for_sale",
            ListingStatus::Sold => "sold",
            ListingStatus::Withdrawn => "withdrawn",
            ListingStatus::Unknown => "unknown",
        }
    }

    /// Sold and withdrawn lots are no longer available to bid on.
    pub fn is_closed(&self) -> bool {
        matches!(self, ListingStatus::Sold | ListingStatus::Withdrawn)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property or lot page, as extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Listing {
    pub title: Option<String>,
    pub address: Option<String>,
    pub guide_price: Option<String>,
    pub status: ListingStatus,
    pub auction_date: Option<String>,
    pub lot_number: Option<String>,
    pub url: String,
}

impl Listing {
    pub fn new(url: &str) -> Self {
        Listing {
            url: url.to_string(),
            ..Default::default()
        }
    }
}
