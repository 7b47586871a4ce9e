use anyhow::{Result, anyhow};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::config::StatusRules;
use crate::models::{Listing, ListingStatus};

const JSON_LD_TYPES: [&str; 5] = ["Product", "RealEstateListing", "Offer", "SingleFamilyResidence", "House"];
const ADDRESS_KEYS: [&str; 6] = [
    "name",
    "streetAddress",
    "addressLocality",
    "addressRegion",
    "postalCode",
    "addressCountry",
];

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css}: {e:?}"))
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        let value = re.captures(text)?.get(1)?.as_str().trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn element_text(el: ElementRef) -> Option<String> {
    let text = el
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Visible text of the document, one text node per line.
fn page_text(doc: &Html) -> String {
    doc.root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent()?;
            if let Some(el) = parent.value().as_element() {
                if matches!(el.name(), "script" | "style" | "noscript") {
                    return None;
                }
            }
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fields found in schema.org JSON-LD blocks.
#[derive(Debug, Default, PartialEq)]
struct JsonLdFields {
    title: Option<String>,
    address: Option<String>,
    guide_price: Option<String>,
    status_text: Option<String>,
    auction_date: Option<String>,
    lot_number: Option<String>,
}

fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_listing_type(obj: &Value) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => JSON_LD_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| JSON_LD_TYPES.contains(&t)),
        _ => false,
    }
}

fn flatten_address(address: &Value) -> Option<String> {
    if address.is_string() {
        return value_text(Some(address));
    }
    let parts: Vec<String> = ADDRESS_KEYS
        .iter()
        .filter_map(|key| value_text(address.get(key)))
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn collect_json_ld(payload: Value, out: &mut Vec<Value>) {
    match payload {
        Value::Array(items) => items.into_iter().for_each(|item| collect_json_ld(item, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_json_ld(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn fields_from_json_ld(payloads: &[Value]) -> JsonLdFields {
    let Some(primary) = payloads.iter().find(|p| has_listing_type(p)) else {
        return JsonLdFields::default();
    };

    let offers = match primary.get("offers") {
        Some(Value::Array(list)) => list.first(),
        other => other,
    };
    let offer_field = |key: &str| value_text(offers.and_then(|o| o.get(key)));

    JsonLdFields {
        title: value_text(primary.get("name")),
        address: primary.get("address").and_then(flatten_address),
        guide_price: offer_field("price"),
        status_text: offer_field("availability").or_else(|| value_text(primary.get("availability"))),
        auction_date: offer_field("validFrom").or_else(|| value_text(primary.get("releaseDate"))),
        lot_number: value_text(primary.get("sku")).or_else(|| value_text(primary.get("productID"))),
    }
}

/// Pulls listing fields out of property and lot pages.
///
/// Every field is looked up independently: structured JSON-LD first, then
/// headings, class names and text patterns. A field that cannot be found is
/// left empty.
pub struct Extractor {
    rules: StatusRules,
    json_ld: Selector,
    headings: Vec<Selector>,
    address: Selector,
    text_blocks: Selector,
    status: Selector,
    postcode: Regex,
    guide_price: Vec<Regex>,
    auction_date: Vec<Regex>,
    lot_number: Vec<Regex>,
}

impl Extractor {
    pub fn new(rules: StatusRules) -> Result<Self> {
        Ok(Extractor {
            rules,
            json_ld: selector(r#"script[type="application/ld+json"]"#)?,
            headings: vec![selector("h1")?, selector("h2")?, selector("title")?],
            address: selector("address, [class*=address], [class*=Address]")?,
            text_blocks: selector("p, div, span, li")?,
            status: selector("[class*=status], [class*=availability], [class*=flag], [class*=badge]")?,
            postcode: Regex::new(r"\b[A-Z]{1,2}\d[\dA-Z]?\s*\d[A-Z]{2}\b")?,
            guide_price: vec![Regex::new(
                r"(?i)Guide\s*Price\s*[:\-]?\s*(£?\s?[\d,]+(?:\.\d{2})?(?:\s*(?:to|-)\s*£?\s?[\d,]+(?:\.\d{2})?)?\+?)",
            )?],
            auction_date: vec![
                Regex::new(r"(?i)Auction\s*Date\s*[:\-]?\s*([^\n]+)")?,
                Regex::new(r"(?i)Bidding\s+closes\s*[:\-]?\s*([^\n]+)")?,
                Regex::new(r"(?i)\bCloses\s*[:\-]?\s*([^\n]+)")?,
            ],
            lot_number: vec![
                Regex::new(r"(?i)\bLot\s+Number\s*[:#\-]?\s*([\w-]+)")?,
                Regex::new(r"(?i)\bLot\s*#?\s*(\d+)")?,
            ],
        })
    }

    pub fn extract(&self, html: &str, url: &str) -> Listing {
        let doc = Html::parse_document(html);
        let text = page_text(&doc);
        let json_ld = fields_from_json_ld(&self.json_ld_payloads(&doc));

        Listing {
            title: json_ld.title.or_else(|| self.title(&doc)),
            address: json_ld.address.or_else(|| self.address(&doc)),
            guide_price: json_ld
                .guide_price
                .or_else(|| first_capture(&self.guide_price, &text)),
            status: self.status(&doc, json_ld.status_text.as_deref(), &text),
            auction_date: json_ld
                .auction_date
                .or_else(|| first_capture(&self.auction_date, &text)),
            lot_number: json_ld
                .lot_number
                .or_else(|| first_capture(&self.lot_number, &text)),
            url: url.to_string(),
        }
    }

    fn json_ld_payloads(&self, doc: &Html) -> Vec<Value> {
        let mut payloads = Vec::new();
        for script in doc.select(&self.json_ld) {
            let body = script.text().collect::<String>();
            match serde_json::from_str::<Value>(&body) {
                Ok(parsed) => collect_json_ld(parsed, &mut payloads),
                Err(e) => log::debug!("Ignoring malformed JSON-LD block: {e}"),
            }
        }
        payloads
    }

    fn title(&self, doc: &Html) -> Option<String> {
        self.headings
            .iter()
            .find_map(|sel| doc.select(sel).find_map(element_text))
    }

    fn address(&self, doc: &Html) -> Option<String> {
        if let Some(address) = doc.select(&self.address).find_map(element_text) {
            return Some(address);
        }
        // Innermost block carrying a UK postcode.
        doc.select(&self.text_blocks)
            .filter_map(element_text)
            .filter(|text| self.postcode.is_match(text))
            .min_by_key(|text| text.len())
    }

    /// Status sources in priority order: status-like elements, JSON-LD
    /// availability, then the first keyword occurring in the page text.
    fn status(&self, doc: &Html, json_ld_status: Option<&str>, text: &str) -> ListingStatus {
        let from_elements = doc
            .select(&self.status)
            .filter_map(element_text)
            .map(|t| self.rules.classify(&t))
            .find(|s| *s != ListingStatus::Unknown);
        if let Some(status) = from_elements {
            return status;
        }

        if let Some(status) = json_ld_status.map(|t| self.rules.classify(t)) {
            if status != ListingStatus::Unknown {
                return status;
            }
        }

        let lower = text.to_lowercase();
        let earliest = self
            .rules
            .keywords()
            .filter_map(|kw| lower.find(kw))
            .min();
        match earliest {
            Some(pos) => {
                let line_start = lower[..pos].rfind('\n').map_or(0, |i| i + 1);
                let line_end = lower[pos..].find('\n').map_or(lower.len(), |i| pos + i);
                self.rules.classify(&lower[line_start..line_end])
            }
            None => ListingStatus::Unknown,
        }
    }
}
