use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use scraper::{Html, Selector};
use url::Url;

use crate::fetcher::PageSource;

/// Upper bound on sitemap documents fetched in one walk.
pub const MAX_SITEMAPS: usize = 100;

pub const LOT_PATH_MARKER: &str = "/lot/details/";
pub const LOT_HOST: &str = "online.auctionhouse.co.uk";

#[derive(Debug, PartialEq)]
pub enum Sitemap {
    /// `<sitemapindex>`: locations of further sitemaps.
    Index(Vec<String>),
    /// `<urlset>`: locations of pages.
    UrlSet(Vec<String>),
}

/// Parses a sitemap body. Returns `None` when it is neither an index nor a url set.
pub fn parse_sitemap(xml: &str) -> Option<Sitemap> {
    let doc = Html::parse_document(xml);
    let index_sel = Selector::parse("sitemapindex").ok()?;
    let urlset_sel = Selector::parse("urlset").ok()?;
    let loc_sel = Selector::parse("loc").ok()?;

    let locs = || {
        doc.select(&loc_sel)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    };

    if doc.select(&index_sel).next().is_some() {
        Some(Sitemap::Index(locs()))
    } else if doc.select(&urlset_sel).next().is_some() {
        Some(Sitemap::UrlSet(locs()))
    } else {
        None
    }
}

pub fn looks_like_property_url(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        Err(_) => return false,
    };
    path.contains("/property/") || path.contains("/properties/")
}

/// Walks the sitemap graph breadth-first from `root` and returns every
/// property page URL, in the order first seen.
///
/// The root must be reachable and parse as a sitemap. Nested sitemaps that
/// fail are logged and skipped.
pub fn discover_sitemap_urls<S: PageSource>(source: &S, root: &str) -> Result<Vec<String>> {
    let mut queue = VecDeque::from([root.to_string()]);
    let mut queued: HashSet<String> = HashSet::from([root.to_string()]);
    let mut seen_pages = HashSet::new();
    let mut pages = Vec::new();
    let mut fetched = 0;

    while let Some(current) = queue.pop_front() {
        let is_root = fetched == 0;
        fetched += 1;
        info!("Fetching sitemap: {current}");

        let body = match source.fetch_html(&current) {
            Ok(body) => body,
            Err(e) if is_root => return Err(e).context("Could not read root sitemap"),
            Err(e) => {
                warn!("Skipping sitemap: {e}");
                continue;
            }
        };

        match parse_sitemap(&body) {
            Some(Sitemap::Index(locs)) => {
                for loc in locs {
                    if !loc.ends_with(".xml") || queued.contains(&loc) {
                        continue;
                    }
                    if queued.len() >= MAX_SITEMAPS {
                        warn!("Skipping sitemap {loc}; limit of {MAX_SITEMAPS} reached");
                        continue;
                    }
                    queued.insert(loc.clone());
                    queue.push_back(loc);
                }
            }
            Some(Sitemap::UrlSet(locs)) => {
                for loc in locs {
                    if looks_like_property_url(&loc) && seen_pages.insert(loc.clone()) {
                        pages.push(loc);
                    }
                }
            }
            None if is_root => return Err(anyhow!("{current} is not a sitemap")),
            None => warn!("Could not parse sitemap {current}"),
        }
    }

    info!("Discovered {} property URLs in {fetched} sitemaps", pages.len());
    Ok(pages)
}

/// Extracts unique lot detail URLs from a landing page, canonicalised to
/// `scheme://host/path`.
pub fn find_lot_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        warn!("Invalid base URL: {base_url}");
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let Ok(anchor_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in doc.select(&anchor_sel) {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if !href.contains(LOT_PATH_MARKER) {
            continue;
        }
        let Ok(mut joined) = base.join(href) else {
            continue;
        };
        if !joined.host_str().is_some_and(|h| h.contains(LOT_HOST)) {
            continue;
        }
        joined.set_query(None);
        joined.set_fragment(None);
        let canonical = joined.to_string();
        if seen.insert(canonical.clone()) {
            links.push(canonical);
        }
    }
    links
}

/// Fetches the landing page and returns the lot URLs it links to.
pub fn discover_lot_urls<S: PageSource>(source: &S, landing_url: &str) -> Result<Vec<String>> {
    info!("Fetching landing page: {landing_url}");
    let html = source
        .fetch_html(landing_url)
        .context("Could not read landing page")?;
    let links = find_lot_links(&html, landing_url);
    info!("Discovered {} lot URLs", links.len());
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use std::collections::HashMap;

    struct Pages(HashMap<&'static str, &'static str>);

    impl PageSource for Pages {
        fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
            self.0.get(url).map(|s| s.to_string()).ok_or(FetchError::Status {
                url: url.to_string(),
                code: 404,
            })
        }
    }

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://site.test/sitemap-a.xml</loc></sitemap>
  <sitemap><loc>https://site.test/sitemap-b.xml</loc></sitemap>
</sitemapindex>"#;

    const SITEMAP_A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://site.test/property/1</loc></url>
  <url><loc>https://site.test/property/2</loc></url>
  <url><loc>https://site.test/property/3</loc></url>
  <url><loc>https://site.test/property/2</loc></url>
  <url><loc>https://site.test/about-us</loc></url>
</urlset>"#;

    const SITEMAP_B: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://site.test/properties/10</loc></url>
  <url><loc>https://site.test/properties/11</loc></url>
  <url><loc>https://site.test/properties/12</loc></url>
  <url><loc>https://site.test/Property/13</loc></url>
  <url><loc>https://site.test/property/14</loc></url>
</urlset>"#;

    fn fixture_site() -> Pages {
        Pages(HashMap::from([
            ("https://site.test/sitemap.xml", INDEX),
            ("https://site.test/sitemap-a.xml", SITEMAP_A),
            ("https://site.test/sitemap-b.xml", SITEMAP_B),
        ]))
    }

    #[test]
    fn parses_index_and_urlset() {
        assert_eq!(
            parse_sitemap(INDEX),
            Some(Sitemap::Index(vec![
                "https://site.test/sitemap-a.xml".into(),
                "https://site.test/sitemap-b.xml".into(),
            ]))
        );
        match parse_sitemap(SITEMAP_A) {
            Some(Sitemap::UrlSet(locs)) => assert_eq!(locs.len(), 5),
            other => panic!("expected url set, got {other:?}"),
        }
        assert_eq!(parse_sitemap("<html><body>nope</body></html>"), None);
    }

    #[test]
    fn nested_sitemaps_yield_eight_unique_urls() {
        let urls = discover_sitemap_urls(&fixture_site(), "https://site.test/sitemap.xml").unwrap();
        assert_eq!(urls.len(), 8);
        assert_eq!(urls[0], "https://site.test/property/1");
        assert_eq!(urls[7], "https://site.test/property/14");
        let unique: HashSet<_> = urls.iter().collect();
        assert_eq!(unique.len(), urls.len());
    }

    #[test]
    fn unreachable_root_is_fatal() {
        let err = discover_sitemap_urls(&fixture_site(), "https://site.test/missing.xml").unwrap_err();
        assert!(format!("{err:#}").contains("HTTP 404"));
    }

    #[test]
    fn broken_nested_sitemap_is_skipped() {
        let mut site = fixture_site();
        site.0.remove("https://site.test/sitemap-a.xml");
        let urls = discover_sitemap_urls(&site, "https://site.test/sitemap.xml").unwrap();
        assert_eq!(urls.len(), 5);
    }

    #[test]
    fn property_pattern_matches_path_only() {
        assert!(looks_like_property_url("https://site.test/property/abc"));
        assert!(looks_like_property_url("https://site.test/PROPERTIES/abc"));
        assert!(!looks_like_property_url("https://site.test/news?ref=/property/"));
        assert!(!looks_like_property_url("not a url"));
    }

    #[test]
    fn lot_links_are_resolved_filtered_and_deduplicated() {
        let html = r##"<html><body>
            <a href="https://online.auctionhouse.co.uk/lot/details/100?ref=home">Lot 1</a>
            <a href="https://online.auctionhouse.co.uk/lot/details/100#photos">Lot 1 again</a>
            <a href="//online.auctionhouse.co.uk/lot/details/101">Lot 2</a>
            <a href="/lot/details/102">Same-site lot</a>
            <a href="https://online.auctionhouse.co.uk/catalogue">Catalogue</a>
            <a>No href</a>
        </body></html>"##;
        let links = find_lot_links(html, "https://www.auctionhouse.co.uk/national");
        assert_eq!(
            links,
            vec![
                "https://online.auctionhouse.co.uk/lot/details/100",
                "https://online.auctionhouse.co.uk/lot/details/101",
            ]
        );
    }

    #[test]
    fn landing_discovery_fails_when_page_is_unreachable() {
        assert!(discover_lot_urls(&fixture_site(), "https://site.test/national").is_err());
    }
}
