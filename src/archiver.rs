use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::debug;

use crate::models::{CSV_HEADER, Listing};

/// Appends listings to a CSV file, one row per URL.
pub struct ListingWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    seen: HashSet<String>,
}

impl ListingWriter {
    /// Opens `path` for appending, creating it with a header row when it is
    /// absent or empty. An existing file must carry the same header. URLs
    /// already in the file are remembered so they are not written twice.
    pub fn open(path: &Path) -> Result<Self> {
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let seen = if needs_header {
            HashSet::new()
        } else {
            existing_urls(path)?
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open output file {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        } else {
            debug!("Appending to {} ({} rows present)", path.display(), seen.len());
        }

        Ok(ListingWriter {
            writer,
            path: path.to_path_buf(),
            seen,
        })
    }

    /// Writes one row. Returns `false` without writing when the URL is
    /// already in the file.
    pub fn append(&mut self, listing: &Listing) -> Result<bool> {
        if !self.seen.insert(listing.url.clone()) {
            return Ok(false);
        }
        self.writer
            .serialize(listing)
            .with_context(|| format!("Failed to write {} to {}", listing.url, self.path.display()))?;
        self.writer.flush()?;
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn existing_urls(path: &Path) -> Result<HashSet<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read existing output {}", path.display()))?;
    let header = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    if !header.iter().eq(CSV_HEADER) {
        bail!(
            "{} has columns [{}], expected [{}]",
            path.display(),
            header.iter().collect::<Vec<_>>().join(","),
            CSV_HEADER.join(",")
        );
    }
    let url_col = CSV_HEADER.len() - 1;

    let mut urls = HashSet::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        if let Some(url) = record.get(url_col) {
            urls.insert(url.to_string());
        }
    }
    Ok(urls)
}
