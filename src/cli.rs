use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::config::{CrawlConfig, DEFAULT_DELAY_SECS, StatusRules, Variant};

pub enum Command {
    Run(CrawlConfig),
    Help,
}

pub fn usage(variant: Variant) -> String {
    let (name, root_flag, about) = match variant {
        Variant::Sitemap => ("auction_scraper", "--sitemap <url>", "Scrape property pages listed in the site's sitemap"),
        Variant::Landing => ("national_lots", "--landing <url>", "Scrape lots linked from the National Weekly landing page"),
    };
    format!(
        "{about}

Usage: {name} [options]

Options:
  -o, --output <path>        CSV destination (default: {output})
  {root_flag:<26} Root URL (default: {root})
      --delay <seconds>      Delay before each request (default: {DEFAULT_DELAY_SECS})
      --limit, --max-lots <n>
                             Stop after processing n pages
      --include-sold         Keep sold and withdrawn lots
      --user-agent <ua>      User-Agent header for requests
      --status-rules <path>  JSON keyword table for status detection
  -h, --help                 Show this help",
        output = variant.default_output(),
        root = variant.default_root(),
    )
}

/// Parses command-line arguments (without the program name) over the
/// defaults of `variant`.
pub fn parse_args<I>(variant: Variant, args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut config = CrawlConfig::new(variant);
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = || args.next().ok_or_else(|| anyhow!("Missing value for {arg}"));
        match arg.as_str() {
            "-o" | "--output" => config.output = PathBuf::from(value()?),
            "--sitemap" if variant == Variant::Sitemap => config.root_url = value()?,
            "--landing" if variant == Variant::Landing => config.root_url = value()?,
            "--delay" => config.delay = parse_delay(&value()?)?,
            "--limit" | "--max-lots" => {
                let v = value()?;
                let limit = v
                    .parse::<usize>()
                    .with_context(|| format!("Invalid value for {arg}: {v}"))?;
                config.limit = Some(limit);
            }
            "--include-sold" => config.include_sold = true,
            "--user-agent" => config.user_agent = value()?,
            "--status-rules" => {
                let path = PathBuf::from(value()?);
                config.status_rules = StatusRules::load(&path)?;
            }
            "-h" | "--help" => return Ok(Command::Help),
            _ => bail!("Unknown argument: {arg}"),
        }
    }

    Ok(Command::Run(config))
}

fn parse_delay(v: &str) -> Result<Duration> {
    let secs: f64 = v.parse().with_context(|| format!("Invalid delay: {v}"))?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("Delay must be a non-negative number of seconds, got {v}");
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(variant: Variant, args: &[&str]) -> Result<Command> {
        parse_args(variant, args.iter().map(|s| s.to_string()))
    }

    fn config(variant: Variant, args: &[&str]) -> CrawlConfig {
        match parse(variant, args).unwrap() {
            Command::Run(config) => config,
            Command::Help => panic!("expected a run command"),
        }
    }

    #[test]
    fn no_args_gives_defaults() {
        let c = config(Variant::Sitemap, &[]);
        assert_eq!(c.output, PathBuf::from("auctionhouse_properties.csv"));
        assert_eq!(c.limit, None);
        assert!(!c.include_sold);
    }

    #[test]
    fn sitemap_flags() {
        let c = config(
            Variant::Sitemap,
            &["--sitemap", "https://site.test/sm.xml", "-o", "out.csv", "--delay", "0", "--limit", "5", "--include-sold"],
        );
        assert_eq!(c.root_url, "https://site.test/sm.xml");
        assert_eq!(c.output, PathBuf::from("out.csv"));
        assert_eq!(c.delay, Duration::ZERO);
        assert_eq!(c.limit, Some(5));
        assert!(c.include_sold);
    }

    #[test]
    fn landing_accepts_max_lots() {
        let c = config(Variant::Landing, &["--max-lots", "3", "--landing", "https://site.test/national"]);
        assert_eq!(c.limit, Some(3));
        assert_eq!(c.root_url, "https://site.test/national");
    }

    #[test]
    fn root_flag_belongs_to_its_variant() {
        assert!(parse(Variant::Landing, &["--sitemap", "https://site.test/sm.xml"]).is_err());
        assert!(parse(Variant::Sitemap, &["--landing", "https://site.test/national"]).is_err());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse(Variant::Sitemap, &["--delay", "-1"]).is_err());
        assert!(parse(Variant::Sitemap, &["--delay", "soon"]).is_err());
        assert!(parse(Variant::Sitemap, &["--limit", "ten"]).is_err());
        assert!(parse(Variant::Sitemap, &["--output"]).is_err());
        assert!(parse(Variant::Sitemap, &["--frobnicate"]).is_err());
    }

    #[test]
    fn help_short_circuits() {
        assert!(matches!(parse(Variant::Landing, &["--max-lots", "2", "-h"]).unwrap(), Command::Help));
        assert!(usage(Variant::Landing).contains("--landing <url>"));
    }
}
