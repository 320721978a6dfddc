//! Upstream posting feed: trait plus the RSS adapter.
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::{Captures, Regex};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::model::JobRecord;

/// Supplies the current postings, oldest-first or newest-first as the feed
/// orders them. Ids must be stable across fetches.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>>;
}

#[derive(Debug, Clone)]
pub struct RssFeed {
    http: Client,
    url: String,
}

impl RssFeed {
    pub fn new(url: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("job-relay/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self { http, url }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.feed.rss_url.clone(), cfg.http_timeout())
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    #[instrument(skip_all)]
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>> {
        let body = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("failed to reach feed")?
            .error_for_status()
            .context("feed returned an error status")?
            .text()
            .await
            .context("failed to read feed body")?;
        parse_rss(&body)
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parse an RSS 2.0 document into records. Items without a guid or link are skipped.
pub fn parse_rss(xml: &str) -> Result<Vec<JobRecord>> {
    let rss: Rss = from_str(&scrub_html_entities(xml)).context("parsing rss xml")?;
    let mut out = Vec::with_capacity(rss.channel.items.len());
    for item in rss.channel.items {
        let link = item.link.unwrap_or_default().trim().to_string();
        let id = item
            .guid
            .map(|g| g.value.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| link.clone());
        if id.is_empty() {
            warn!(title = ?item.title, "skipping feed item without guid or link");
            continue;
        }
        let summary = strip_html(item.description.as_deref().unwrap_or_default());
        out.push(JobRecord {
            id,
            title: item.title.unwrap_or_default().trim().to_string(),
            budget: extract_budget(&summary),
            client_verified: summary.contains("Payment verified"),
            client_spent: extract_client_spent(&summary),
            summary,
            url: link,
        });
    }
    debug!(count = out.len(), "parsed feed items");
    Ok(out)
}

static FIXED_BUDGET: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)Budget:\s*\$([0-9,]+)").expect("valid regex"),
        Regex::new(r"(?i)Budget:\s*([0-9,]+)\s*USD").expect("valid regex"),
    ]
});
static HOURLY_RATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$([0-9,]+)(?:\.[0-9]+)?\s*/\s*(?:hr|hour)\b").expect("valid regex")
});
static CLIENT_SPENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Spent\s*\$([0-9,]+)").expect("valid regex"));
static HTML_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("valid regex"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([A-Za-z][A-Za-z0-9]*));")
        .expect("valid regex")
});
// A bare `&` or any entity reference, as seen by the XML parser.
static XML_AMPERSAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+;|#[xX][0-9a-fA-F]+;|[A-Za-z][A-Za-z0-9]*;)?").expect("valid regex")
});

/// Hours per week used to turn an hourly rate into a comparable budget.
const HOURS_PER_WEEK: f64 = 40.0;

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| *v > 0.0)
}

/// Stated fixed budget, else hourly rate × 40, else 0.
pub fn extract_budget(summary: &str) -> f64 {
    for pattern in FIXED_BUDGET.iter() {
        if let Some(amount) = pattern
            .captures(summary)
            .and_then(|c| parse_amount(&c[1]))
        {
            return amount;
        }
    }
    HOURLY_RATE
        .captures(summary)
        .and_then(|c| parse_amount(&c[1]))
        .map(|rate| rate * HOURS_PER_WEEK)
        .unwrap_or(0.0)
}

pub fn extract_client_spent(summary: &str) -> f64 {
    CLIENT_SPENT
        .captures(summary)
        .and_then(|c| parse_amount(&c[1]))
        .unwrap_or(0.0)
}

/// Plain-text rendering of an HTML description.
pub fn strip_html(html: &str) -> String {
    let with_breaks = HTML_BREAK.replace_all(html, "\n");
    let text = HTML_TAG.replace_all(&with_breaks, "");
    let text = decode_entities(&text);
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace named and numeric character references. Unknown names are left as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str())).map(String::from)
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<&'static str> {
    let text = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" | "ensp" | "emsp" | "thinsp" => " ",
        "hellip" => "…",
        "ndash" => "–",
        "mdash" => "—",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "laquo" => "«",
        "raquo" => "»",
        "bull" => "•",
        "middot" => "·",
        "copy" => "©",
        "reg" => "®",
        "trade" => "™",
        "euro" => "€",
        "pound" => "£",
        "cent" => "¢",
        "yen" => "¥",
        "deg" => "°",
        "times" => "×",
        _ => return None,
    };
    Some(text)
}

/// Make a feed body acceptable to the XML parser. HTML-only entities are
/// replaced by their text; unknown names and stray ampersands are escaped so
/// they survive as literal text.
fn scrub_html_entities(xml: &str) -> String {
    XML_AMPERSAND
        .replace_all(xml, |caps: &Captures| match caps.get(1) {
            None => "&amp;".to_string(),
            Some(reference) => {
                let reference = reference.as_str();
                let name = reference.trim_end_matches(';');
                if reference.starts_with('#')
                    || matches!(name, "amp" | "lt" | "gt" | "quot" | "apos")
                {
                    caps[0].to_string()
                } else if let Some(text) = named_entity(name) {
                    text.to_string()
                } else {
                    format!("&amp;{reference}")
                }
            }
        })
        .into_owned()
}
