//! Remote asset metadata probing.
//!
//! A HEAD request yields size and filename hints before a download is
//! enqueued. Results flow through the two-tier TTL cache keyed by URL so
//! repeated lookups within the TTL don't touch the network.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str;
use std::time::Duration;

use crate::cache::{CacheConfig, TtlCache};
use crate::store::KvStore;

/// Metadata learned from a HEAD response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMeta {
    /// Total size in bytes, if `Content-Length` was present.
    pub content_length: Option<u64>,
    /// Raw `Content-Disposition` value (filename hint).
    pub content_disposition: Option<String>,
    /// `Content-Type` value, for display.
    pub content_type: Option<String>,
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Follows redirects. Runs in the current thread; call from `spawn_blocking`
/// when used from async code.
pub fn probe_blocking(url: &str) -> Result<AssetMeta> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    Ok(parse_headers(&headers))
}

/// Parse the header lines of the final response. Redirect hops each start
/// with a status line, so values seen after the last status line win.
fn parse_headers(lines: &[String]) -> AssetMeta {
    let mut meta = AssetMeta::default();
    for line in lines {
        if line.starts_with("HTTP/") {
            meta = AssetMeta::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            meta.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("content-disposition") {
            meta.content_disposition = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-type") {
            meta.content_type = Some(value.to_string());
        }
    }
    meta
}

/// TTL-cached metadata lookups.
pub struct MetaCache {
    cache: TtlCache<AssetMeta>,
}

impl MetaCache {
    pub fn new(store: KvStore, cfg: CacheConfig) -> Self {
        Self {
            cache: TtlCache::new(store, "meta", cfg),
        }
    }

    /// Cached metadata for `url`, probing the network on a cache miss.
    pub async fn lookup(&self, url: &str) -> Result<AssetMeta> {
        if let Some(meta) = self.cache.get(url).await {
            tracing::debug!(url, "asset metadata served from cache");
            return Ok(meta);
        }
        let owned = url.to_string();
        let meta = tokio::task::spawn_blocking(move || probe_blocking(&owned))
            .await
            .context("probe task join")??;
        self.cache.set(url, meta.clone()).await;
        Ok(meta)
    }

    /// Drop any cached metadata for `url` (e.g. after a failed download).
    pub async fn invalidate(&self, url: &str) {
        self.cache.remove(url).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_basic_headers() {
        let meta = parse_headers(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 1048576",
            "Content-Type: video/mp4",
            "Content-Disposition: attachment; filename=\"clip.mp4\"",
        ]));
        assert_eq!(meta.content_length, Some(1_048_576));
        assert_eq!(meta.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(
            meta.content_disposition.as_deref(),
            Some("attachment; filename=\"clip.mp4\"")
        );
    }

    #[test]
    fn last_redirect_hop_wins() {
        let meta = parse_headers(&lines(&[
            "HTTP/1.1 302 Found",
            "Content-Length: 0",
            "Location: https://cdn.example.com/real",
            "HTTP/1.1 200 OK",
            "Content-Length: 999",
        ]));
        assert_eq!(meta.content_length, Some(999));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let meta = parse_headers(&lines(&["HTTP/1.1 200 OK", "content-LENGTH: 5"]));
        assert_eq!(meta.content_length, Some(5));
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let meta = parse_headers(&lines(&["HTTP/1.1 200 OK", "no-colon-here", "Content-Length: x"]));
        assert_eq!(meta.content_length, None);
    }
}
