// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;
use crate::model::ChannelSummary;

/// A feed as seen by the sync engine: channel metadata plus items in source order
#[derive(Debug, Clone, Default)]
pub struct ExtractedFeed {
    pub channel: ChannelSummary,
    pub items: Vec<FeedItem>,
}

/// A single item of a feed, before it has been assigned an episode id
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub guid: Option<String>,
    pub title: String,
    pub url: String,
    pub mime_type: String,
    pub length: u64,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub duration: Option<String>,
    pub description: Option<String>,
}

impl FeedItem {
    /// Deduplication key, matching [`crate::model::Episode::identity`]
    pub fn identity(&self) -> &str {
        self.guid.as_deref().unwrap_or(&self.url)
    }
}

/// Turns raw feed bytes into structured channel and item records.
///
/// Fields missing from the source are left empty rather than reported.
pub trait FeedExtractor: Send + Sync {
    fn extract(&self, raw: &[u8]) -> Result<ExtractedFeed, FeedError>;
}

/// RSS 2.0 (with iTunes extensions) extractor
#[derive(Debug, Default, Clone, Copy)]
pub struct RssExtractor;

impl FeedExtractor for RssExtractor {
    fn extract(&self, raw: &[u8]) -> Result<ExtractedFeed, FeedError> {
        parse_feed(raw)
    }
}

/// Parse RSS feed XML bytes into channel metadata and items
pub fn parse_feed(xml_bytes: &[u8]) -> Result<ExtractedFeed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let items = channel.items().iter().filter_map(parse_item).collect();

    let image_url = channel
        .image()
        .map(|img| img.url().to_string())
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .map(String::from)
        })
        .unwrap_or_default();

    let author = channel
        .itunes_ext()
        .and_then(|ext| ext.author().map(String::from))
        .or_else(|| channel.managing_editor().map(String::from))
        .unwrap_or_default();

    Ok(ExtractedFeed {
        channel: ChannelSummary {
            title: decode_text(channel.title()),
            author,
            image_url,
            description: decode_text(channel.description()),
        },
        items,
    })
}

/// Items without an enclosure carry nothing to play and are skipped
fn parse_item(item: &rss::Item) -> Option<FeedItem> {
    let enclosure = item.enclosure()?;
    let url = enclosure.url().trim();
    if url.is_empty() {
        return None;
    }

    let pub_date = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok()
    });

    let guid = item
        .guid()
        .map(|g| g.value().trim().to_string())
        .filter(|g| !g.is_empty());

    Some(FeedItem {
        guid,
        title: item
            .title()
            .map(decode_text)
            .unwrap_or_else(|| "Untitled Episode".to_string()),
        url: url.to_string(),
        mime_type: enclosure.mime_type().to_string(),
        length: enclosure.length().trim().parse().unwrap_or(0),
        pub_date,
        duration: item
            .itunes_ext()
            .and_then(|ext| ext.duration().map(String::from)),
        description: item.description().map(decode_text),
    })
}

/// Feeds frequently double-escape entities inside CDATA sections
fn decode_text(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    const FORMATS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S %z", "%Y-%m-%d %H:%M:%S %z"];

    DateTime::parse_from_rfc3339(date_str).or_else(|err| {
        FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
            .ok_or(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Test Podcast</title>
    <description>Tips &amp;amp; tricks</description>
    <link>https://example.com</link>
    <itunes:author>Test Author</itunes:author>
    <itunes:image href="https://example.com/image.jpg"/>
    <item>
      <title>Episode 1</title>
      <description>First episode</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <guid>ep1-guid</guid>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
      <itunes:duration>30:00</itunes:duration>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Audio</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parse_feed_extracts_channel_metadata() {
        let feed = parse_feed(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(feed.channel.title, "Test Podcast");
        assert_eq!(feed.channel.description, "Tips & tricks");
        assert_eq!(feed.channel.author, "Test Author");
        assert_eq!(feed.channel.image_url, "https://example.com/image.jpg");
    }

    #[test]
    fn parse_feed_extracts_items_in_source_order() {
        let feed = RssExtractor.extract(SAMPLE_FEED.as_bytes()).unwrap();

        assert_eq!(feed.items.len(), 2);

        let ep1 = &feed.items[0];
        assert_eq!(ep1.title, "Episode 1");
        assert_eq!(ep1.guid.as_deref(), Some("ep1-guid"));
        assert_eq!(ep1.identity(), "ep1-guid");
        assert_eq!(ep1.duration.as_deref(), Some("30:00"));
        assert_eq!(ep1.length, 1234567);
        assert!(ep1.pub_date.is_some());

        let ep2 = &feed.items[1];
        assert!(ep2.guid.is_none());
        assert_eq!(ep2.identity(), "https://example.com/ep2.mp3");
        assert_eq!(ep2.length, 0);
        assert!(ep2.pub_date.is_none());
    }

    #[test]
    fn parse_feed_tolerates_missing_channel_fields() {
        let minimal = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Bare</title><link>https://x</link><description></description></channel></rss>"#;
        let feed = parse_feed(minimal.as_bytes()).unwrap();

        assert_eq!(feed.channel.title, "Bare");
        assert_eq!(feed.channel.author, "");
        assert_eq!(feed.channel.image_url, "");
        assert!(feed.items.is_empty());
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(parse_feed(b"this is not xml").is_err());
    }

    #[test]
    fn relaxed_dates_are_accepted() {
        assert!(parse_relaxed_date("2024-01-15T10:00:00+01:00").is_ok());
        assert!(parse_relaxed_date("yesterday").is_err());
    }
}
