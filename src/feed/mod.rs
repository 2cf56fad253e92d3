mod fetch;
mod parse;

pub use fetch::{fetch_feed, is_url};
pub use parse::{ExtractedFeed, FeedExtractor, FeedItem, RssExtractor, parse_feed};
