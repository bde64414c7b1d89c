mod date;
mod fetch;
mod parse;

pub use date::parse_date;
pub use fetch::{fetch_feed, resolve_feed_source};
pub use parse::{AUDIO_MIME_TYPE, Episode, Podcast, parse_feed, sort_newest_first};
