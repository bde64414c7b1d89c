// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};

use crate::feed::Episode;

/// Longest name most filesystems accept for a single path component
pub const MAX_FILENAME_LENGTH: usize = 255;

const AUDIO_EXTENSION: &str = "mp3";

/// Characters rejected by at least one common filesystem
fn is_reserved_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}

/// Unicode whitespace plus the ASCII separators U+001C..=U+001F
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\x1c'..='\x1f')
}

/// Make arbitrary text usable as a file or directory name.
///
/// Reserved characters are removed, each whitespace run becomes one `_`,
/// non-ASCII characters are dropped and the result is cut to
/// [`MAX_FILENAME_LENGTH`]. Nothing is transliterated.
pub fn sanitize_filename(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_whitespace = false;

    for c in text.chars().filter(|&c| !is_reserved_char(c)) {
        if is_separator(c) {
            if !in_whitespace {
                result.push('_');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;

        if c.is_ascii() {
            result.push(c);
        }
    }

    result.truncate(MAX_FILENAME_LENGTH);
    result
}

/// Hands out `seqNNNN` labels to undated episodes within one run
#[derive(Debug, Clone)]
pub struct SequenceLabels {
    next: u32,
}

impl Default for SequenceLabels {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Date label for dated episodes; otherwise the next sequence label
    pub fn label_for(&mut self, published: Option<&DateTime<FixedOffset>>) -> String {
        match published {
            Some(dt) => dt.format("%Y%m%d").to_string(),
            None => {
                let label = format!("seq{:04}", self.next);
                self.next += 1;
                label
            }
        }
    }
}

/// Filename for a downloaded episode: `<label>_<sanitized title>.mp3`
pub fn episode_filename(label: &str, episode: &Episode) -> String {
    format!(
        "{}_{}.{}",
        label,
        sanitize_filename(&episode.title),
        AUDIO_EXTENSION
    )
}
