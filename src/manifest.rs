// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::ManifestError;

/// Name of the manifest file inside a podcast directory
pub const MANIFEST_FILENAME: &str = "downloaded_episodes.txt";

/// The set of enclosure URLs already downloaded for one podcast.
///
/// Backed by an append-only text file with one URL per line. The append
/// handle stays open for the lifetime of the value and every
/// [`record`](Manifest::record) is flushed before it returns, so the file
/// never lists a URL whose download had not finished.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    urls: HashSet<String>,
    file: File,
    /// The file's last line has no terminator yet (hand edit or torn write)
    unterminated: bool,
}

impl Manifest {
    /// Load the manifest in `dir` and open it for appending.
    ///
    /// A missing file is an empty manifest.
    pub fn open(dir: &Path) -> Result<Self, ManifestError> {
        let path = dir.join(MANIFEST_FILENAME);
        let content = read_content(&path)?;
        let unterminated = !content.is_empty() && !content.ends_with('\n');
        let urls = parse_urls(&content);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ManifestError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self {
            path,
            urls,
            file,
            unterminated,
        })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a downloaded URL and flush it to disk
    pub fn record(&mut self, url: &str) -> Result<(), ManifestError> {
        if self.urls.contains(url) {
            return Ok(());
        }

        let line = if self.unterminated {
            format!("\n{url}\n")
        } else {
            format!("{url}\n")
        };
        append_line(&mut self.file, &line).map_err(|e| ManifestError::AppendFailed {
            path: self.path.clone(),
            source: e,
        })?;

        self.unterminated = false;
        self.urls.insert(url.to_string());
        Ok(())
    }
}

fn append_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes())?;
    file.flush()?;
    file.sync_data()
}

fn read_content(path: &Path) -> Result<String, ManifestError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ManifestError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn parse_urls(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
