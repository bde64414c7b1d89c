// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podgrab::{
    NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter,
    SyncOptions, SyncReport, resolve_feed_source, sync_podcast,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static PICTURE: Emoji<'_, '_> = Emoji("🖼️  ", "[c] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "warn";

/// Download new podcast episodes from an RSS feed
#[derive(Parser, Debug)]
#[command(name = "podgrab")]
#[command(about = "Download new podcast episodes from an RSS feed")]
#[command(version)]
struct Args {
    /// RSS feed URL, or a file containing one (e.g. a podcast_url.txt)
    feed: String,

    /// Directory in which the podcast folder is created
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Maximum number of new episodes to download, newest first
    #[arg(short, long)]
    limit: Option<usize>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Progress reporter using indicatif for terminal output.
///
/// Episodes are downloaded one at a time, so there is at most one
/// download bar below the status spinner.
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, content_length: Option<u64>) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(content_length.unwrap_or(0)));
        bar.set_style(style);

        if let Some(previous) = self.download_bar.lock().unwrap().replace(bar.clone()) {
            previous.finish_and_clear();
        }
        bar
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.download_bar.lock().unwrap().take()
    }

    fn line(&self, message: String) {
        let _ = self.multi.println(message);
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                podcast_title,
                total_episodes,
                new_episodes,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes total, {} new",
                    podcast_title.bold().green(),
                    total_episodes.to_string().cyan(),
                    new_episodes.to_string().yellow()
                ));
            }

            ProgressEvent::CoverDownloaded { path } => {
                self.line(format!(
                    "{PICTURE}Downloaded cover image: {}",
                    path.display().to_string().cyan()
                ));
            }

            ProgressEvent::CoverPresent { path } => {
                self.line(format!(
                    "{PICTURE}{}",
                    format!("Cover image already exists: {}", path.display()).dimmed()
                ));
            }

            ProgressEvent::CoverFailed { url, error } => {
                self.line(format!(
                    "{FAILURE}Cover image {} - {}",
                    url.yellow(),
                    error.red()
                ));
            }

            ProgressEvent::DownloadStarting {
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                let bar = self.start_bar(content_length);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if let Some(bar) = self.download_bar.lock().unwrap().as_ref() {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }

            ProgressEvent::DownloadCompleted { path, .. } => {
                if let Some(bar) = self.take_bar() {
                    bar.finish_and_clear();
                }
                self.line(format!(
                    "{SUCCESS}Downloaded: {}",
                    path.display().to_string().green()
                ));
            }

            ProgressEvent::DownloadFailed {
                episode_title,
                error,
            } => {
                if let Some(bar) = self.take_bar() {
                    bar.finish_and_clear();
                }
                self.line(format!(
                    "{FAILURE}Error downloading {}: {}",
                    truncate_title(&episode_title, 40).yellow(),
                    error.red()
                ));
            }

            ProgressEvent::SyncCompleted { .. } => {
                self.main_bar.finish_and_clear();
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn print_summary(report: &SyncReport) {
    println!(
        "\n{HEADPHONES}{} {}",
        "Podcast:".bold(),
        report.podcast_title.bold().green()
    );
    println!("Total episodes: {}", report.total_episodes.to_string().cyan());
    println!(
        "New downloads: {}",
        report.new_downloads.len().to_string().green().bold()
    );

    println!("New episodes downloaded:");
    for path in &report.new_downloads {
        println!("  {}", path.display());
    }

    if !report.failed.is_empty() {
        println!("\n{}", "Failed episodes:".red().bold());
        for failed in &report.failed {
            println!(
                "  {}{} - {}",
                CROSS,
                failed.title.yellow(),
                failed.error.dimmed()
            );
        }
    }

    println!(
        "\n{FOLDER}Output: {}\n",
        report.podcast_dir.display().to_string().cyan()
    );
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_logging();

    let feed_url = resolve_feed_source(&args.feed).context("Failed to resolve feed source")?;

    let show_progress = !args.quiet && !args.json;
    if show_progress {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podgrab".bold().magenta(),
            "- Podcast Downloader".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if show_progress {
        Arc::new(IndicatifReporter::new())
    } else {
        NoopReporter::shared()
    };

    let options = SyncOptions { limit: args.limit };
    let client = ReqwestClient::new();

    let report = sync_podcast(&client, &feed_url, &args.output_dir, &options, reporter)
        .await
        .context("Failed to sync podcast")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize summary")?
        );
    } else {
        print_summary(&report);
    }

    Ok(())
}
