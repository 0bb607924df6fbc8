//! CLI Command Handlers
//!
//! One-shot commands. Each handler takes its args, the loaded config and
//! Output, returns ExitCode.

use crate::api::board::BoardClient;
use crate::cli::{
    CacheCmd, CacheReport, ExitCode, Output, ScanCmd, ScanReport, ThreadReport,
};
use crate::config::Config;
use crate::discovery::Board;
use crate::playback::LocalCache;

// =============================================================================
// Scan Command
// =============================================================================

pub async fn scan_cmd(cmd: ScanCmd, config: &Config, output: &Output) -> ExitCode {
    let filter = match config.feed_filter() {
        Ok(filter) => filter,
        Err(e) => return output.error(e.to_string(), ExitCode::ConfigError),
    };
    let client = match BoardClient::builder(&config.board_url)
        .cookie(config.cookie.clone())
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .build()
    {
        Ok(client) => client,
        Err(e) => return output.error(e.to_string(), ExitCode::InvalidArgs),
    };
    let board_url = client.base_url().to_string();
    let mut board = Board::new(client, config.clip_matcher(), filter.clone());

    output.info(format!("Polling {}", board_url));

    // A failed poll is fatal here; the player would just retry later
    if let Err(e) = board.poll().await {
        return output.error(format!("Board poll failed: {}", e), ExitCode::NetworkError);
    }
    board.scan_for_matching_threads(&filter);
    board.refresh_known_threads().await;

    let limit = cmd.limit.unwrap_or(usize::MAX);
    let threads: Vec<ThreadReport> = board
        .threads()
        .iter()
        .map(|thread| ThreadReport {
            url: thread.url().to_string(),
            clips: thread
                .videos()
                .iter()
                .take(limit)
                .map(|v| v.uri().to_string())
                .collect(),
        })
        .collect();
    let total_clips = board.threads().iter().map(|t| t.videos().len()).sum();

    let report = ScanReport {
        board: board_url,
        threads,
        total_clips,
    };

    if output.json {
        if let Err(e) = output.print(&report) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        if report.threads.is_empty() {
            output.line("No matching threads");
        }
        for thread in &report.threads {
            output.line(format!("{} ({} clips)", thread.url, thread.clips.len()));
            for clip in &thread.clips {
                output.line(format!("  {}", clip));
            }
        }
        output.info(format!(
            "{} threads, {} clips",
            report.threads.len(),
            report.total_clips
        ));
    }
    ExitCode::Success
}

// =============================================================================
// Cache Command
// =============================================================================

pub async fn cache_cmd(_cmd: CacheCmd, config: &Config, output: &Output) -> ExitCode {
    let cache = LocalCache::new(&config.cache_dir, config.clip_matcher());

    let clips = match cache.clips() {
        Ok(clips) => clips,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return output.error(
                format!("Cannot read {}: {}", cache.dir().display(), e),
                ExitCode::Error,
            )
        }
    };

    let report = CacheReport {
        dir: cache.dir().to_path_buf(),
        count: clips.len(),
        clips,
    };

    if output.json {
        if let Err(e) = output.print(&report) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        for clip in &report.clips {
            output.line(clip.display());
        }
        output.info(format!(
            "{} clips in {}",
            report.count,
            report.dir.display()
        ));
    }
    ExitCode::Success
}
