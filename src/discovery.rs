//! Content discovery
//!
//! Polls the board index, registers threads whose opening post matches the
//! keyword filter, re-reads known threads, and hands out clips that have not
//! been delivered yet.

use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::api::board::{BoardClient, BoardError, BoardPage, ClipMatcher};
use crate::models::{Thread, VideoReference};

/// Default include pattern: "webm" in Latin, plus its common Cyrillic spellings
pub const DEFAULT_INCLUDE_PATTERN: &str =
    r"([Ww][Ee][Bb][Mm])|([Цц][Уу][Ии][Ьь])|([ВвШш][Ее][Бб][Мм])";

/// Keyword filter applied to opening posts
#[derive(Debug, Clone)]
pub struct FeedFilter {
    pub include: Regex,
    pub exclude: Option<Regex>,
}

impl FeedFilter {
    pub fn new(include: Regex, exclude: Option<Regex>) -> Self {
        Self { include, exclude }
    }

    /// Compile include/exclude patterns
    pub fn from_patterns(include: &str, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: Regex::new(include)?,
            exclude: exclude.map(Regex::new).transpose()?,
        })
    }

    /// Include matches and exclude (if any) does not
    pub fn matches(&self, body: &str) -> bool {
        self.include.is_match(body)
            && self
                .exclude
                .as_ref()
                .map(|re| !re.is_match(body))
                .unwrap_or(true)
    }
}

/// The set of tracked threads and the last polled index
pub struct Board {
    client: BoardClient,
    matcher: ClipMatcher,
    filter: FeedFilter,
    /// Registration order is delivery order
    threads: Vec<Thread>,
    index: Option<BoardPage>,
    /// Clip URLs already handed to the queue, across all threads
    delivered: HashSet<String>,
}

impl Board {
    pub fn new(client: BoardClient, matcher: ClipMatcher, filter: FeedFilter) -> Self {
        Self {
            client,
            matcher,
            filter,
            threads: Vec::new(),
            index: None,
            delivered: HashSet::new(),
        }
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    /// Fetch the board index.
    ///
    /// On failure the stored index is cleared so a following scan finds nothing.
    pub async fn poll(&mut self) -> Result<(), BoardError> {
        match self.client.fetch_index().await {
            Ok(page) => {
                debug!(threads = page.threads.len(), "Polled board index");
                self.index = Some(page);
                Ok(())
            }
            Err(e) => {
                self.index = None;
                Err(e)
            }
        }
    }

    /// Register new threads from the polled index that pass `filter` and carry
    /// at least one clip in the opening post. Returns how many were added.
    pub fn scan_for_matching_threads(&mut self, filter: &FeedFilter) -> usize {
        let Some(index) = self.index.as_ref() else {
            return 0;
        };

        let mut found = Vec::new();
        for summary in &index.threads {
            let Some(op) = summary.posts.first() else {
                continue;
            };
            if filter.matches(&op.comment) && self.matcher.has_clip(op) {
                found.push(BoardClient::thread_key(&op.num));
            }
        }

        let mut added = 0;
        for key in found {
            if self.register(Thread::new(key.clone())) {
                info!(thread = %key, "Found new clip thread");
                added += 1;
            }
        }

        if self.threads.is_empty() {
            info!("No threads found");
        }
        added
    }

    /// Add a thread unless one with the same URL is already known
    pub fn register(&mut self, thread: Thread) -> bool {
        if self.threads.contains(&thread) {
            return false;
        }
        self.threads.push(thread);
        true
    }

    /// Re-read every known thread and append newly posted clips.
    ///
    /// Threads the board reports as gone are evicted; transport and parse
    /// failures leave the thread untouched for this cycle.
    pub async fn refresh_known_threads(&mut self) {
        let mut gone = Vec::new();

        for (i, thread) in self.threads.iter_mut().enumerate() {
            match self.client.fetch_thread(thread.url()).await {
                Ok(page) => {
                    let clips = self.client.extract_clips(&page, &self.matcher);
                    let fresh = thread.merge_extracted(clips);
                    debug!(thread = %thread.url(), fresh, "Parsed thread");
                }
                Err(e) if e.is_gone() => {
                    info!(thread = %thread.url(), error = %e, "Thread is unavailable, removing");
                    gone.push(i);
                }
                Err(e) => {
                    warn!(thread = %thread.url(), error = %e, "Failed to refresh thread");
                }
            }
        }

        for i in gone.into_iter().rev() {
            self.evict(i);
        }
    }

    /// Drop a thread and forget its delivered clips, except those another
    /// tracked thread still lists
    fn evict(&mut self, index: usize) {
        let thread = self.threads.remove(index);
        for video in thread.videos() {
            let still_listed = self
                .threads
                .iter()
                .any(|t| t.videos().iter().any(|v| v.uri() == video.uri()));
            if !still_listed {
                self.delivered.remove(video.uri());
            }
        }
    }

    /// Size of the cross-thread dedup set
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    /// Clips added since the last drain, in thread registration order.
    ///
    /// Advances every thread's cursor, so a second call without a refresh in
    /// between returns nothing.
    pub fn drain_new_videos(&mut self) -> Vec<VideoReference> {
        let mut out = Vec::new();
        for thread in &mut self.threads {
            for video in thread.take_undelivered() {
                if self.delivered.insert(video.uri().to_string()) {
                    out.push(video);
                }
            }
        }
        out
    }

    /// One full discovery cycle: poll, scan, refresh, drain
    pub async fn refill(&mut self) -> Vec<VideoReference> {
        if let Err(e) = self.poll().await {
            warn!(error = %e, "Board poll failed");
        }
        let filter = self.filter.clone();
        self.scan_for_matching_threads(&filter);
        self.refresh_known_threads().await;

        let videos = self.drain_new_videos();
        info!(
            clips = videos.len(),
            threads = self.threads.len(),
            "Discovery cycle complete"
        );
        videos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> FeedFilter {
        FeedFilter::from_patterns(DEFAULT_INCLUDE_PATTERN, None).unwrap()
    }

    fn board() -> Board {
        let client = BoardClient::new("https://example.invalid/b/").unwrap();
        Board::new(client, ClipMatcher::default(), default_filter())
    }

    #[test]
    fn test_default_filter_matches_spellings() {
        let filter = default_filter();
        assert!(filter.matches("WEBM thread"));
        assert!(filter.matches("цуиь тред"));
        assert!(filter.matches("Шебм"));
        assert!(!filter.matches("cats"));
    }

    #[test]
    fn test_exclude_pattern() {
        let filter = FeedFilter::new(
            Regex::new("webm").unwrap(),
            Some(Regex::new("(?i)music").unwrap()),
        );
        assert!(filter.matches("webm"));
        assert!(!filter.matches("webm MUSIC"));
    }

    #[test]
    fn test_register_dedups_by_url() {
        let mut board = board();
        assert!(board.register(Thread::new("res/1.json")));
        assert!(!board.register(Thread::new("res/1.json")));
        assert!(board.register(Thread::new("res/2.json")));
        assert_eq!(board.thread_count(), 2);
    }

    #[test]
    fn test_scan_without_index_is_empty() {
        let mut board = board();
        let filter = default_filter();
        assert_eq!(board.scan_for_matching_threads(&filter), 0);
    }

    #[test]
    fn test_scan_applies_filter_and_clip_rule() {
        let mut board = board();
        board.index = Some(
            BoardPage::parse(
                r#"{"threads":[
                    {"posts":[{"num": 1, "comment": "webm thread", "files": [{"path": "src/1/a.webm"}]}]},
                    {"posts":[{"num": 2, "comment": "webm thread", "files": [{"path": "src/2/a.png"}]}]},
                    {"posts":[{"num": 3, "comment": "cats", "files": [{"path": "src/3/a.webm"}]}]},
                    {"posts":[]}
                ]}"#,
            )
            .unwrap(),
        );

        let filter = default_filter();
        assert_eq!(board.scan_for_matching_threads(&filter), 1);
        assert_eq!(board.threads()[0].url(), "res/1.json");

        // Second scan of the same index adds nothing
        assert_eq!(board.scan_for_matching_threads(&filter), 0);
        assert_eq!(board.thread_count(), 1);
    }

    #[test]
    fn test_drain_is_not_idempotent() {
        let mut board = board();
        let mut thread = Thread::new("res/1.json");
        thread.merge_extracted(vec!["u1".into(), "u2".into()]);
        board.register(thread);

        assert_eq!(board.drain_new_videos().len(), 2);
        assert!(board.drain_new_videos().is_empty());
    }

    #[test]
    fn test_two_refreshes_then_one_drain_is_union() {
        let mut board = board();
        board.register(Thread::new("res/1.json"));

        board.threads[0].merge_extracted(vec!["u1".into(), "u2".into()]);
        board.threads[0].merge_extracted(vec!["u1".into(), "u2".into(), "u3".into()]);

        let uris: Vec<_> = board
            .drain_new_videos()
            .into_iter()
            .map(|v| v.uri().to_string())
            .collect();
        assert_eq!(uris, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn test_drain_skips_clips_seen_in_other_threads() {
        let mut board = board();
        let mut a = Thread::new("res/1.json");
        a.merge_extracted(vec!["shared".into(), "only-a".into()]);
        let mut b = Thread::new("res/2.json");
        b.merge_extracted(vec!["shared".into(), "only-b".into()]);
        board.register(a);
        board.register(b);

        let uris: Vec<_> = board
            .drain_new_videos()
            .into_iter()
            .map(|v| v.uri().to_string())
            .collect();
        assert_eq!(uris, vec!["shared", "only-a", "only-b"]);
    }

    #[test]
    fn test_evicted_thread_releases_its_clips() {
        let mut board = board();
        let mut a = Thread::new("res/1.json");
        a.merge_extracted(vec!["only-a".into(), "shared".into()]);
        let mut b = Thread::new("res/2.json");
        b.merge_extracted(vec!["shared".into()]);
        board.register(a);
        board.register(b);
        board.drain_new_videos();
        assert_eq!(board.delivered_count(), 2);

        board.evict(0);
        assert_eq!(board.thread_count(), 1);
        // "shared" is still listed by the surviving thread
        assert_eq!(board.delivered_count(), 1);

        board.evict(0);
        assert_eq!(board.delivered_count(), 0);
    }
}
