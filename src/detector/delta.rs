use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{LAST_PWN_KEY, LAST_RANK_KEY};
use crate::error::{AppError, Result};
use crate::state::StateStore;
use crate::types::{Checkpoint, NewsEntry, RankChange, RankDirection, ScoreRow, TrackedEntity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsDelta {
    /// Unseen entries, newest first.
    pub new_entries: Vec<NewsEntry>,
    /// Cursor to persist: the feed's newest timestamp, or the old one for an empty feed.
    pub cursor: Option<String>,
}

/// Walk the feed newest-first until the checkpoint timestamp is hit.
///
/// Without a checkpoint the whole feed is taken as the baseline and nothing is
/// reported, so a fresh deployment does not replay the scoreboard history.
pub fn news_delta(feed: &[NewsEntry], last_seen: Option<&str>) -> NewsDelta {
    let cursor = feed
        .first()
        .map(|e| e.timestamp.clone())
        .or_else(|| last_seen.map(str::to_string));

    let new_entries = match last_seen {
        None => Vec::new(),
        Some(ts) => feed.iter().take_while(|e| e.timestamp != ts).cloned().collect(),
    };

    NewsDelta { new_entries, cursor }
}

/// Ordering of `new` relative to `old`; `Less` means a better (smaller) rank.
///
/// Numeric mode compares integers when both sides parse, so "2" → "10" is a
/// drop. With `numeric` off, or for non-numeric ranks, the plain string order
/// is used, which misreads two-digit ranks.
pub fn compare_ranks(old: &str, new: &str, numeric: bool) -> Ordering {
    if numeric {
        if let (Ok(o), Ok(n)) = (old.trim().parse::<u64>(), new.trim().parse::<u64>()) {
            return n.cmp(&o);
        }
    }
    new.cmp(old)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankDelta {
    pub change: Option<RankChange>,
    /// Rank of the tracked row if it is on the board.
    pub observed: Option<String>,
}

pub fn rank_delta(
    table: &[ScoreRow],
    tracked: &TrackedEntity,
    last_rank: Option<&str>,
    numeric: bool,
) -> RankDelta {
    let Some(row) = table.iter().find(|r| tracked.matches(r)) else {
        return RankDelta { change: None, observed: None };
    };
    let observed = Some(row.rank.clone());

    let change = match last_rank {
        // First sighting is a baseline.
        None => None,
        Some(old) if old == row.rank => None,
        Some(old) => {
            let direction = match compare_ranks(old, &row.rank, numeric) {
                Ordering::Less => Some(RankDirection::Improved),
                Ordering::Greater => Some(RankDirection::Worsened),
                // Numerically equal, differently formatted ("01" vs "1").
                Ordering::Equal => None,
            };
            direction.map(|direction| RankChange {
                old_rank: old.to_string(),
                new_rank: row.rank.clone(),
                direction,
            })
        }
    };

    RankDelta { change, observed }
}

/// Everything one poll cycle found.
#[derive(Debug, Default)]
pub struct PollDelta {
    pub news: Vec<NewsEntry>,
    pub rank_change: Option<RankChange>,
    /// Checkpoint writes that failed; the in-memory checkpoint still advanced.
    pub write_errors: Vec<AppError>,
}

impl PollDelta {
    /// Outbound messages: one news digest (oldest first) and one rank notice.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.news.is_empty() {
            let digest: Vec<&str> = self.news.iter().rev().map(|e| e.headline.as_str()).collect();
            out.push(digest.join("\n"));
        }
        if let Some(change) = &self.rank_change {
            out.push(change.message());
        }
        out
    }
}

/// Owns the checkpoint and mirrors it into the StateStore.
pub struct DeltaEngine {
    store: Arc<dyn StateStore>,
    tracked: Option<TrackedEntity>,
    numeric_ranks: bool,
    checkpoint: Mutex<Checkpoint>,
}

impl DeltaEngine {
    /// Restores the checkpoint persisted by a previous run.
    pub async fn load(
        store: Arc<dyn StateStore>,
        tracked: Option<TrackedEntity>,
        numeric_ranks: bool,
    ) -> Result<Self> {
        let checkpoint = Checkpoint {
            last_seen_timestamp: store.get_value(LAST_PWN_KEY).await?,
            last_seen_rank: store.get_value(LAST_RANK_KEY).await?,
        };
        info!(
            last_pwn = ?checkpoint.last_seen_timestamp,
            last_rank = ?checkpoint.last_seen_rank,
            "checkpoint restored"
        );
        Ok(Self {
            store,
            tracked,
            numeric_ranks,
            checkpoint: Mutex::new(checkpoint),
        })
    }

    pub async fn checkpoint(&self) -> Checkpoint {
        self.checkpoint.lock().await.clone()
    }

    /// Runs both detectors and persists the advanced checkpoint.
    ///
    /// The two checkpoint writes are attempted independently; failures are
    /// collected in `write_errors` for the caller to surface.
    pub async fn observe(&self, feed: &[NewsEntry], table: &[ScoreRow]) -> PollDelta {
        let mut cp = self.checkpoint.lock().await;
        let mut out = PollDelta::default();

        let news = news_delta(feed, cp.last_seen_timestamp.as_deref());
        if cp.last_seen_timestamp.is_none() && news.cursor.is_some() {
            info!(baseline = ?news.cursor, entries = feed.len(), "first feed observed, capturing baseline");
        }
        if let Some(cursor) = news.cursor.filter(|_| !feed.is_empty()) {
            if let Err(e) = self.store.set_value(LAST_PWN_KEY, &cursor).await {
                warn!("checkpoint write '{LAST_PWN_KEY}' failed: {e}");
                out.write_errors.push(e);
            }
            cp.last_seen_timestamp = Some(cursor);
        }
        out.news = news.new_entries;

        if let Some(tracked) = &self.tracked {
            let rank = rank_delta(table, tracked, cp.last_seen_rank.as_deref(), self.numeric_ranks);
            match rank.observed {
                Some(observed) => {
                    if let Err(e) = self.store.set_value(LAST_RANK_KEY, &observed).await {
                        warn!("checkpoint write '{LAST_RANK_KEY}' failed: {e}");
                        out.write_errors.push(e);
                    }
                    cp.last_seen_rank = Some(observed);
                }
                None => debug!("tracked entity not on the scoreboard"),
            }
            out.rank_change = rank.change;
        }

        out
    }
}
