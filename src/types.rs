use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Scoreboard
// ---------------------------------------------------------------------------

/// One line of the "Last Pwns:" section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEntry {
    /// Opaque source timestamp, doubles as the de-duplication cursor.
    pub timestamp: String,
    pub headline: String,
}

/// Newest-first, as served by the scoreboard.
pub type NewsFeed = Vec<NewsEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub rank: String,
    pub columns: Vec<String>,
}

pub type ScoreTable = Vec<ScoreRow>;

/// Selects the tracked row: every `(column index, value)` pair must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntity {
    pub matchers: Vec<(usize, String)>,
}

impl TrackedEntity {
    /// Parses `"0=0xCD,1=Foo"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut matchers = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (idx, value) = part.split_once('=').ok_or_else(|| {
                AppError::Config(format!("TRACKED_ENTITY entry '{part}' is not idx=value"))
            })?;
            let idx = idx.trim().parse::<usize>().map_err(|_| {
                AppError::Config(format!("TRACKED_ENTITY index '{idx}' is not a column number"))
            })?;
            matchers.push((idx, value.trim().to_string()));
        }
        if matchers.is_empty() {
            return Err(AppError::Config("TRACKED_ENTITY has no column matchers".to_string()));
        }
        Ok(Self { matchers })
    }

    pub fn matches(&self, row: &ScoreRow) -> bool {
        self.matchers
            .iter()
            .all(|(idx, value)| row.columns.get(*idx).is_some_and(|c| c == value))
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub last_seen_timestamp: Option<String>,
    pub last_seen_rank: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDirection {
    Improved,
    Worsened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankChange {
    pub old_rank: String,
    pub new_rank: String,
    pub direction: RankDirection,
}

impl RankChange {
    pub fn message(&self) -> String {
        match self.direction {
            RankDirection::Improved => {
                format!("📈 Rank improved: {} → {}", self.old_rank, self.new_rank)
            }
            RankDirection::Worsened => {
                format!("📉 Rank dropped: {} → {}", self.old_rank, self.new_rank)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subscribers & maintainer events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
    Error,
}

impl Severity {
    pub fn prefix(&self) -> &'static str {
        match self {
            Severity::Debug => "🚧",
            Severity::Warning => "⚠️",
            Severity::Error => "❌ ERROR",
        }
    }
}

/// Ephemeral maintainer notification. Never persisted.
#[derive(Debug, Clone)]
pub struct DebugEvent {
    /// None sends the message without a severity prefix.
    pub severity: Option<Severity>,
    pub message: String,
}

impl DebugEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity: Some(severity), message: message.into() }
    }

    pub fn plain(message: impl Into<String>) -> Self {
        Self { severity: None, message: message.into() }
    }

    pub fn render(&self) -> String {
        match self.severity {
            Some(s) => format!("{} {}", s.prefix(), self.message),
            None => self.message.clone(),
        }
    }
}
