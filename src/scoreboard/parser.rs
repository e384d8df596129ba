use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::types::{NewsEntry, NewsFeed, ScoreRow, ScoreTable};

const NEWS_MARKER: &str = "Last Pwns:";
const SCORES_MARKER: &str = "\n\nScores:\n";

fn ansi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static ANSI pattern"))
}

/// Strip terminal color codes (`ESC[31m`, `ESC[0m`, ...).
pub fn strip_ansi(raw: &str) -> String {
    ansi_re().replace_all(raw, "").into_owned()
}

/// Parse the terminal scoreboard into its news feed and score table.
///
/// Layout after color stripping:
/// ```text
/// <preamble>
/// Last Pwns:
/// <timestamp>: <headline>      (newest first)
///
/// Scores:
/// <rank> <col> <col> ...
/// ```
/// A missing section marker is a `Parse` error; the caller treats it as
/// transient since the page comes back once upstream recovers.
pub fn parse(raw: &str) -> Result<(NewsFeed, ScoreTable)> {
    let text = strip_ansi(raw).replace("\r\n", "\n");

    let start = text
        .find(NEWS_MARKER)
        .ok_or_else(|| AppError::Parse(format!("missing '{NEWS_MARKER}' section")))?;
    let body = &text[start + NEWS_MARKER.len()..];
    let body = body.strip_prefix('\n').unwrap_or(body);

    // An empty news section puts the blank line right after the marker.
    let (news, scores) = if let Some(rest) = body.strip_prefix("\nScores:\n") {
        ("", rest)
    } else {
        body.split_once(SCORES_MARKER)
            .ok_or_else(|| AppError::Parse("missing 'Scores:' section".to_string()))?
    };

    Ok((parse_news(news)?, parse_scores(scores)))
}

fn parse_news(section: &str) -> Result<NewsFeed> {
    section
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            // Timestamps may contain ':' themselves ("10:00"), the separator is ": ".
            let (ts, headline) = line
                .split_once(": ")
                .ok_or_else(|| AppError::Parse(format!("malformed news line: {line:?}")))?;
            Ok(NewsEntry {
                timestamp: ts.trim().to_string(),
                headline: headline.trim().to_string(),
            })
        })
        .collect()
}

fn parse_scores(section: &str) -> ScoreTable {
    section
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let rank = tokens.next()?.to_string();
            Some(ScoreRow {
                rank,
                columns: tokens.map(str::to_string).collect(),
            })
        })
        .collect()
}
