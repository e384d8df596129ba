//! Accumulated pwn time per team, scraped from the HTML scoreboard.
//!
//! For every `pwn*` task a team has solved, the solve time from the cell's
//! `title` counts. For an unsolved one, the time since the task opened counts.
//! Lower totals are better.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};

/// Only tasks whose name starts with this count; the prefix is dropped to
/// match the score table's column headers.
const TASK_PREFIX: &str = "pwn";
const TASK_START_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamTime {
    pub team: String,
    pub seconds: u64,
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::Parse(format!("bad selector '{s}': {e:?}")))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parses the scoreboard page into per-team totals, best (lowest) first.
///
/// The task list is the page's second `<table>`; the scores are `table#scores`,
/// whose first two header cells are rank and team and whose last body cell is
/// the points total.
pub fn parse_times(html: &str, now: NaiveDateTime) -> Result<Vec<TeamTime>> {
    let doc = Html::parse_document(html);
    let table = selector("table")?;
    let scores = selector("table#scores")?;
    let body_row = selector("tbody > tr")?;
    let header_cell = selector("thead > tr > th")?;
    let cell = selector("td")?;
    let span = selector("span")?;

    let tasks_table = doc
        .select(&table)
        .nth(1)
        .ok_or_else(|| AppError::Parse("times page has no task table".to_string()))?;

    let mut open_for: HashMap<String, u64> = HashMap::new();
    for row in tasks_table.select(&body_row) {
        let cols: Vec<ElementRef> = row.select(&cell).collect();
        let Some(name) = cols.first().map(|c| text_of(*c)) else {
            continue;
        };
        let Some(task) = name.strip_prefix(TASK_PREFIX) else {
            continue;
        };
        let started = cols
            .get(2)
            .map(|c| text_of(*c))
            .ok_or_else(|| AppError::Parse(format!("task '{name}' has no start time")))?;
        let started = NaiveDateTime::parse_from_str(&started, TASK_START_FORMAT)
            .map_err(|e| AppError::Parse(format!("task '{name}' start '{started}': {e}")))?;
        open_for.insert(task.to_string(), (now - started).num_seconds().max(0) as u64);
    }

    let score_table = doc
        .select(&scores)
        .next()
        .ok_or_else(|| AppError::Parse("times page has no score table".to_string()))?;
    let task_names: Vec<String> = score_table.select(&header_cell).skip(2).map(text_of).collect();

    let mut teams = Vec::new();
    for row in score_table.select(&body_row) {
        let cols: Vec<ElementRef> = row.select(&cell).collect();
        let Some(team) = cols.get(1).map(|c| text_of(*c)) else {
            continue;
        };
        // Task cells sit between the team name and the points column.
        let end = cols.len().saturating_sub(1).max(2);

        let mut seconds = 0u64;
        for (name, task_cell) in task_names.iter().zip(&cols[2..end]) {
            let Some(open) = open_for.get(name) else {
                continue;
            };
            let solved = task_cell
                .select(&span)
                .next()
                .filter(|s| s.value().classes().any(|c| c == "solved"));
            seconds += match solved {
                Some(s) => {
                    let title = s.value().attr("title").unwrap_or_default();
                    parse_duration(title).ok_or_else(|| {
                        AppError::Parse(format!("team '{team}' task {name}: bad solve time '{title}'"))
                    })?
                }
                None => *open,
            };
        }
        teams.push(TeamTime { team, seconds });
    }

    teams.sort_by_key(|t| t.seconds);
    Ok(teams)
}

/// Reads "2 days 3h 4m 5s". A bare number counts as days.
pub fn parse_duration(raw: &str) -> Option<u64> {
    let mut total = 0u64;
    for part in raw.split_whitespace() {
        if part == "day" || part == "days" {
            continue;
        }
        let (digits, unit) = match part.char_indices().last()? {
            (i, 's') => (&part[..i], 1),
            (i, 'm') => (&part[..i], 60),
            (i, 'h') => (&part[..i], 3_600),
            _ => (part, 86_400),
        };
        total += digits.parse::<u64>().ok()? * unit;
    }
    Some(total)
}

/// `ddd:hh:mm:ss`, days right-aligned to three places.
pub fn format_duration(seconds: u64) -> String {
    let (days, rem) = (seconds / 86_400, seconds % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (mins, secs) = (rem / 60, rem % 60);
    format!("{days:>3}:{hours:02}:{mins:02}:{secs:02}")
}

/// One line per team in a fenced block, for a monospaced reply.
pub fn format_times(teams: &[TeamTime]) -> String {
    if teams.is_empty() {
        return "No teams on the scoreboard yet.".to_string();
    }
    let lines: Vec<String> = teams
        .iter()
        .map(|t| format!("{:<20}{}", t.team, format_duration(t.seconds)))
        .collect();
    format!("```{}```", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<table><tr><td>Leeting scoreboard</td></tr></table>
<table>
  <thead><tr><th>Task</th><th>Points</th><th>Opened</th></tr></thead>
  <tbody>
    <tr><td>pwn1</td><td>100</td><td>2024-05-01 10:00:00</td></tr>
    <tr><td>pwn2</td><td>200</td><td>2024-05-02 10:00:00</td></tr>
    <tr><td>web1</td><td>100</td><td>2024-05-01 10:00:00</td></tr>
  </tbody>
</table>
<table id="scores">
  <thead><tr><th>#</th><th>Team</th><th>1</th><th>2</th><th>Points</th></tr></thead>
  <tbody>
    <tr>
      <td>1</td><td>0xCD</td>
      <td><span class="solved" title="1 day 2h 3m 4s">x</span></td>
      <td><span class="solved" title="30m">x</span></td>
      <td>300</td>
    </tr>
    <tr>
      <td>2</td><td>Foo</td>
      <td><span class="solved" title="5h">x</span></td>
      <td><span></span></td>
      <td>100</td>
    </tr>
  </tbody>
</table>
</body></html>"#;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-05-03 10:00:00", TASK_START_FORMAT).unwrap()
    }

    #[test]
    fn durations_read_and_print() {
        assert_eq!(parse_duration("1 day 2h 3m 4s"), Some(93_784));
        assert_eq!(parse_duration("3 days 10s"), Some(259_210));
        assert_eq!(parse_duration("45s"), Some(45));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(format_duration(93_784), "  1:02:03:04");
        assert_eq!(format_duration(59), "  0:00:00:59");
    }

    #[test]
    fn totals_mix_solve_times_and_open_time() {
        let teams = parse_times(BOARD_HTML, now()).unwrap();
        assert_eq!(
            teams,
            vec![
                // 30m + 1 day 2h 3m 4s
                TeamTime { team: "0xCD".into(), seconds: 1_800 + 93_784 },
                // 5h + unsolved pwn2, open for a day
                TeamTime { team: "Foo".into(), seconds: 18_000 + 86_400 },
            ]
        );
    }

    #[test]
    fn reply_is_a_fenced_table() {
        let teams = parse_times(BOARD_HTML, now()).unwrap();
        assert_eq!(
            format_times(&teams),
            "```0xCD                  1:02:33:04\nFoo                   1:05:00:00```"
        );
        assert_eq!(format_times(&[]), "No teams on the scoreboard yet.");
    }

    #[test]
    fn missing_tables_are_parse_errors() {
        let err = parse_times("<html><body><table></table></body></html>", now()).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        let no_scores = "<table></table><table><tbody></tbody></table>";
        assert!(matches!(parse_times(no_scores, now()), Err(AppError::Parse(_))));
    }

    #[test]
    fn bad_start_time_is_reported() {
        let html = BOARD_HTML.replace("2024-05-02 10:00:00", "yesterday");
        let err = parse_times(&html, now()).unwrap_err();
        assert!(err.to_string().contains("pwn2"));
    }
}
