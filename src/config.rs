use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::TrackedEntity;

pub const SCOREBOARD_URL: &str = "https://leeting.sec.in.tum.de/t";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Fallback location for the bot token when `BOT_TOKEN` is unset.
pub const TOKEN_FILE: &str = "token.txt";

/// StateStore keys for the two checkpoint halves.
pub const LAST_PWN_KEY: &str = "last_pwn_time";
pub const LAST_RANK_KEY: &str = "last_rank";

/// Normal sleep between poll cycles (seconds).
pub const POLL_INTERVAL_SECS: u64 = 600;

/// Cooldown after a faulted poll cycle (seconds).
pub const RESTART_COOLDOWN_SECS: u64 = 300;

/// Delay between two sends of one broadcast, keeps us under Telegram's flood limits.
pub const SEND_DELAY_MS: u64 = 1000;

/// Per-request HTTP timeout for outbound calls (seconds).
pub const SEND_TIMEOUT_SECS: u64 = 30;

/// Long-poll timeout passed to getUpdates (seconds).
pub const UPDATES_LONG_POLL_SECS: u64 = 25;

/// Slack on top of the long poll before a getUpdates request is abandoned.
/// getUpdates carries its own timeout, independent of SEND_TIMEOUT_SECS.
pub const UPDATES_TIMEOUT_GRACE_SECS: u64 = 10;

/// Back-off after a failed getUpdates call.
pub const LISTENER_BACKOFF_MS: &[u64] = &[1000, 2000, 5000];

pub const WELCOME_MESSAGE: &str = "Hello!";
pub const STILL_HERE_MESSAGE: &str = "Yes, I'm still here!";
pub const TIMES_UNAVAILABLE_MESSAGE: &str = "Times are unavailable right now, try again later.";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Maintainer debug recipient (MAINTAINER_CHAT_ID). None disables the channel.
    pub maintainer_chat_id: Option<i64>,
    /// Terminal rendering polled for news and ranks.
    pub scoreboard_url: String,
    /// HTML page behind /times (SCOREBOARD_HTML_URL, default: the terminal URL minus "/t").
    pub scoreboard_html_url: String,
    pub telegram_api_url: String,
    pub log_level: String,
    pub db_path: String,
    /// Health API port (API_PORT). 0 disables the HTTP server.
    pub api_port: u16,
    pub poll_interval: Duration,
    pub restart_cooldown: Duration,
    pub send_delay: Duration,
    pub send_timeout: Duration,
    /// Row filter for the rank detector (TRACKED_ENTITY, e.g. "0=0xCD").
    pub tracked_entity: Option<TrackedEntity>,
    /// Compare ranks as integers when both parse (NUMERIC_RANKS).
    pub numeric_ranks: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let maintainer_chat_id = match std::env::var("MAINTAINER_CHAT_ID") {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().parse::<i64>().map_err(|_| {
                AppError::Config("MAINTAINER_CHAT_ID must be an integer chat id".to_string())
            })?),
            _ => None,
        };

        let tracked_entity = match std::env::var("TRACKED_ENTITY") {
            Ok(v) if !v.trim().is_empty() => Some(TrackedEntity::parse(&v)?),
            _ => None,
        };

        let scoreboard_url =
            std::env::var("SCOREBOARD_URL").unwrap_or_else(|_| SCOREBOARD_URL.to_string());
        let scoreboard_html_url = std::env::var("SCOREBOARD_HTML_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| html_url_for(&scoreboard_url));

        Ok(Self {
            bot_token: load_bot_token()?,
            maintainer_chat_id,
            scoreboard_url,
            scoreboard_html_url,
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "pwnwatch.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", POLL_INTERVAL_SECS)),
            restart_cooldown: Duration::from_secs(env_u64(
                "RESTART_COOLDOWN_SECS",
                RESTART_COOLDOWN_SECS,
            )),
            send_delay: Duration::from_millis(env_u64("SEND_DELAY_MS", SEND_DELAY_MS)),
            send_timeout: Duration::from_secs(env_u64("SEND_TIMEOUT_SECS", SEND_TIMEOUT_SECS)),
            tracked_entity,
            numeric_ranks: std::env::var("NUMERIC_RANKS")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        })
    }
}

/// `https://host/t` → `https://host/`. Other URLs are used as they are.
fn html_url_for(terminal_url: &str) -> String {
    terminal_url
        .trim_end_matches('/')
        .strip_suffix("/t")
        .map(|base| format!("{base}/"))
        .unwrap_or_else(|| terminal_url.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// BOT_TOKEN wins; otherwise the first line of `token.txt`.
fn load_bot_token() -> Result<String> {
    if let Ok(token) = std::env::var("BOT_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    match std::fs::read_to_string(TOKEN_FILE) {
        Ok(contents) => first_line(&contents)
            .ok_or_else(|| AppError::Config(format!("{TOKEN_FILE} is empty"))),
        Err(_) => Err(AppError::Config("No bot token found".to_string())),
    }
}

fn first_line(contents: &str) -> Option<String> {
    contents
        .lines()
        .next()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
}
