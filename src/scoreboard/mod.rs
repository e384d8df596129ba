pub mod fetcher;
pub mod parser;
pub mod times;

pub use fetcher::{HttpScoreboard, ScoreboardSource};
pub use parser::parse;
