mod suggester;

pub use suggester::{KeywordSuggester, KeywordSuggestion};
