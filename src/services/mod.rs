mod gsc;
mod seo_analyzer;
pub mod trends;

#[cfg(test)]
pub(crate) mod test_support;

pub use gsc::{consent_url, GscClient};
pub use seo_analyzer::{
    analyze_html, AnalysisJob, SeoAnalyzer, DEFAULT_MAX_PAGE_BYTES, DEFAULT_TIMEOUT_SECS,
};
