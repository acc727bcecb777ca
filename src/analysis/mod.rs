pub mod aggregate;
pub mod text;
pub mod timeline;

pub use aggregate::aggregate;
pub use text::{aggregate_text_scores, TextAnalyzer};
pub use timeline::{TimelineBuilder, TimelineConfig};
