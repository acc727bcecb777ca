use serde::{Deserialize, Serialize};

use super::category::Category;

/// A merged interval during which one category's signal was (near-)continuously present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub start: f64,
    pub end: f64,
    pub category: Category,
    /// Max score observed within the interval.
    pub score: f64,
    pub note: String,
}
