use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Search arguments as the UI supplies them. Every field is optional;
/// an absent or blank field simply skips that filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>, // Just date, ignore time for search match
}

impl SearchQuery {
    pub fn new(
        origin: Option<String>,
        destination: Option<String>,
        date: Option<NaiveDate>,
    ) -> Self {
        Self {
            origin: normalize(origin),
            destination: normalize(destination),
            date,
        }
    }

    /// Deterministic cache key: fixed field order, absent fields encoded
    /// as `*`. Identical arguments always produce identical keys.
    pub fn canonical(&self) -> String {
        format!(
            "origin={}|dest={}|date={}",
            self.origin.as_deref().unwrap_or("*"),
            self.destination.as_deref().unwrap_or("*"),
            self.date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "*".to_string()),
        )
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
