use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tracker::sites;

/// User preferences persisted by the settings surface. The tracker only ever
/// consumes `enabled_platforms`; theme and background belong to the display
/// side alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub enabled_platforms: HashMap<String, bool>,
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_bg_image: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled_platforms: sites::default_enabled_platforms(),
            theme: "default".into(),
            custom_bg_image: None,
        }
    }
}

/// Running total for one tracked site. Minutes only grow, except for an
/// explicit user reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteTime {
    pub name: String,
    pub total_minutes: u64,
}

/// Persisted totals keyed by hostname. Entries appear lazily on first
/// accumulation.
pub type TimeData = HashMap<String, SiteTime>;
