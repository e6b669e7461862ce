use std::collections::HashMap;

/// Static identity of a website the tracker is capable of measuring. The set
/// is fixed at build time; which entries actually accumulate is decided by the
/// per-hostname enablement in [Settings](crate::storage::entities::Settings).
#[derive(Debug, PartialEq, Eq)]
pub struct TrackedSite {
    pub hostname: &'static str,
    pub display_name: &'static str,
}

pub const TRACKED_SITES: &[TrackedSite] = &[
    TrackedSite {
        hostname: "youtube.com",
        display_name: "YouTube",
    },
    TrackedSite {
        hostname: "x.com",
        display_name: "X",
    },
    TrackedSite {
        hostname: "instagram.com",
        display_name: "Instagram",
    },
    TrackedSite {
        hostname: "reddit.com",
        display_name: "Reddit",
    },
    TrackedSite {
        hostname: "tiktok.com",
        display_name: "TikTok",
    },
    TrackedSite {
        hostname: "facebook.com",
        display_name: "Facebook",
    },
];

/// Matches a hostname against the static list. Subdomains count as the parent
/// site, so `m.youtube.com` resolves to youtube.com.
pub fn find_by_host(host: &str) -> Option<&'static TrackedSite> {
    let host = host.strip_prefix("www.").unwrap_or(host);
    TRACKED_SITES.iter().find(|site| {
        host == site.hostname
            || host
                .strip_suffix(site.hostname)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

pub fn default_enabled_platforms() -> HashMap<String, bool> {
    TRACKED_SITES
        .iter()
        .map(|site| (site.hostname.to_string(), true))
        .collect()
}
