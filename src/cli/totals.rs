use ansi_term::{Colour, Style};
use anyhow::Result;

use crate::{
    storage::state_store::{JsonStateStore, StateStore},
    tracker::sites::TRACKED_SITES,
};

/// Popup-style rendering of a running total.
pub fn format_total(minutes: u64) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

pub async fn show_totals(store: &JsonStateStore) -> Result<()> {
    let data = store.load_time_data().await?;
    let settings = store.load_settings().await?.unwrap_or_default();

    let mut overall = 0;
    for site in TRACKED_SITES {
        let minutes = data.get(site.hostname).map_or(0, |entry| entry.total_minutes);
        overall += minutes;

        let enabled = settings
            .enabled_platforms
            .get(site.hostname)
            .copied()
            .unwrap_or(false);
        let name = if enabled {
            Colour::Cyan.paint(site.display_name)
        } else {
            Style::new().dimmed().paint(site.display_name)
        };
        println!("{name}\t{}", format_total(minutes));
    }

    println!(
        "{}\t{}",
        Style::new().bold().paint("Total"),
        Style::new().bold().paint(format_total(overall))
    );
    Ok(())
}

pub async fn show_sites(store: &JsonStateStore) -> Result<()> {
    let settings = store.load_settings().await?.unwrap_or_default();

    for site in TRACKED_SITES {
        let enabled = settings
            .enabled_platforms
            .get(site.hostname)
            .copied()
            .unwrap_or(false);
        let state = if enabled {
            Colour::Green.paint("enabled")
        } else {
            Colour::Red.paint("disabled")
        };
        println!("{}\t{}\t{state}", site.display_name, site.hostname);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::format_total;

    #[test]
    fn totals_format_as_hours_and_minutes() {
        assert_eq!(format_total(0), "0h 0m");
        assert_eq!(format_total(59), "0h 59m");
        assert_eq!(format_total(60), "1h 0m");
        assert_eq!(format_total(125), "2h 5m");
        assert_eq!(format_total(1440), "24h 0m");
    }
}
