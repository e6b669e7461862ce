pub mod totals;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    bridge::start_bridge,
    storage::{
        entities::Settings,
        state_store::{JsonStateStore, StateStore},
    },
    tracker::{controller::RemainderPolicy, sites},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Sitetime", version, long_about = None)]
#[command(about = "Tracks active browser time spent on selected websites", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the browser bridge in the current console, reading events from stdin. Used as the native messaging entry point and for debugging"
    )]
    Serve {
        #[arg(long, value_enum, default_value_t)]
        remainder: RemainderPolicy,
    },
    #[command(about = "Display accumulated time per tracked site")]
    Totals,
    #[command(about = "List tracked sites and whether each one is enabled")]
    Sites,
    #[command(about = "Enable tracking for a site")]
    Enable { hostname: String },
    #[command(about = "Disable tracking for a site")]
    Disable { hostname: String },
    #[command(about = "Set the popup theme")]
    Theme { name: String },
    #[command(about = "Set or clear the popup background image")]
    Background {
        #[arg(conflicts_with = "clear")]
        path: Option<PathBuf>,
        #[arg(long)]
        clear: bool,
    },
    #[command(about = "Reset all accumulated totals to zero")]
    Reset,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Serve { remainder } => start_bridge(app_dir, remainder).await,
        Commands::Totals => {
            let store = JsonStateStore::new(app_dir)?;
            totals::show_totals(&store).await
        }
        Commands::Sites => {
            let store = JsonStateStore::new(app_dir)?;
            totals::show_sites(&store).await
        }
        Commands::Enable { hostname } => {
            let store = JsonStateStore::new(app_dir)?;
            set_platform_enabled(&store, &hostname, true).await
        }
        Commands::Disable { hostname } => {
            let store = JsonStateStore::new(app_dir)?;
            set_platform_enabled(&store, &hostname, false).await
        }
        Commands::Theme { name } => {
            let store = JsonStateStore::new(app_dir)?;
            set_theme(&store, name).await
        }
        Commands::Background { path, clear } => {
            let store = JsonStateStore::new(app_dir)?;
            set_background(&store, path, clear).await
        }
        Commands::Reset => {
            let store = JsonStateStore::new(app_dir)?;
            reset_totals(&store).await
        }
    }
}

async fn load_settings_or_default(store: &JsonStateStore) -> Result<Settings> {
    Ok(store.load_settings().await?.unwrap_or_default())
}

/// Persists a platform toggle. A bridge that is already running applies the
/// change when the extension sends its updateEnabledPlatforms message; edits
/// made here are picked up at the next bridge start.
async fn set_platform_enabled(store: &JsonStateStore, hostname: &str, enabled: bool) -> Result<()> {
    let Some(site) = sites::find_by_host(hostname) else {
        bail!(
            "'{hostname}' is not a tracked site. Tracked sites: {}",
            sites::TRACKED_SITES
                .iter()
                .map(|site| site.hostname)
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let mut settings = load_settings_or_default(store).await?;
    settings
        .enabled_platforms
        .insert(site.hostname.to_string(), enabled);
    store.save_settings(&settings).await?;

    println!(
        "{} is now {}",
        site.display_name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn set_theme(store: &JsonStateStore, name: String) -> Result<()> {
    let mut settings = load_settings_or_default(store).await?;
    settings.theme = name;
    store.save_settings(&settings).await?;
    Ok(())
}

async fn set_background(
    store: &JsonStateStore,
    path: Option<PathBuf>,
    clear: bool,
) -> Result<()> {
    let mut settings = load_settings_or_default(store).await?;
    settings.custom_bg_image = match (path, clear) {
        (_, true) => None,
        (Some(path), false) => Some(encode_image_data_uri(&path).await?),
        (None, false) => bail!("Provide an image path or pass --clear"),
    };
    store.save_settings(&settings).await?;
    Ok(())
}

/// Embeds an image file the way the popup stores it, as a data uri.
async fn encode_image_data_uri(path: &Path) -> Result<String> {
    let mime = match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => bail!("Unsupported image type, expected png, jpg, jpeg, gif or webp"),
    };

    let bytes = tokio::fs::read(path).await?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

async fn reset_totals(store: &JsonStateStore) -> Result<()> {
    let mut data = store.load_time_data().await?;
    for entry in data.values_mut() {
        entry.total_minutes = 0;
    }
    store.save_time_data(&data).await?;
    println!("All totals reset to zero");
    Ok(())
}
