use anyhow::Result;
use clap::Parser;
use sitetime::{
    bridge::{args::BridgeArgs, start_bridge},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, BRIDGE_PREFIX},
        runtime::single_thread_runtime,
    },
};

// The browser launches this binary itself and keeps stdin open for the
// lifetime of the extension, so unlike a classic daemon there is nothing to
// detach from.
fn main() -> Result<()> {
    let args = BridgeArgs::parse();

    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, Ok)?;
    enable_logging(BRIDGE_PREFIX, &app_dir, args.log, args.log_console)?;

    single_thread_runtime()?.block_on(start_bridge(app_dir, args.remainder))
}
