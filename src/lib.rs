//! Measures how long the focused browser tab spends on a fixed set of
//! websites. A long-running bridge process receives tab lifecycle events from
//! the browser and accumulates whole minutes per site, while the cli surface
//! displays totals and edits tracking preferences.

pub mod bridge;
pub mod cli;
pub mod storage;
pub mod tracker;
pub mod utils;
