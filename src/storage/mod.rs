pub mod entities;
pub mod state_store;
