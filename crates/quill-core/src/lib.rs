pub mod actions;
pub mod context;
pub mod errors;
pub mod events;
pub mod ids;
pub mod provider;
pub mod turns;
