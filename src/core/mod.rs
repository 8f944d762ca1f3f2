pub mod agents;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod outputs;
pub mod query;
pub mod runs;
pub mod service;
pub mod signals;
pub mod store;
pub mod terminal;
