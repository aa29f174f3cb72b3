//! AWS side of the alarm enrichment Lambda: clients, describe calls, metric
//! and log retrieval, Bedrock and SES.

pub mod bedrock;
pub mod clients;
pub mod cloudformation;
pub mod config;
pub mod convert;
pub mod errors;
pub mod health;
pub mod history;
pub mod logs;
pub mod metrics;
pub mod pipeline;
pub mod resources;
pub mod runner;
pub mod ses;
pub mod xray;

pub use config::Config;
pub use errors::AlarmError;
pub use pipeline::Enricher;
