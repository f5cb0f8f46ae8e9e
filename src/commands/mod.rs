//! Command implementations
//!
//! Each module corresponds to a subcommand of the `lawchat` CLI.

pub mod ask;
pub mod chat;
pub mod check_key;
pub mod ingest;
pub mod stats;

pub use ask::run as ask_run;
pub use chat::run as chat_run;
pub use check_key::run as check_key_run;
pub use ingest::{run as ingest_run, IngestArgs};
pub use stats::run as stats_run;
