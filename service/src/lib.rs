//! Infrastructure concerns shared by the whole application: runtime
//! configuration sourced from the CLI/environment and logger setup.

pub mod config;
pub mod logging;
