//! Runs the shell command templates configured under `[commands]`:
//! promote, rewind, pg start/stop/status/reload, pooler start/stop/status,
//! `list_clusters`, and `generate_recovery_conf`.

pub mod error;
pub mod runner;

pub use error::{CmdError, CmdResult};
pub use runner::{CommandOutput, CommandRunner, Substitutions};
