use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmdError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, #[source] source: std::io::Error },

    #[error("`{command}` exited with status {code:?}\nstderr: {stderr}")]
    NonZeroExit { command: String, code: Option<i32>, stderr: String },

    #[error("`{command}` produced non-utf8 output")]
    NonUtf8Output { command: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: std::time::Duration },
}

pub type CmdResult<T> = Result<T, CmdError>;
