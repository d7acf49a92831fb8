use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to connect to postgresql: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("unexpected row shape: {0}")]
    Decode(String),

    #[error(transparent)]
    Command(#[from] pgsentry_cmd::CmdError),
}

pub type DbResult<T> = Result<T, DbError>;
