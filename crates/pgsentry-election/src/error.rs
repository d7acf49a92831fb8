use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("failed to change election status")]
    StatusChange,

    #[error("no winner found in election")]
    NoWinner,

    #[error("failed to vote in election")]
    VoteFail,

    #[error("failed to clean up current votes")]
    Cleanup,

    #[error("election process timed out")]
    Timeout,

    #[error(transparent)]
    Dcs(#[from] pgsentry_dcs::DcsError),

    #[error(transparent)]
    Replication(#[from] pgsentry_replication::ReplicationError),
}

pub type ElectionResult<T> = Result<T, ElectionError>;
