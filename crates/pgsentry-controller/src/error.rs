use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Db(#[from] pgsentry_db::DbError),

    #[error(transparent)]
    Dcs(#[from] pgsentry_dcs::DcsError),

    #[error(transparent)]
    Cmd(#[from] pgsentry_cmd::CmdError),

    #[error(transparent)]
    Replication(#[from] pgsentry_replication::ReplicationError),

    #[error(transparent)]
    Election(#[from] pgsentry_election::ElectionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("lost local PostgreSQL and the last known role, nothing to recover from")]
    NoPreviousState,

    #[error("simple switch to the new primary failed")]
    SimpleSwitchFailed,

    #[error("pg_rewind failed after the configured number of retries")]
    RewindFailed,
}

pub type ControllerResult<T> = Result<T, ControllerError>;
