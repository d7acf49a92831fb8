use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Db(#[from] pgsentry_db::DbError),

    #[error(transparent)]
    Dcs(#[from] pgsentry_dcs::DcsError),

    #[error("no quorum hosts are configured and sync replication was requested")]
    EmptyQuorum,
}

pub type ReplicationResult<T> = Result<T, ReplicationError>;
