use heatwatch_core::StoreError;

/// Map a driver error onto the store error the engine understands.
pub(crate) fn db_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(e.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}
