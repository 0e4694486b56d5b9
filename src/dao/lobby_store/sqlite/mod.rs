mod config;
mod error;
mod rows;
mod schema;
pub mod store;

pub use config::SqliteConfig;
pub use error::SqliteDaoError;
pub use store::SqliteLobbyStore;

use crate::dao::storage::StorageError;

impl From<SqliteDaoError> for StorageError {
    fn from(err: SqliteDaoError) -> Self {
        if err.is_transient() {
            let message = err.to_string();
            return StorageError::transient(message, Some(Box::new(err)));
        }
        if err.is_constraint() {
            return StorageError::Constraint {
                message: err.to_string(),
            };
        }
        StorageError::unavailable(err.to_string(), err)
    }
}
