pub mod app_config;
pub mod local_store;

pub use local_store::LocalStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store initialization failed: {0}")]
    Init(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
