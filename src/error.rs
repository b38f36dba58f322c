//! Error types for leaseq.

use thiserror::Error;

use crate::model::ItemId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue already exists: {0}")]
    AlreadyExists(String),

    #[error("queue has been disposed: {0}")]
    Disposed(String),

    #[error("invalid queue name: {0:?}")]
    InvalidName(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("duplicate item id: {0}")]
    DuplicateId(ItemId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
