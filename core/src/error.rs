use crate::types::{Credits, RowId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("No credit balance for vendor {vendor_id} / service '{service_name}'")]
    Consistency {
        vendor_id: RowId,
        service_name: String,
    },

    #[error(
        "Insufficient credits for vendor {vendor_id} / service '{service_name}': \
         {remaining} remaining, {requested} requested"
    )]
    InsufficientCredits {
        vendor_id: RowId,
        service_name: String,
        remaining: Credits,
        requested: Credits,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("A ledger transaction is already open on this store")]
    NestedTransaction,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Consistency { .. } => "consistency",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Persistence(_)
            | Self::NestedTransaction
            | Self::Other(_) => "internal",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
