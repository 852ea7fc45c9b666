use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] laddertrack_core::ValidationError),

    #[error(transparent)]
    Client(#[from] laddertrack_core::ClientError),

    #[error(transparent)]
    Warehouse(#[from] laddertrack_warehouse::WarehouseError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Client(laddertrack_core::ClientError::SeasonNotFound { .. }) => 3,
            Self::Client(_) => 6,
            Self::Serialization(_) => 4,
            Self::Warehouse(_) => 11,
            Self::Io(_) => 10,
        }
    }
}
