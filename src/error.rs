use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Cannot convert column '{column}' to {target}: {detail}")]
    Coercion {
        column: String,
        target: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, EtlError>;
