use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    IoError(std::io::Error),
    NoTablesReadable,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::IoError(e) => write!(f, "Snapshot IO error: {}", e),
            SnapshotError::NoTablesReadable => write!(f, "No socket table could be read"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    MigrationFailed(i64),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::MigrationFailed(v) => write!(f, "Migration to version {} failed", v),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum PipelineError {
    StorageError(StorageError),
    SnapshotError(SnapshotError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::StorageError(e) => write!(f, "Storage error: {}", e),
            PipelineError::SnapshotError(e) => write!(f, "Snapshot error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::StorageError(err)
    }
}

impl From<SnapshotError> for PipelineError {
    fn from(err: SnapshotError) -> Self {
        PipelineError::SnapshotError(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
