//! Application error types using thiserror
//!
//! Error hierarchy:
//! - FetchError: Issues talking to a remote server (status, timeout, transport)
//! - ResolveError: Remote metadata did not contain what a resolver expects
//! - DownloadError: Artifact download or verification failures
//! - ConfigError: Issues with settings or CLI configuration
//! - IoError: File system operation failures

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Network related errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Latest version resolution errors
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Download and verification errors
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Configuration related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO related errors
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors raised by the HTTP fetch layer
#[derive(Error, Debug)]
pub enum FetchError {
    /// Server answered 404
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// Server answered with a non-success status
    #[error("request to {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Rate limit exceeded after all retries
    #[error("rate limit exceeded for {url}")]
    RateLimited { url: String },

    /// Connection could not be established or broke down
    #[error("failed to fetch {url}: {message}")]
    Request { url: String, message: String },

    /// Request timed out
    #[error("timeout while fetching {url}")]
    Timeout { url: String },

    /// Body could not be decoded
    #[error("invalid response from {url}: {message}")]
    InvalidBody { url: String, message: String },

    /// Writing the streamed body to disk failed
    #[error("failed to write download to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while resolving the latest version of an app
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The underlying fetch failed
    #[error("failed to resolve {app}: {source}")]
    Network {
        app: String,
        #[source]
        source: FetchError,
    },

    /// Expected structure is missing from the remote metadata
    #[error("unexpected metadata for {app}: {message}")]
    MissingData { app: String, message: String },

    /// No build exists for the device architecture
    #[error("{app} has no build for the device ABIs {abis}")]
    UnsupportedAbi { app: String, abis: String },
}

/// Errors raised by the download and verify pipeline
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The artifact could not be fetched
    #[error(transparent)]
    Network(#[from] FetchError),

    /// Downloaded size differs from the advertised size
    #[error("size of download should be {expected} bytes, but it is {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Downloaded file hash differs from the advertised hash
    #[error("SHA-256 of download should be {expected}, but it is {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The archive does not contain the expected entry
    #[error("archive {path} has no entry named '{entry}'")]
    MissingArchiveEntry { path: PathBuf, entry: String },

    /// The final artifact is not a readable package archive
    #[error("artifact {path} is not a valid package: {message}")]
    CorruptArtifact { path: PathBuf, message: String },

    /// Not enough free space in the cache directory
    #[error("not enough storage in {path}: {available} bytes free, {required} required")]
    InsufficientStorage {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    /// Another download for the same app is still running
    #[error("a download for {package} is already in progress")]
    AlreadyInProgress { package: String },

    /// The download was cancelled before it finished
    #[error("download was cancelled")]
    Cancelled,

    /// The download task ended abnormally
    #[error("download task failed: {message}")]
    TaskFailed { message: String },

    /// File system failure in the cache directory
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid duration format
    #[error("invalid duration format '{value}': expected format like '30min', '6h', '1d', '2w'")]
    InvalidDuration { value: String },

    /// Settings file could not be parsed
    #[error("failed to parse settings {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Unknown app identifier
    #[error("unknown app '{value}'")]
    UnknownApp { value: String },

    /// Unknown ABI name
    #[error("unknown ABI '{value}': expected 'arm64-v8a', 'armeabi-v7a', 'x86_64' or 'x86'")]
    UnknownAbi { value: String },
}

/// Errors related to IO operations
#[derive(Error, Debug)]
pub enum IoError {
    /// Generic IO error
    #[error("IO error at {path}: {source}")]
    Generic {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// Whether the error stems from the network rather than from a bug or bad data
    pub fn is_network(&self) -> bool {
        match self {
            AppError::Fetch(_) => true,
            AppError::Resolve(ResolveError::Network { .. }) => true,
            AppError::Download(DownloadError::Network(_)) => true,
            _ => false,
        }
    }
}

impl FetchError {
    /// Creates a new Status error
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        FetchError::Status {
            url: url.into(),
            status,
        }
    }

    /// Creates a new Request error
    pub fn request(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Request {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a new Timeout error
    pub fn timeout(url: impl Into<String>) -> Self {
        FetchError::Timeout { url: url.into() }
    }

    /// Creates a new InvalidBody error
    pub fn invalid_body(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::InvalidBody {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Request { .. } | FetchError::Timeout { .. } | FetchError::RateLimited { .. }
        )
    }
}

impl ResolveError {
    /// Creates a new Network error
    pub fn network(app: impl Into<String>, source: FetchError) -> Self {
        ResolveError::Network {
            app: app.into(),
            source,
        }
    }

    /// Creates a new MissingData error
    pub fn missing_data(app: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::MissingData {
            app: app.into(),
            message: message.into(),
        }
    }
}

impl IoError {
    /// Creates a new Generic IO error
    pub fn generic(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::Generic {
            path: path.into(),
            source,
        }
    }
}
