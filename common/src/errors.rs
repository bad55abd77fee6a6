// Error handling framework
// Fatal-vs-recoverable policy lives in the monitor engine; these types only classify.

use thiserror::Error;

/// Configuration errors. Always fatal at startup (exit code 78).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory does not exist: {0}")]
    MissingDirectory(String),

    #[error("Config file not found, wrote example config to {path}; please configure and try again")]
    TemplateWritten { path: String },

    #[error("Failed to read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Unparsable { path: String, reason: String },

    #[error("Connection block not found, please check your config")]
    MissingConnection,

    #[error("Missing connection details ({0}), please check your config")]
    MissingConnectionDetails(String),

    #[error("No monitoring blocks configured")]
    NoServices,

    #[error("Missing required value '{field}' in status block '{service}'")]
    MissingField { service: String, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),
}

impl ConfigError {
    /// A missing config directory is a runtime error, everything else is a config error.
    pub fn is_config_error(&self) -> bool {
        !matches!(self, ConfigError::MissingDirectory(_))
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Settings(err.to_string())
    }
}

/// Transport-level failures talking to a monitored source or the CI host
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("HTTP request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// The source returned something that is not JSON
#[derive(Error, Debug)]
#[error("Invalid JSON document: {reason}")]
pub struct DecodeError {
    pub reason: String,
    /// Raw response text, kept for diagnostics
    pub raw: String,
}

/// A path expression that does not resolve against the document
#[derive(Error, Debug)]
#[error("Invalid structure '{path}' at segment '{segment}': {reason}")]
pub struct PathError {
    pub path: String,
    pub segment: String,
    pub reason: String,
    /// The value the walk had reached when it failed
    pub partial: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// CI API failures while resolving or forking a build
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid build record from {url}: {reason}")]
    InvalidBuild { url: String, reason: String },

    #[error("No build on branch '{branch}' for {repo} within {scanned} builds before #{latest}")]
    BranchNotFound {
        repo: String,
        branch: String,
        latest: u64,
        scanned: u64,
    },

    #[error("Fork of build #{number} for {repo} rejected with status {status}")]
    Rejected { repo: String, number: u64, status: u16 },
}

/// Persisting the watch store failed
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Failed to write config file {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// A single service check failed before any comparison happened
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl From<DecodeError> for CheckError {
    fn from(err: DecodeError) -> Self {
        CheckError::Resolve(ResolveError::Decode(err))
    }
}

impl From<PathError> for CheckError {
    fn from(err: PathError) -> Self {
        CheckError::Resolve(ResolveError::Path(err))
    }
}

impl CheckError {
    /// Short label used for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::Fetch(_) => "fetch",
            CheckError::Resolve(ResolveError::Decode(_)) => "decode",
            CheckError::Resolve(ResolveError::Path(_)) => "path",
        }
    }
}

/// Errors that terminate the monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to initialise value for '{service}': {source}")]
    Bootstrap {
        service: String,
        #[source]
        source: CheckError,
    },

    #[error("Failed to persist value for '{service}': {source}")]
    Store {
        service: String,
        #[source]
        source: StoreError,
    },
}
