// Watch store backed by dronetrigger.toml
// Values are read with serde and written back through toml_edit so user comments survive.

use crate::errors::{ConfigError, StoreError};
use crate::models::{
    ConnectionSettings, ServiceWatch, WatchValue, DEFAULT_BRANCH, DEFAULT_MAX_LOOKBACK,
    DEFAULT_POLL_INTERVAL_SECONDS,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use toml_edit::DocumentMut;
use tracing::{info, instrument, warn};

/// File name looked up inside the config directory
pub const CONFIG_FILE_NAME: &str = "dronetrigger.toml";

/// Reserved table holding the Drone connection details
pub const CONNECTION_SECTION: &str = "Connection";

/// Written on first run when no config file exists
pub const TEMPLATE: &str = r#"[Connection]
# URL of the drone server, including port and protocol
host = "https://drone.example.org"
auth_key = "eyJEXAMPLE.AUTH.KEY"
# Seconds between polling cycles (default: 300)
#sleep_time = 300
# How many older builds to search for a matching branch (default: 100)
#max_lookback = 100

#[ExampleGitHubBuild]
# Compares the sha of the latest commit on a GitHub branch
# Name of the repo to trigger in drone
#drone_repo = "Example/HelloWorld"
# URL of the JSON document to poll
#url = "https://api.github.com/repos/Kaylee/ShinyRepo/git/refs/heads/master"
# Path to the watched value inside the document
#structure = "object.sha"
# Branch whose latest drone build is forked (default: master)
#branch = "master"

#[ExampleGitHubRelease]
#drone_repo = "Example/HelloRelease"
#url = "https://api.github.com/repos/Kaylee/ShinyRepo/releases/latest"
#structure = "name"
"#;

/// Durable mapping of watched services and their last seen values
pub trait WatchStore: Send {
    /// All services, ordered by name
    fn services(&self) -> Vec<ServiceWatch>;

    /// Set `current_value` for `service` and persist before returning.
    ///
    /// The in-memory value is updated even when the write fails. The store is then
    /// dirty and the write is retried by the next `flush` or `record_value`.
    fn record_value(&mut self, service: &str, value: &WatchValue) -> Result<(), StoreError>;

    /// True while an accepted value has not reached durable storage
    fn is_dirty(&self) -> bool;

    /// Write pending values, if any
    fn flush(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "Connection")]
    connection: Option<RawConnection>,
    #[serde(flatten)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    host: Option<String>,
    auth_key: Option<String>,
    sleep_time: Option<u64>,
    max_lookback: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    url: Option<String>,
    structure: Option<String>,
    drone_repo: Option<String>,
    branch: Option<String>,
    current_value: Option<toml::Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require(service: &str, field: &str, value: Option<String>) -> Result<String, ConfigError> {
    non_empty(value).ok_or_else(|| ConfigError::MissingField {
        service: service.to_string(),
        field: field.to_string(),
    })
}

/// Canonical text of a stored value. Hand-edited numbers and booleans render the way
/// resolved JSON scalars do; an empty string means not yet initialised.
fn stored_value(service: &str, value: toml::Value) -> Result<Option<WatchValue>, ConfigError> {
    let text = match value {
        toml::Value::String(s) => s,
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(|n| n.to_string())
            .unwrap_or_else(|| f.to_string()),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(d) => d.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.current_value", service),
                reason: "must be a scalar".to_string(),
            })
        }
    };

    Ok(non_empty(Some(text)).map(WatchValue::new))
}

/// Parse and validate the contents of a config file
pub fn parse_config(
    content: &str,
    origin: &str,
) -> Result<(ConnectionSettings, BTreeMap<String, ServiceWatch>), ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Unparsable {
        path: origin.to_string(),
        reason: e.to_string(),
    })?;

    let connection = raw.connection.ok_or(ConfigError::MissingConnection)?;
    let drone_host = non_empty(connection.host)
        .ok_or_else(|| ConfigError::MissingConnectionDetails("host".to_string()))?;
    let auth_key = non_empty(connection.auth_key)
        .ok_or_else(|| ConfigError::MissingConnectionDetails("auth_key".to_string()))?;

    let poll_interval_seconds = connection
        .sleep_time
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);
    if poll_interval_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            field: "sleep_time".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    let connection = ConnectionSettings {
        drone_host,
        auth_key,
        poll_interval_seconds,
        max_lookback: connection.max_lookback.unwrap_or(DEFAULT_MAX_LOOKBACK),
    };

    if raw.services.is_empty() {
        return Err(ConfigError::NoServices);
    }

    let mut services = BTreeMap::new();
    for (name, service) in raw.services {
        let watch = ServiceWatch {
            source_url: require(&name, "url", service.url)?,
            path_expression: require(&name, "structure", service.structure)?,
            target_repo: require(&name, "drone_repo", service.drone_repo)?,
            branch: non_empty(service.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            last_value: match service.current_value {
                Some(value) => stored_value(&name, value)?,
                None => None,
            },
            name: name.clone(),
        };
        services.insert(name, watch);
    }

    Ok((connection, services))
}

/// Write the example config. Refuses to overwrite an existing file.
pub fn write_template(path: &Path) -> Result<(), ConfigError> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    file.write_all(TEMPLATE.as_bytes())
        .map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Replace `path` with `contents` via a temp file in the same directory
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// WatchStore persisted to a TOML file
#[derive(Debug)]
pub struct FileWatchStore {
    path: PathBuf,
    document: DocumentMut,
    connection: ConnectionSettings,
    services: BTreeMap<String, ServiceWatch>,
    dirty: bool,
}

impl FileWatchStore {
    /// Open `dronetrigger.toml` inside `config_dir`, writing the template if it is missing
    #[instrument]
    pub fn open(config_dir: &Path) -> Result<Self, ConfigError> {
        if !config_dir.is_dir() {
            return Err(ConfigError::MissingDirectory(
                config_dir.display().to_string(),
            ));
        }

        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            warn!(path = %path.display(), "Config file does not exist, writing example config");
            write_template(&path)?;
            return Err(ConfigError::TemplateWritten {
                path: path.display().to_string(),
            });
        }

        Self::load(&path)
    }

    /// Load and validate an existing config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: origin.clone(),
            reason: e.to_string(),
        })?;

        let document = content
            .parse::<DocumentMut>()
            .map_err(|e| ConfigError::Unparsable {
                path: origin.clone(),
                reason: e.to_string(),
            })?;
        let (connection, services) = parse_config(&content, &origin)?;

        info!(
            path = %origin,
            services = services.len(),
            "Config loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            document,
            connection,
            services,
            dirty: false,
        })
    }

    pub fn connection(&self) -> &ConnectionSettings {
        &self.connection
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WatchStore for FileWatchStore {
    fn services(&self) -> Vec<ServiceWatch> {
        self.services.values().cloned().collect()
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    fn record_value(&mut self, service: &str, value: &WatchValue) -> Result<(), StoreError> {
        let watch = self
            .services
            .get_mut(service)
            .ok_or_else(|| StoreError::UnknownService(service.to_string()))?;

        watch.last_value = Some(value.clone());
        self.document[service]["current_value"] = toml_edit::value(value.as_str());
        self.dirty = true;

        self.flush()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }

        write_atomic(&self.path, &self.document.to_string()).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Config write failed, keeping change pending");
            StoreError::WriteFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        self.dirty = false;
        Ok(())
    }
}
