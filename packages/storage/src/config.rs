use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default storage root for local development.
pub const DEFAULT_ROOT: &str = "./data/spool";

/// Dialect of the CSV result artifact, shared by the workers writing it
/// and the front end serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl CsvFormat {
    /// Read `CSV_DELIMITER` and `CSV_QUOTECHAR`, each a single ASCII
    /// character. Unset or empty values keep the defaults (`,` and `"`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            delimiter: csv_char_env("CSV_DELIMITER")?.unwrap_or(defaults.delimiter),
            quote: csv_char_env("CSV_QUOTECHAR")?.unwrap_or(defaults.quote),
        })
    }
}

fn csv_char_env(var_name: &str) -> Result<Option<u8>, ConfigError> {
    match std::env::var(var_name) {
        Ok(v) => parse_csv_char(var_name, &v),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidConfig(format!(
            "failed reading {var_name}: {e}"
        ))),
    }
}

// Not trimmed: a tab is a valid delimiter.
fn parse_csv_char(var_name: &str, v: &str) -> Result<Option<u8>, ConfigError> {
    match v.as_bytes() {
        [] => Ok(None),
        [b] if b.is_ascii() && *b != b'\n' && *b != b'\r' => Ok(Some(*b)),
        _ => Err(ConfigError::InvalidConfig(format!(
            "{var_name} must be a single ASCII character other than a line break, got {v:?}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per owner key plus `queue/`.
    pub root: PathBuf,
    /// Dialect of the `result` artifact.
    pub csv: CsvFormat,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            csv: CsvFormat::default(),
        }
    }

    pub fn with_csv(mut self, csv: CsvFormat) -> Self {
        self.csv = csv;
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_ROOT` (default: `./data/spool`)
    /// - `CSV_DELIMITER`, `CSV_QUOTECHAR` (see [`CsvFormat::from_env`])
    ///
    /// The root must live on a single local filesystem: queue claims rely
    /// on `rename` being atomic with respect to concurrent renamers, which
    /// network filesystems do not all guarantee.
    pub fn from_env() -> Result<Self, ConfigError> {
        let root = match std::env::var("STORAGE_ROOT") {
            Ok(v) => non_empty(v),
            Err(std::env::VarError::NotPresent) => None,
            Err(e) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "failed reading STORAGE_ROOT: {e}"
                )));
            }
        };

        Ok(Self::new(
            root.map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT)),
        )
        .with_csv(CsvFormat::from_env()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
