//! Spill configuration for the external sort.
//!
//! # Example
//!
//! ```rust
//! use dbx_xsort::spill::config::{SpillCompression, SpillConfig};
//!
//! // Default: private temp directory, uncompressed
//! let config = SpillConfig::default();
//! assert_eq!(config.compression, SpillCompression::None);
//!
//! // Two spill disks, ZSTD-compressed spill files
//! let config = SpillConfig::new("sort-7")
//!     .with_directories(vec!["/mnt/d1".into(), "/mnt/d2".into()])
//!     .with_compression(SpillCompression::Zstd);
//! assert_eq!(config.directories.len(), 2);
//! ```

use crate::error::{DbxError, DbxResult};
use arrow::ipc::CompressionType;
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Default buffered stream size for spill files (64 KiB).
pub const DEFAULT_SPILL_BUFFER_SIZE: usize = 64 * 1024;

/// Body compression applied to spilled Arrow IPC batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpillCompression {
    /// No compression — cheapest CPU, largest files.
    #[default]
    None,
    /// LZ4 frame — fast, moderate ratio.
    Lz4,
    /// Zstandard — better ratio, more CPU.
    Zstd,
}

impl SpillCompression {
    pub fn to_ipc_compression(self) -> Option<CompressionType> {
        match self {
            Self::None => None,
            Self::Lz4 => Some(CompressionType::LZ4_FRAME),
            Self::Zstd => Some(CompressionType::ZSTD),
        }
    }

    /// 문자열에서 압축 방식 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Some(Self::None),
            "lz4" | "lz4_frame" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpillCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Lz4 => write!(f, "LZ4"),
            Self::Zstd => write!(f, "ZSTD"),
        }
    }
}

/// Where and how an operator writes its spill files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Spill directories, used round-robin. Empty means a private temp directory.
    pub directories: Vec<PathBuf>,
    /// Sub-directory created under each spill directory for this operator.
    pub operator_id: String,
    /// Buffer size of the file streams.
    pub buffer_size: usize,
    pub compression: SpillCompression,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            operator_id: "xsort".to_string(),
            buffer_size: DEFAULT_SPILL_BUFFER_SIZE,
            compression: SpillCompression::None,
        }
    }
}

impl SpillConfig {
    pub fn new(operator_id: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            ..Self::default()
        }
    }

    pub fn with_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.directories = directories;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_compression(mut self, compression: SpillCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Overrides defaults from `DBX_SPILL_*` environment variables.
    ///
    /// # Environment Variables
    /// - `DBX_SPILL_DIRS` - spill directories, separated like `PATH`
    /// - `DBX_SPILL_OPERATOR_ID` - operator sub-directory name
    /// - `DBX_SPILL_BUFFER_SIZE` - stream buffer size in bytes
    /// - `DBX_SPILL_COMPRESSION` - `none`, `lz4` or `zstd`
    pub fn from_env() -> DbxResult<Self> {
        Self::from_vars(|key| env::var_os(key))
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_vars<F>(lookup: F) -> DbxResult<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default();
        let text = |key: &str| -> DbxResult<Option<String>> {
            lookup(key)
                .map(|v| {
                    v.into_string().map_err(|_| {
                        DbxError::InvalidArguments(format!("{key}: value is not valid UTF-8"))
                    })
                })
                .transpose()
        };

        if let Some(dirs) = lookup("DBX_SPILL_DIRS") {
            config.directories = env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(id) = text("DBX_SPILL_OPERATOR_ID")? {
            config.operator_id = id;
        }
        if let Some(size) = text("DBX_SPILL_BUFFER_SIZE")? {
            config.buffer_size = size.trim().parse().map_err(|_| {
                DbxError::InvalidArguments(format!("DBX_SPILL_BUFFER_SIZE: '{size}' is not a size"))
            })?;
        }
        if let Some(name) = text("DBX_SPILL_COMPRESSION")? {
            config.compression = SpillCompression::parse(&name).ok_or_else(|| {
                DbxError::InvalidArguments(format!("DBX_SPILL_COMPRESSION: unknown codec '{name}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> DbxResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DbxResult<()> {
        if self.buffer_size == 0 {
            return Err(DbxError::InvalidArguments(
                "spill buffer size must be positive".to_string(),
            ));
        }
        if self.operator_id.is_empty()
            || self.operator_id.contains(['/', '\\'])
            || self.operator_id == ".."
        {
            return Err(DbxError::InvalidArguments(format!(
                "invalid spill operator id '{}'",
                self.operator_id
            )));
        }
        Ok(())
    }
}
