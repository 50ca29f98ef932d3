//! Reading catalog files: locating the catalog in a directory, picking the
//! format from the extension, deserialization, and the error type for the
//! whole loading pipeline.

use crate::catalog::Catalog;
use crate::schema::CatalogData;
use flownet_core::port::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File stem looked up by [`load_catalog_dir`].
pub const CATALOG_BASE_NAME: &str = "flow_catalog";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The directory holds no catalog file in any supported format.
    #[error("no flow_catalog.ron, .toml or .json in {dir}")]
    MissingCatalog { dir: PathBuf },

    /// The extension names none of the catalog formats.
    #[error("{file} is not a .ron, .toml or .json catalog")]
    UnsupportedFormat { file: PathBuf },

    /// The directory holds the catalog in more than one format.
    #[error("ambiguous catalog: both {a} and {b} exist")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred, including unrecognized directions,
    /// port kinds and tags.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A number is not finite or does not fit the fixed-point range.
    #[error("prototype '{prototype}': {field} = {value} is out of range")]
    InvalidNumber {
        prototype: String,
        field: &'static str,
        value: f64,
    },

    /// A prototype resolved to components the engine cannot run.
    #[error("prototype '{prototype}' is invalid")]
    InvalidConfig {
        prototype: String,
        #[source]
        source: ConfigError,
    },

    /// No prototype with this name exists in the catalog.
    #[error("unknown prototype '{name}'")]
    UnknownPrototype { name: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats
// ===========================================================================

/// Catalog encodings, one per file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    /// Lookup order inside a catalog directory.
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }

    /// The format named by the extension of `path`.
    pub fn from_path(path: &Path) -> Result<Self, DataLoadError> {
        let ext = path.extension().and_then(|e| e.to_str());
        Self::ALL
            .into_iter()
            .find(|format| Some(format.extension()) == ext)
            .ok_or_else(|| DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            })
    }

    /// Deserialize a catalog document. `origin` only labels errors.
    fn parse(self, content: &str, origin: &Path) -> Result<CatalogData, DataLoadError> {
        let detail = match self {
            Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        detail.map_err(|detail| DataLoadError::Parse {
            file: origin.to_path_buf(),
            detail,
        })
    }
}

/// The one `flow_catalog.*` file in `dir`.
pub fn catalog_path(dir: &Path) -> Result<PathBuf, DataLoadError> {
    let mut present = Format::ALL
        .into_iter()
        .map(|format| dir.join(format!("{CATALOG_BASE_NAME}.{}", format.extension())))
        .filter(|path| path.is_file());
    match (present.next(), present.next()) {
        (Some(path), None) => Ok(path),
        (Some(a), Some(b)) => Err(DataLoadError::ConflictingFormats { a, b }),
        (None, _) => Err(DataLoadError::MissingCatalog {
            dir: dir.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Catalog loading
// ===========================================================================

/// Load and resolve a catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog, DataLoadError> {
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    let catalog = Catalog::from_data(format.parse(&content, path)?, path)?;
    debug!(
        file = %path.display(),
        resources = catalog.resource_count(),
        prototypes = catalog.prototype_count(),
        "flow catalog loaded"
    );
    Ok(catalog)
}

/// Load the catalog file found by [`catalog_path`].
pub fn load_catalog_dir(dir: &Path) -> Result<Catalog, DataLoadError> {
    load_catalog(&catalog_path(dir)?)
}

/// Resolve a catalog held in memory.
pub fn parse_catalog(content: &str, format: Format) -> Result<Catalog, DataLoadError> {
    let origin = Path::new("<memory>");
    Catalog::from_data(format.parse(content, origin)?, origin)
}
