//! Geometry definitions: the serialized form of surfaces, cells, lattices and
//! settings, and their conversion into a finalized [`Geometry`].
//!
//! Definitions are YAML (`.yaml`, `.yml`) or JSON (`.json`), chosen by file
//! extension. Every error that concerns a cell carries its id.

mod definition;

use std::path::{Path, PathBuf};

use cellspace_common::CellId;
use cellspace_kernel::GeometryError;

pub use definition::{CellDef, GeometryDefinition, LatticeDef, MaterialField};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported definition format {0:?} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("cell {cell}: invalid material token '{token}'")]
    InvalidMaterial { cell: CellId, token: String },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Serialization format of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Read and parse a definition file.
pub fn load(path: impl AsRef<Path>) -> Result<GeometryDefinition, LoadError> {
    let path = path.as_ref();
    let _span = tracing::info_span!("load_definition", path = %path.display()).entered();
    let format = Format::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let definition = GeometryDefinition::parse(&text, format)?;
    tracing::info!(
        surfaces = definition.surfaces.len(),
        cells = definition.cells.len(),
        lattices = definition.lattices.len(),
        "definition loaded"
    );
    Ok(definition)
}

pub fn crate_info() -> &'static str {
    "cellspace-loader v0.1.0"
}
