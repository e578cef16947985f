//! Persisted geometry state: group trees written as numbered dumps.
//!
//! # Invariants
//! - Dumps are append-only and numbered from 1.
//! - Every dump is listed in a SHA-256 hash chain and verified on load.
//! - A store written with another schema version is never opened.

mod store;

pub use store::{DumpMeta, GeometryStore, IntegrityManifest, ManifestEntry, StoreError};

pub fn crate_info() -> &'static str {
    "cellspace-persist v0.1.0"
}
