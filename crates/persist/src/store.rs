//! File-backed dumps of geometry state.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json            - schema version and dump count
//! dumps/
//!   000001.group.cbor.zst    - CBOR+zstd compressed group trees
//! integrity/
//!   manifest.json            - hash chain manifest
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use cellspace_kernel::{Geometry, Group};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const SCHEMA_VERSION: u32 = 1;
const META_FILE: &str = "store.meta.json";
const MANIFEST_FILE: &str = "manifest.json";
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode group: {0}")]
    Encode(String),
    #[error("failed to decode group: {0}")]
    Decode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
    #[error("schema version mismatch: store has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("dump {0} does not exist")]
    NoSuchDump(u32),
    #[error("no dumps written yet")]
    NoDumps,
}

/// Contents of `store.meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpMeta {
    pub schema_version: u32,
    pub dump_count: u32,
}

/// One dump file and the hash of the dump written before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Hash chain over every dump. Entry `n - 1` describes dump `n`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

impl IntegrityManifest {
    fn entry(&self, number: u32) -> Option<&ManifestEntry> {
        let i = usize::try_from(number).ok()?.checked_sub(1)?;
        self.entries.get(i)
    }

    fn head(&self) -> Option<&str> {
        self.entries.last().map(|e| e.sha256.as_str())
    }
}

/// Append-only store of numbered geometry dumps.
pub struct GeometryStore {
    root: PathBuf,
    meta: DumpMeta,
    manifest: IntegrityManifest,
}

impl GeometryStore {
    /// Open the store at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("dumps"))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let mut store = Self {
            root,
            meta: DumpMeta {
                schema_version: SCHEMA_VERSION,
                dump_count: 0,
            },
            manifest: IntegrityManifest::default(),
        };
        if store.meta_path().exists() {
            let meta: DumpMeta = read_json(&store.meta_path())?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: SCHEMA_VERSION,
                });
            }
            store.meta = meta;
            if store.manifest_path().exists() {
                store.manifest = read_json(&store.manifest_path())?;
            }
        } else {
            store.persist_index()?;
        }

        tracing::debug!(
            root = %store.root.display(),
            dumps = store.meta.dump_count,
            "geometry store opened"
        );
        Ok(store)
    }

    /// Write the geometry's group tree as the next dump. Returns its number.
    pub fn dump(&mut self, geometry: &Geometry) -> Result<u32, StoreError> {
        let mut group = Group::new();
        geometry.to_group(&mut group);
        self.dump_group(&group)
    }

    /// Write an arbitrary group tree as the next dump.
    pub fn dump_group(&mut self, group: &Group) -> Result<u32, StoreError> {
        let number = self.meta.dump_count + 1;
        let filename = dump_filename(number);
        let bytes = encode_group(group)?;
        std::fs::write(self.dump_path(&filename), &bytes)?;

        let entry = ManifestEntry {
            sha256: sha256_hex(&bytes),
            prev_hash: self.manifest.head().map(str::to_owned),
            filename,
        };
        self.manifest.entries.push(entry);
        self.meta.dump_count = number;
        self.persist_index()?;

        tracing::info!(
            dump = number,
            bytes = bytes.len(),
            datasets = group.dataset_count(),
            "geometry dump written"
        );
        Ok(number)
    }

    /// Read dump `number`, checking its hash against the manifest.
    pub fn load(&self, number: u32) -> Result<Group, StoreError> {
        if number == 0 || number > self.meta.dump_count {
            return Err(StoreError::NoSuchDump(number));
        }
        let filename = dump_filename(number);
        let bytes = std::fs::read(self.dump_path(&filename))?;
        let expected = self
            .manifest
            .entry(number)
            .map(|e| e.sha256.clone())
            .unwrap_or_default();
        check_hash(&filename, &expected, &bytes)?;
        decode_group(&bytes)
    }

    pub fn load_latest(&self) -> Result<Group, StoreError> {
        match self.meta.dump_count {
            0 => Err(StoreError::NoDumps),
            n => self.load(n),
        }
    }

    /// Walk the hash chain from the first dump, re-hashing every file.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let mut prev: Option<&str> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash.as_deref() != prev {
                return Err(StoreError::IntegrityMismatch {
                    filename: entry.filename.clone(),
                    expected: prev.unwrap_or("none").to_owned(),
                    actual: entry.prev_hash.as_deref().unwrap_or("none").to_owned(),
                });
            }
            let bytes = std::fs::read(self.dump_path(&entry.filename))?;
            check_hash(&entry.filename, &entry.sha256, &bytes)?;
            prev = Some(entry.sha256.as_str());
        }
        tracing::debug!(dumps = self.manifest.entries.len(), "store integrity verified");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &DumpMeta {
        &self.meta
    }

    pub fn manifest(&self) -> &IntegrityManifest {
        &self.manifest
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("integrity").join(MANIFEST_FILE)
    }

    fn dump_path(&self, filename: &str) -> PathBuf {
        self.root.join("dumps").join(filename)
    }

    /// Rewrite the meta file and the manifest.
    fn persist_index(&self) -> Result<(), StoreError> {
        write_json(&self.meta_path(), &self.meta)?;
        write_json(&self.manifest_path(), &self.manifest)
    }
}

fn dump_filename(number: u32) -> String {
    format!("{number:06}.group.cbor.zst")
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    Ok(serde_json::from_reader(File::open(path)?)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    serde_json::to_writer_pretty(File::create(path)?, value)?;
    Ok(())
}

/// CBOR-encode a group tree straight into a zstd stream.
fn encode_group(group: &Group) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
    ciborium::into_writer(group, &mut encoder).map_err(|e| StoreError::Encode(e.to_string()))?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

fn decode_group(bytes: &[u8]) -> Result<Group, StoreError> {
    let mut cbor = Vec::new();
    zstd::Decoder::new(bytes)?.read_to_end(&mut cbor)?;
    ciborium::from_reader(cbor.as_slice()).map_err(|e| StoreError::Decode(e.to_string()))
}

fn check_hash(filename: &str, expected: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(StoreError::IntegrityMismatch {
            filename: filename.to_owned(),
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(())
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellspace_kernel::{CellSpec, Dataset, GeometryBuilder};
    use cellspace_surface::Surface;

    fn geometry() -> Geometry {
        let mut b = GeometryBuilder::new();
        b.surface(1, Surface::Sphere { x0: 0.0, y0: 0.0, z0: 0.0, r: 1.0 })
            .unwrap();
        b.cell(CellSpec::new(1, "-1").name("core").material(2).temperatures([600.0]))
            .cell(CellSpec::new(2, "1").void());
        b.build().unwrap()
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = GeometryStore::open(tmp.path().join("geometry_data")).unwrap();
        assert_eq!(store.meta().dump_count, 0);
        assert_eq!(store.meta().schema_version, SCHEMA_VERSION);
        assert!(store.root().join("dumps").is_dir());
        assert!(store.root().join("integrity").is_dir());
        assert!(matches!(store.load_latest(), Err(StoreError::NoDumps)));
    }

    #[test]
    fn dump_and_reload_geometry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("geometry_data");
        let geometry = geometry();

        let mut store = GeometryStore::open(&path).unwrap();
        assert_eq!(store.dump(&geometry).unwrap(), 1);

        let mut expected = Group::new();
        geometry.to_group(&mut expected);

        let reopened = GeometryStore::open(&path).unwrap();
        assert_eq!(reopened.meta().dump_count, 1);
        let loaded = reopened.load_latest().unwrap();
        assert_eq!(loaded, expected);
        let core = loaded.path("geometry/cells/cell 1").unwrap();
        assert_eq!(core.dataset("name").and_then(Dataset::as_str), Some("core"));
        assert_eq!(
            loaded
                .path("geometry")
                .and_then(|g| g.dataset("n_cells"))
                .and_then(Dataset::as_int),
            Some(2)
        );
    }

    #[test]
    fn dumps_are_numbered_and_chained() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = GeometryStore::open(tmp.path().join("geometry_data")).unwrap();
        let mut first = Group::new();
        first.write("step", 1);
        let mut second = Group::new();
        second.write("step", 2);
        assert_eq!(store.dump_group(&first).unwrap(), 1);
        assert_eq!(store.dump_group(&second).unwrap(), 2);

        let entries = &store.manifest().entries;
        assert_eq!(entries[0].filename, "000001.group.cbor.zst");
        assert_eq!(entries[1].prev_hash.as_deref(), Some(entries[0].sha256.as_str()));
        store.verify_integrity().unwrap();

        assert_eq!(store.load(1).unwrap(), first);
        assert_eq!(store.load_latest().unwrap(), second);
        assert!(matches!(store.load(3), Err(StoreError::NoSuchDump(3))));
        assert!(matches!(store.load(0), Err(StoreError::NoSuchDump(0))));
    }

    #[test]
    fn corruption_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("geometry_data");
        let mut store = GeometryStore::open(&path).unwrap();
        store.dump(&geometry()).unwrap();

        let dump_path = path.join("dumps").join("000001.group.cbor.zst");
        let mut data = std::fs::read(&dump_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&dump_path, &data).unwrap();

        let reopened = GeometryStore::open(&path).unwrap();
        assert!(reopened.verify_integrity().is_err());
        assert!(matches!(
            reopened.load(1),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("geometry_data");
        let _store = GeometryStore::open(&path).unwrap();

        let meta_path = path.join(META_FILE);
        let mut meta: DumpMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match GeometryStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
