use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::Context;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::data::Catalogue;

/// Where the catalogue lives.
///
/// Both operations fail soft: a store never hands an error back to the bot. A
/// broken or missing catalogue reads as empty and a failed write is only
/// logged. There is no locking, two users saving at the same time means the
/// last save wins.
pub trait CatalogueStore: Send + Sync {
    fn load(&self) -> Catalogue;
    fn save(&self, catalogue: &Catalogue);
}

/// A single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> anyhow::Result<Catalogue> {
        if !self.path.exists() {
            return Ok(Catalogue::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("fail to read {}", self.path.display()))?;
        let catalogue = serde_json::from_str(&raw)
            .with_context(|| format!("fail to decode {}", self.path.display()))?;
        Ok(catalogue)
    }

    fn try_save(&self, catalogue: &Catalogue) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
        catalogue
            .serialize(&mut ser)
            .context("fail to encode catalogue")?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("fail to create temp file in {}", dir.display()))?;
        tmp.write_all(&buf)?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("fail to write {}", self.path.display()))?;
        Ok(())
    }
}

impl CatalogueStore for JsonFileStore {
    fn load(&self) -> Catalogue {
        match self.try_load() {
            Ok(catalogue) => catalogue,
            Err(e) => {
                tracing::error!("{e:#}, treating catalogue as empty");
                Catalogue::new()
            }
        }
    }

    fn save(&self, catalogue: &Catalogue) {
        if let Err(e) = self.try_save(catalogue) {
            tracing::error!("fail to save restaurant data: {e:#}")
        }
    }
}

/// Keeps the catalogue in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalogue: Mutex<Catalogue>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            catalogue: Mutex::new(catalogue),
            saves: AtomicUsize::new(0),
        }
    }

    /// How many times `save` has been called.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CatalogueStore for MemoryStore {
    fn load(&self) -> Catalogue {
        match self.catalogue.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, catalogue: &Catalogue) {
        let mut guard = match self.catalogue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = catalogue.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}
