//! Two-tier configuration lists.
//!
//! Data-entry screens use configurable vocabularies (ward names, the
//! antibiotic panel, outcome statuses). Reads go through an explicit
//! provider with a defined refresh policy (in-memory map, then the on-disk
//! YAML cache, then the remote source) rather than ad hoc reads scattered
//! through the code. Every fallback hit backfills the faster tiers, and
//! writes go through to all tiers.

use crate::error::{RegistryError, RegistryResult};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

type SettingsMap = BTreeMap<String, Vec<String>>;

/// The remote, authoritative source of configuration lists.
pub trait SettingsRemote {
    fn fetch(&self, key: &str) -> RegistryResult<Option<Vec<String>>>;
    fn put(&self, key: &str, values: &[String]) -> RegistryResult<()>;
}

/// File-backed [`SettingsRemote`] holding all lists in one YAML document.
///
/// Stands in for the remote settings collection in single-machine
/// deployments; the provider's tiering logic is identical either way.
#[derive(Debug, Clone)]
pub struct FsSettingsRemote {
    path: PathBuf,
}

impl FsSettingsRemote {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> RegistryResult<SettingsMap> {
        if !self.path.is_file() {
            return Ok(SettingsMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(RegistryError::FileRead)?;
        serde_yaml::from_str(&contents).map_err(RegistryError::YamlDeserialization)
    }

    fn write_all(&self, map: &SettingsMap) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(RegistryError::StorageDirCreation)?;
        }
        let contents = serde_yaml::to_string(map).map_err(RegistryError::YamlSerialization)?;
        fs::write(&self.path, contents).map_err(RegistryError::FileWrite)
    }
}

impl SettingsRemote for FsSettingsRemote {
    fn fetch(&self, key: &str) -> RegistryResult<Option<Vec<String>>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn put(&self, key: &str, values: &[String]) -> RegistryResult<()> {
        let mut map = self.read_all()?;
        map.insert(key.to_string(), values.to_vec());
        self.write_all(&map)
    }
}

/// Cache-first provider over a [`SettingsRemote`].
pub struct SettingsProvider<R> {
    cache_path: PathBuf,
    remote: R,
    memory: RefCell<SettingsMap>,
}

impl<R: SettingsRemote> SettingsProvider<R> {
    pub fn new(cache_path: impl Into<PathBuf>, remote: R) -> Self {
        Self {
            cache_path: cache_path.into(),
            remote,
            memory: RefCell::new(SettingsMap::new()),
        }
    }

    /// Fetches one list: memory, then disk cache, then remote. Fallback hits
    /// backfill the faster tiers.
    pub fn get_list(&self, key: &str) -> RegistryResult<Option<Vec<String>>> {
        if let Some(values) = self.memory.borrow().get(key) {
            return Ok(Some(values.clone()));
        }

        let disk = self.read_disk_cache()?;
        if let Some(values) = disk.get(key) {
            self.memory
                .borrow_mut()
                .insert(key.to_string(), values.clone());
            return Ok(Some(values.clone()));
        }

        match self.remote.fetch(key)? {
            Some(values) => {
                self.backfill(key, &values)?;
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    /// Writes one list through to the remote and both cache tiers.
    pub fn set_list(&self, key: &str, values: &[String]) -> RegistryResult<()> {
        self.remote.put(key, values)?;
        self.backfill(key, values)
    }

    fn backfill(&self, key: &str, values: &[String]) -> RegistryResult<()> {
        let mut disk = self.read_disk_cache()?;
        disk.insert(key.to_string(), values.to_vec());
        self.write_disk_cache(&disk)?;
        self.memory
            .borrow_mut()
            .insert(key.to_string(), values.to_vec());
        Ok(())
    }

    fn read_disk_cache(&self) -> RegistryResult<SettingsMap> {
        read_yaml_map(&self.cache_path)
    }

    fn write_disk_cache(&self, map: &SettingsMap) -> RegistryResult<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).map_err(RegistryError::StorageDirCreation)?;
        }
        let contents = serde_yaml::to_string(map).map_err(RegistryError::YamlSerialization)?;
        fs::write(&self.cache_path, contents).map_err(RegistryError::FileWrite)
    }
}

fn read_yaml_map(path: &Path) -> RegistryResult<SettingsMap> {
    if !path.is_file() {
        return Ok(SettingsMap::new());
    }
    let contents = fs::read_to_string(path).map_err(RegistryError::FileRead)?;
    serde_yaml::from_str(&contents).map_err(RegistryError::YamlDeserialization)
}
