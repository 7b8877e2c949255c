//! Registry persistence layer
//!
//! Saves the full registry snapshot (tables, history and consensus chain)
//! after processed blocks so a replica resumes at `last_block + 1` instead of
//! replaying from genesis.

use crate::core::state::RegistryState;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub state_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".registry_data"),
            state_file: "registry.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

impl StorageConfig {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

/// Registry snapshot storage
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    fn state_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.state_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.state_file, index))
    }

    /// Write the snapshot atomically, rotating the previous one into backups
    pub fn save(&self, state: &RegistryState) -> Result<(), StorageError> {
        let path = self.state_path();

        if self.config.backup_enabled && self.config.max_backups > 0 && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        let temp_path = self
            .config
            .data_dir
            .join(format!("{}.tmp", self.config.state_file));
        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, state)?;

        fs::rename(&temp_path, &path)?;

        log::debug!(
            "Saved registry snapshot at block {:?} to {:?}",
            state.last_block,
            path
        );
        Ok(())
    }

    pub fn load(&self) -> Result<RegistryState, StorageError> {
        let path = self.state_path();
        if !path.exists() {
            return Err(StorageError::InvalidData(
                "Registry snapshot not found".to_string(),
            ));
        }
        load_from_file(&path)
    }

    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        let path = self.state_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn rotate_backups(&self) -> Result<(), StorageError> {
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Load an older snapshot (0 is the most recent backup)
    pub fn restore_backup(&self, backup_index: usize) -> Result<RegistryState, StorageError> {
        let path = self.backup_path(backup_index);
        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }
        load_from_file(&path)
    }

    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.state_path();
        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
}

/// Save a snapshot to a specific file path
pub fn save_to_file(state: &RegistryState, path: &Path) -> Result<(), StorageError> {
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, state)?;
    Ok(())
}

/// Load a snapshot from a specific file path and check it is self-consistent
pub fn load_from_file(path: &Path) -> Result<RegistryState, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let state: RegistryState = serde_json::from_reader(reader)?;

    if state.consensus.last_height() != state.last_block {
        return Err(StorageError::InvalidData(format!(
            "Snapshot ends at block {:?} but its consensus chain ends at {:?}",
            state.last_block,
            state.consensus.last_height()
        )));
    }

    Ok(state)
}
