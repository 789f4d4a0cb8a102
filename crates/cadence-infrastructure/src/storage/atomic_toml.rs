//! Atomic TOML file operations.
//!
//! Readers never see a half-written file: every save goes to a sibling tmp
//! file, is fsynced, then renamed over the target.

use cadence_core::error::{CadenceError, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A handle to a TOML file written with tmp file + fsync + rename.
///
/// `save_locked` additionally holds an exclusive `fs2` lock on a sibling
/// `.lock` file so two processes pointed at the same session cannot
/// interleave their renames.
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let data: T = toml::from_str(&content)?;
        Ok(Some(data))
    }

    /// Saves data atomically without taking the lock.
    pub fn save(&self, data: &T) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;

        // Ensure data is written to disk
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            CadenceError::io(format!(
                "Failed to rename '{}' to '{}': {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Saves data atomically while holding the exclusive lock.
    pub fn save_locked(&self, data: &T) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        self.save(data)
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| CadenceError::io("Path has no parent directory"))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| CadenceError::io("Path has no file name"))?;

        Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
    }
}

/// Exclusive lock guard; the lock file is removed on drop.
struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive().map_err(|e| {
                CadenceError::io(format!(
                    "Failed to lock '{}': {}",
                    lock_path.display(),
                    e
                ))
            })?;
        }

        Ok(FileLock { file, lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock happens when the handle closes; removing the file is best effort.
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_locked_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("nested").join("sample.toml");
        let file = AtomicTomlFile::<Sample>::new(file_path.clone());

        let sample = Sample {
            name: "checkpoint".to_string(),
            count: 3,
        };

        // Save
        file.save_locked(&sample).unwrap();

        // Verify
        assert_eq!(file.load().unwrap(), Some(sample));
        assert!(!temp_dir.path().join("nested").join(".sample.toml.tmp").exists());
        assert!(!file_path.with_extension("lock").exists());
    }

    #[test]
    fn test_load_missing_and_empty_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("sample.toml");
        let file = AtomicTomlFile::<Sample>::new(file_path.clone());

        assert!(file.load().unwrap().is_none());

        fs::write(&file_path, "   \n").unwrap();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_load_garbage_is_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("sample.toml");
        fs::write(&file_path, "name = [unterminated").unwrap();

        let err = AtomicTomlFile::<Sample>::new(file_path).load().unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_save_replaces_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Sample>::new(temp_dir.path().join("sample.toml"));

        file.save(&Sample { name: "a".into(), count: 1 }).unwrap();
        file.save(&Sample { name: "b".into(), count: 2 }).unwrap();

        let loaded = file.load().unwrap().expect("Should load saved sample");
        assert_eq!(loaded.name, "b");
        assert_eq!(loaded.count, 2);
    }
}
