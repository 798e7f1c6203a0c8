use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::registry::Dataset;

/// The locally persisted registry file.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the previous run's output. A missing file is a first run and
    /// yields an empty dataset.
    pub fn load_previous(&self) -> AppResult<Dataset> {
        match File::open(&self.path) {
            Ok(file) => {
                let dataset = Dataset::from_reader(BufReader::new(file))?;
                debug!(
                    path = %self.path.display(),
                    rows = dataset.len(),
                    "loaded persisted registry"
                );
                Ok(dataset)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no persisted registry yet; starting empty");
                Ok(Dataset::default())
            }
            Err(err) => Err(AppError::Io(err)),
        }
    }

    /// Replaces the registry file wholesale. The CSV is written beside the
    /// target first and renamed over it, so readers never see a partial file.
    pub fn persist(&self, dataset: &Dataset) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = self.staging_path();
        let result = write_staged(&staging, dataset).and_then(|()| {
            fs::rename(&staging, &self.path)?;
            Ok(())
        });
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result?;

        info!(path = %self.path.display(), rows = dataset.len(), "persisted registry");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry.csv".into());
        name.push(".partial");
        self.path.with_file_name(name)
    }
}

fn write_staged(path: &Path, dataset: &Dataset) -> AppResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    dataset.write_to(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::registry::Record;

    fn sample() -> Dataset {
        Dataset::with_standard_columns(vec![Record {
            timestamp: "2024/02/01 09:00:00".into(),
            city: Some("Madison".into()),
            region: Some("WI".into()),
            country: Some("USA".into()),
            latitude: Some(43.07),
            longitude: Some(-89.38),
            ..Record::default()
        }])
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.csv"));
        assert!(store.load_previous().unwrap().is_empty());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("nested").join("registry.csv"));
        store.persist(&sample()).unwrap();

        let loaded = store.load_previous().unwrap();
        assert_eq!(loaded, sample());
        assert!(!dir.path().join("nested").join("registry.csv.partial").exists());
    }

    #[test]
    fn overwrites_instead_of_appending() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.csv"));
        store.persist(&sample()).unwrap();
        store.persist(&sample()).unwrap();
        assert_eq!(store.load_previous().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.csv");
        fs::write(&path, "not,a,registry\n1,2,3\n").unwrap();
        let store = RegistryStore::new(path);
        assert!(matches!(store.load_previous(), Err(AppError::Parse(_))));
    }
}
