use std::path::{Path, PathBuf};

/// On-disk layout under the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub data_dir: PathBuf,
    pub geo_dir: PathBuf,
    pub duckdb_path: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        let geo_dir = data_dir.join("geo");
        let duckdb_path = data_dir.join("navigator.duckdb");

        Self {
            data_dir,
            geo_dir,
            duckdb_path,
        }
    }

    pub fn geonames_us_txt(&self) -> PathBuf {
        self.geo_dir.join("US.txt")
    }

    pub fn geonames_us_zip(&self) -> PathBuf {
        self.geo_dir.join("US.zip")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.geo_dir)?;
        Ok(())
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_the_data_dir() {
        let paths = StoragePaths::new("/srv/navigator");
        assert_eq!(paths.duckdb_path, Path::new("/srv/navigator/navigator.duckdb"));
        assert_eq!(paths.geonames_us_txt(), Path::new("/srv/navigator/geo/US.txt"));
        assert_eq!(paths.geonames_us_zip(), Path::new("/srv/navigator/geo/US.zip"));
    }

    #[test]
    fn empty_files_do_not_count_as_present() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("US.txt");
        assert!(!file_present_nonempty(&p));
        std::fs::write(&p, "").unwrap();
        assert!(!file_present_nonempty(&p));
        std::fs::write(&p, "US\t10001").unwrap();
        assert!(file_present_nonempty(&p));
    }
}
