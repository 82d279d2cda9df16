//! Resolves where an engine's log and store files live.

use std::path::PathBuf;

/// Paths the CLI and engine constructors open. Owns no behavior beyond
/// resolving them from a data directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the log and store files.
    pub data_dir: PathBuf,
    /// File name of the log within `data_dir`.
    pub log_file_name: String,
    /// File name of the store within `data_dir`.
    pub store_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            log_file_name: "log".to_string(),
            store_file_name: "store".to_string(),
        }
    }
}

impl Config {
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file_name)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolves_paths_under_current_directory() {
        let config = Config::default();
        assert_eq!(config.log_path(), PathBuf::from("./log"));
        assert_eq!(config.store_path(), PathBuf::from("./store"));
    }

    #[test]
    fn custom_data_dir_and_names_resolve() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/mydata"),
            log_file_name: "custom.log".to_string(),
            store_file_name: "custom.store".to_string(),
        };
        assert_eq!(config.log_path(), PathBuf::from("/tmp/mydata/custom.log"));
        assert_eq!(config.store_path(), PathBuf::from("/tmp/mydata/custom.store"));
    }
}
