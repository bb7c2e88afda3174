//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use std::fs::read_to_string;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::supervisor::ServiceSpec;
use crate::util::system::bytes_per_page;

/// The declared service set, read from the service file at startup.
///
/// This declares capacities only. The keeper itself has no tunables: its
/// behavior is driven entirely by what each service declares here.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ChoredConfig {
    pub services: Vec<ServiceEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ServiceEntry {
    pub name: String,
    pub command: Vec<String>,
    /// Resident set the service is expected to sit at, KiB.
    pub expected_typical_kib: u64,
    /// Resident set the service may legitimately reach, KiB.
    pub expected_peak_kib: u64,
    /// Relative worth; higher survives longer under memory pressure.
    pub value: i64,
}

impl ChoredConfig {
    pub const DEFAULT_CONFIG_PATH: &'static str = "/etc/chored.json";

    /// Load the service declarations.
    ///
    /// A missing file is an empty service set, not an error: the keeper
    /// still runs and simply has nothing registered to watch over.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = read_to_string(path)
            .wrap_err_with(|| eyre!("Unable to read service file {}", path.display()))?;
        serde_json::from_str(&contents)
            .wrap_err_with(|| eyre!("Unable to parse service file {}", path.display()))
    }

    /// Convert the declarations into launchable specs, KiB to pages.
    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        let kib_per_page = bytes_per_page() / 1024;
        self.services
            .iter()
            .map(|entry| ServiceSpec {
                name: entry.name.clone(),
                command: entry.command.clone(),
                expected_typical_memory: entry.expected_typical_kib / kib_per_page,
                expected_peak_memory: entry.expected_peak_kib / kib_per_page,
                value: entry.value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    use super::*;

    #[rstest]
    fn test_load_and_convert() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                 "services": [
                   {{
                     "name": "indexer",
                     "command": ["indexer", "--shard", "7"],
                     "expected_typical_kib": 409600,
                     "expected_peak_kib": 819200,
                     "value": 10
                   }}
                 ]
               }}"#
        )
        .unwrap();

        let config = ChoredConfig::load(file.path()).unwrap();
        let specs = config.service_specs();
        assert_eq!(specs.len(), 1);

        let kib_per_page = bytes_per_page() / 1024;
        assert_eq!(specs[0].name, "indexer");
        assert_eq!(specs[0].command, vec!["indexer", "--shard", "7"]);
        assert_eq!(specs[0].expected_typical_memory, 409600 / kib_per_page);
        assert_eq!(specs[0].expected_peak_memory, 819200 / kib_per_page);
        assert_eq!(specs[0].value, 10);
    }

    #[rstest]
    fn test_missing_file_is_an_empty_service_set() {
        let config = ChoredConfig::load(Path::new("/nonexistent/chored.json")).unwrap();
        assert!(config.services.is_empty());
    }

    #[rstest]
    fn test_malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "services: not json").unwrap();
        assert!(ChoredConfig::load(file.path()).is_err());
    }
}
