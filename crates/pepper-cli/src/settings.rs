//! Config resolution for the binary.

use std::path::{Path, PathBuf};

use anyhow::Result;
use pepper_config::{find_config_file, load_config_from_file, MonitorOptions};

/// Options loaded for this process, plus the file they came from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub options: MonitorOptions,
    pub path: Option<PathBuf>,
}

/// An explicit path must load. Without one, the first discovered file is
/// used, and built-in defaults apply when none exists.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            let resolved = load_config_from_file(&path)?;
            Ok(Settings {
                options: resolved.options,
                path: Some(resolved.path),
            })
        }
        None => Ok(Settings {
            options: MonitorOptions::default(),
            path: None,
        }),
    }
}
