use std::path::PathBuf;

const PROJECT_DIR: &str = ".courier";
const CONFIG_FILE: &str = "config.toml";

/// Where Courier looks for its config: `./.courier/` in the working
/// directory, then the platform config dir for "courier".
pub struct AppPaths;

impl AppPaths {
    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    pub fn project_config() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    pub fn user_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
    }

    pub fn user_config() -> Option<PathBuf> {
        Self::user_config_dir().map(|d| d.join(CONFIG_FILE))
    }

    /// Candidate config files, highest priority first. Paths may not exist.
    pub fn discover_configs() -> Vec<PathBuf> {
        std::iter::once(Self::project_config())
            .chain(Self::user_config())
            .collect()
    }
}
