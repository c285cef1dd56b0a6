//! XDG-based filesystem layout for qpg's cache, state, and model directories.

use std::env;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "qpg";
pub const INDEX_FILENAME: &str = "index.sqlite";
pub const MCP_PID_FILENAME: &str = "mcp-http.pid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub index_db: PathBuf,
    pub models_dir: PathBuf,
    pub mcp_pid_file: PathBuf,
}

fn xdg_or_default(env_name: &str, default_relative: &str) -> PathBuf {
    match env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => {
            let home = env::var("HOME").unwrap_or_else(|_| "/root".to_string());
            Path::new(&home).join(default_relative)
        }
    }
}

pub fn get_paths() -> Paths {
    let cache_dir = xdg_or_default("XDG_CACHE_HOME", ".cache").join(APP_NAME);
    let state_dir = xdg_or_default("XDG_STATE_HOME", ".local/state").join(APP_NAME);
    let index_db = cache_dir.join(INDEX_FILENAME);
    let models_dir = cache_dir.join("models");
    let mcp_pid_file = state_dir.join(MCP_PID_FILENAME);

    Paths {
        cache_dir,
        state_dir,
        index_db,
        models_dir,
        mcp_pid_file,
    }
}

pub fn ensure_dirs(paths: &Paths) -> std::io::Result<()> {
    std::fs::create_dir_all(&paths.cache_dir)?;
    std::fs::create_dir_all(&paths.state_dir)?;
    std::fs::create_dir_all(&paths.models_dir)?;
    Ok(())
}

pub fn config_yaml_path() -> PathBuf {
    xdg_or_default("XDG_CONFIG_HOME", ".config")
        .join(APP_NAME)
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_under_app_name() {
        let paths = get_paths();
        assert!(paths.cache_dir.ends_with(APP_NAME));
        assert!(paths.state_dir.ends_with(APP_NAME));
        assert_eq!(paths.index_db.file_name().unwrap(), INDEX_FILENAME);
        assert_eq!(paths.mcp_pid_file.file_name().unwrap(), MCP_PID_FILENAME);
    }
}
