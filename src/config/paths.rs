use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment override for the log directory. Empty disables file logging.
pub const LOG_DIR_ENV: &str = "SSHTUN_LOG_DIR";

/// Platform config directory for sshtun
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sshtun", "sshtun").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Config file used when `--config` is not given
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("sshtun.toml"))
}

/// Log directory: `$SSHTUN_LOG_DIR` if set, else `<config dir>/logs`
pub fn log_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(LOG_DIR_ENV) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(PathBuf::from(trimmed));
    }

    config_dir().map(|d| d.join("logs"))
}

/// Ensure the config directory exists, owner-only on Unix
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Ensure the log directory exists, owner-only on Unix
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Create `dir` (and parents) if missing. Existing directories keep their mode.
pub fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}
