use std::path::PathBuf;

pub const DAEMON_TCP_PORT: u16 = 8790;

const DAEMON_TCP_HOST: &str = "127.0.0.1";

pub fn daemon_address() -> String {
    format!("{}:{}", DAEMON_TCP_HOST, DAEMON_TCP_PORT)
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/opuscule/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("opuscule")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("opuscule")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("opuscule")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("opuscule")
    }
}

/// Where each component keeps its `<component>_favorites.json`.
pub fn favorites_dir() -> PathBuf {
    data_dir().join("saved")
}

/// Look a program up on PATH.  Absolute or relative paths are checked as-is.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(program);
    if candidate.components().count() > 1 {
        return candidate.exists().then_some(candidate);
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_on_path_rejects_missing_program() {
        assert!(find_on_path("definitely-not-a-real-program-4f1c").is_none());
        assert!(find_on_path("/no/such/dir/program").is_none());
    }

    #[test]
    fn test_paths_are_namespaced() {
        assert!(data_dir().ends_with("opuscule"));
        assert!(config_dir().ends_with("opuscule"));
        assert!(favorites_dir().starts_with(data_dir()));
    }
}
