use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub vectors_path: PathBuf,
    pub config_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let user_data_dir = discover_user_data_dir();
        Self::with_data_dir(user_data_dir)
    }

    /// Root all storage under an explicit directory. Tests use this with a
    /// tempdir instead of touching the real data directory.
    pub fn with_data_dir(user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let db_path = user_data_dir.join("askbase.db");
        let vectors_path = user_data_dir.join("vectors.json");
        let config_path = match env::var("ASKBASE_CONFIG_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => user_data_dir.join("config.yml"),
        };
        let secrets_path = user_data_dir.join("secrets.yml");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            user_data_dir,
            log_dir,
            db_path,
            vectors_path,
            config_path,
            secrets_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_user_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("ASKBASE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Askbase");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Askbase");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("askbase")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
