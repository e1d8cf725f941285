use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

pub const DB_PATH_ENV: &str = "LOCAL_CATALOG_DB";
pub const DEFAULT_DB_PATH: &str = "catalog.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
}

/// Resolves settings: explicit value, then `LOCAL_CATALOG_DB`, then `DB_PATH`
/// in `./.env`, then the default.
pub fn load_settings(cli_db_path: Option<PathBuf>) -> Result<Settings> {
    resolve(cli_db_path, env::var_os(DB_PATH_ENV).map(PathBuf::from), Path::new(".env"))
}

fn resolve(cli: Option<PathBuf>, from_env: Option<PathBuf>, env_file: &Path) -> Result<Settings> {
    if let Some(db_path) = cli {
        return Ok(Settings { db_path });
    }

    if let Some(db_path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        info!("Using database path from {}", DB_PATH_ENV);
        return Ok(Settings { db_path });
    }

    if env_file.exists() {
        let db_path = load_from_env(env_file)
            .with_context(|| format!("Failed to read {:?}", env_file))?;
        if let Some(db_path) = db_path {
            info!("Loaded database path from {:?}", env_file);
            return Ok(Settings { db_path });
        }
    }

    Ok(Settings {
        db_path: PathBuf::from(DEFAULT_DB_PATH),
    })
}

fn load_from_env(path: &Path) -> Result<Option<PathBuf>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("Malformed line in .env: {}", line))?;
        if key.trim() == "DB_PATH" {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() {
                return Ok(Some(PathBuf::from(value)));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn cli_then_env_then_env_file_then_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "# catalog\nOTHER=1\nDB_PATH=/srv/from_file.db\n")?;

        let cli = resolve(
            Some(PathBuf::from("/cli.db")),
            Some(PathBuf::from("/env.db")),
            &env_file,
        )?;
        assert_eq!(cli.db_path, PathBuf::from("/cli.db"));

        let from_env = resolve(None, Some(PathBuf::from("/env.db")), &env_file)?;
        assert_eq!(from_env.db_path, PathBuf::from("/env.db"));

        let from_file = resolve(None, None, &env_file)?;
        assert_eq!(from_file.db_path, PathBuf::from("/srv/from_file.db"));

        let fallback = resolve(None, Some(PathBuf::new()), &dir.path().join("missing"))?;
        assert_eq!(fallback.db_path, PathBuf::from(DEFAULT_DB_PATH));
        Ok(())
    }

    #[test]
    fn env_file_without_db_path_falls_through() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "DB_PATH=\"\"\nRUST_LOG=debug\n")?;

        assert_eq!(load_from_env(&env_file)?, None);
        assert_eq!(resolve(None, None, &env_file)?.db_path, PathBuf::from(DEFAULT_DB_PATH));
        Ok(())
    }

    #[test]
    fn malformed_env_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let env_file = dir.path().join(".env");
        fs::write(&env_file, "DB_PATH /no/equals\n")?;
        assert!(resolve(None, None, &env_file).is_err());
        Ok(())
    }
}
