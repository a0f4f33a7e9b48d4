use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

/// Parse a `.env`-style file into a map. Lines are `KEY=VALUE`; `#` comments
/// and blank lines are skipped. Missing file yields an empty map.
pub fn parse_env_file() -> Result<HashMap<String, String>> {
    parse_env_file_at(Path::new(".env"))
}

pub fn parse_env_file_at(path: &Path) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    if !path.exists() {
        return Ok(map);
    }
    let raw = std::fs::read_to_string(path)?;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().trim_matches('"').to_string());
        }
    }
    Ok(map)
}

/// Export `.env` entries into the process environment without overriding
/// variables already set by the caller.
pub fn load_dotenv_if_present() -> Result<()> {
    for (k, v) in parse_env_file()? {
        if std::env::var_os(&k).is_none() {
            std::env::set_var(k, v);
        }
    }
    Ok(())
}
