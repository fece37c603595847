use serde::{Deserialize, Serialize};

/// API server configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// port: 8080
/// db: /var/lib/kubelite/data
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigFile {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, alias = "db-path")]
    pub db: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: ServerConfigFile = load_config_file("/nonexistent/config.yaml").unwrap();
        assert!(cfg.port.is_none());
        assert!(cfg.db.is_none());
    }

    #[test]
    fn parses_kebab_alias() {
        let cfg: ServerConfigFile =
            serde_yaml::from_str("port: 9090\ndb-path: /tmp/data\n").unwrap();
        assert_eq!(cfg.port, Some(9090));
        assert_eq!(cfg.db.as_deref(), Some("/tmp/data"));
    }
}
