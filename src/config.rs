use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::util::path::MatchMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Upload worker count; derived from available parallelism when unset.
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    1000
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Google OAuth client JSON as downloaded from the Cloud console
    pub credentials_file: Option<PathBuf>,
    /// Port for the local OAuth callback server
    pub redirect_port: Option<u16>,
    /// Custom path for token storage
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub local_folder_path: PathBuf,
    pub target_folder_id: String,
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub compare_with: CompareWith,
}

/// Which remote folder a subfolder's files are checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareWith {
    /// The target folder itself, for every local folder.
    #[default]
    Root,
    /// The remote folder named like the local subfolder.
    Subfolder,
}

/// OAuth client identity of this installed application.
#[derive(Debug, Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
}

/// Google's client secret file: `{"installed": {...}}` or `{"web": {...}}`.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretEntry>,
    web: Option<ClientSecretEntry>,
}

#[derive(Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: String,
}

const BUILTIN_CLIENT_ID: Option<&str> = option_env!("DRIVEPUSH_CLIENT_ID");
const BUILTIN_CLIENT_SECRET: Option<&str> = option_env!("DRIVEPUSH_CLIENT_SECRET");

impl AuthConfig {
    /// Resolve client credentials: inline values, then `credentials_file`,
    /// then credentials compiled into the binary.
    pub fn client_secret(&self, config_dir: Option<&Path>) -> Result<ClientSecret> {
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret)
            && !id.is_empty()
            && !secret.is_empty()
        {
            return Ok(ClientSecret {
                client_id: id.clone(),
                client_secret: secret.clone(),
            });
        }

        if let Some(file) = &self.credentials_file {
            let path = match config_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            return load_client_secret_file(&path);
        }

        if let (Some(id), Some(secret)) = (BUILTIN_CLIENT_ID, BUILTIN_CLIENT_SECRET)
            && !id.is_empty()
        {
            return Ok(ClientSecret {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
            });
        }

        anyhow::bail!(
            "No OAuth client configured: set auth.client_id and auth.client_secret, \
             or point auth.credentials_file at your Google client JSON"
        )
    }
}

fn load_client_secret_file(path: &Path) -> Result<ClientSecret> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
    let file: ClientSecretFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse credentials file: {}", path.display()))?;
    let entry = file
        .installed
        .or(file.web)
        .with_context(|| format!("{} has no \"installed\" or \"web\" client", path.display()))?;
    Ok(ClientSecret {
        client_id: entry.client_id,
        client_secret: entry.client_secret,
    })
}

pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("drivepush").join("config.toml"))
}

pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_config_path(),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\
             Create it with your sync folder and Drive folder id.\n\
             See config/drivepush.example.toml for an example.",
            path.display()
        )
    })?;

    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    if config.sync.target_folder_id.trim().is_empty() {
        anyhow::bail!("sync.target_folder_id must not be empty");
    }
    if config.sync.local_folder_path.as_os_str().is_empty() {
        anyhow::bail!("sync.local_folder_path must not be empty");
    }
    if config.general.page_size == 0 || config.general.page_size > 1000 {
        anyhow::bail!("general.page_size must be between 1 and 1000");
    }
    if config.general.max_workers == Some(0) {
        anyhow::bail!("general.max_workers must be at least 1");
    }

    // An empty pattern would match every path containing a '/'.
    config.sync.skip_patterns.retain(|p| {
        let keep = !p.trim().is_empty() && p.trim() != "/*";
        if !keep {
            tracing::warn!(pattern = %p, "ignoring empty skip pattern");
        }
        keep
    });

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [sync]
        local_folder_path = "/home/me/Pictures"
        target_folder_id = "1AbC"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.sync.target_folder_id, "1AbC");
        assert!(cfg.sync.skip_patterns.is_empty());
        assert_eq!(cfg.sync.match_mode, MatchMode::Substring);
        assert_eq!(cfg.general.page_size, 1000);
        assert_eq!(cfg.general.max_workers, None);
        assert_eq!(cfg.sync.compare_with, CompareWith::Root);
    }

    #[test]
    fn full_config() {
        let cfg = parse_config(
            r#"
            [general]
            max_workers = 2
            page_size = 200

            [auth]
            client_id = "id"
            client_secret = "secret"
            redirect_port = 9090

            [sync]
            local_folder_path = "/data"
            target_folder_id = "root-id"
            skip_patterns = ["node_modules", ".git/*"]
            match_mode = "glob"
            compare_with = "subfolder"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.general.max_workers, Some(2));
        assert_eq!(cfg.general.page_size, 200);
        assert_eq!(cfg.auth.redirect_port, Some(9090));
        assert_eq!(cfg.sync.skip_patterns, vec!["node_modules", ".git/*"]);
        assert_eq!(cfg.sync.match_mode, MatchMode::Glob);
        assert_eq!(cfg.sync.compare_with, CompareWith::Subfolder);

        let secret = cfg.auth.client_secret(None).unwrap();
        assert_eq!(secret.client_id, "id");
        assert_eq!(secret.client_secret, "secret");
    }

    #[test]
    fn empty_target_rejected() {
        let err = parse_config(
            r#"
            [sync]
            local_folder_path = "/data"
            target_folder_id = " "
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("target_folder_id"));
    }

    #[test]
    fn zero_workers_rejected() {
        let content = format!("[general]\nmax_workers = 0\n{MINIMAL}");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn empty_skip_patterns_dropped() {
        let cfg = parse_config(
            r#"
            [sync]
            local_folder_path = "/data"
            target_folder_id = "x"
            skip_patterns = ["", "/*", "tmp"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sync.skip_patterns, vec!["tmp"]);
    }

    #[test]
    fn client_secret_from_google_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed":{"client_id":"abc.apps.googleusercontent.com","client_secret":"s3cret","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let auth = AuthConfig {
            credentials_file: Some(PathBuf::from("credentials.json")),
            ..AuthConfig::default()
        };
        let secret = auth.client_secret(Some(dir.path())).unwrap();
        assert_eq!(secret.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secret.client_secret, "s3cret");
    }

    #[test]
    fn load_config_reports_path() {
        let err = load_config(Path::new("/nonexistent/drivepush.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/drivepush.toml"));
    }
}
