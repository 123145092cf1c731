//! Bridge configuration

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default fal synchronous run host.
pub const DEFAULT_RUN_BASE_URL: &str = "https://fal.run";
/// Default fal REST host (storage uploads).
pub const DEFAULT_REST_BASE_URL: &str = "https://rest.alpha.fal.ai";
/// Local credentials file, section `[fal]`.
pub const DEFAULT_CONFIG_FILE: &str = "fal-config.ini";

/// Configuration loaded from environment, credential helper and config file
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// fal application that executes uploaded workflows
    pub application_name: Option<String>,
    /// fal API key
    pub api_key: Option<String>,

    /// Base URL for synchronous runs (`<base>/<app>`)
    pub run_base_url: String,
    /// Base URL for the storage API
    pub rest_base_url: String,

    /// Bearer token for civitai.com downloads
    pub civitai_token: Option<String>,
    /// Bearer token for huggingface.co downloads
    pub hf_token: Option<String>,

    /// Root of the host folder layout
    pub base_dir: PathBuf,
    /// Where remote model weights are stored
    pub weights_dir: PathBuf,

    pub server_host: String,
    pub server_port: u16,

    /// Read timeout for the remote event stream
    pub stream_timeout: Duration,
    /// Upload cache capacity
    pub upload_cache_capacity: usize,
    /// Skip PNG text metadata in saved images
    pub disable_metadata: bool,
}

/// Credentials as read from one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub application_name: Option<String>,
    pub api_key: Option<String>,
}

impl Credentials {
    fn or(self, fallback: impl FnOnce() -> Credentials) -> Credentials {
        if self.application_name.is_some() && self.api_key.is_some() {
            return self;
        }
        let fallback = fallback();
        Credentials {
            application_name: self.application_name.or(fallback.application_name),
            api_key: self.api_key.or(fallback.api_key),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let from_env = Credentials {
            application_name: var("FAL_APPLICATION_NAME"),
            api_key: var("FAL_KEY"),
        };
        let helper = var("FAL_CREDENTIALS_HELPER");
        let config_path = var("FAL_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let credentials = from_env
            .or(|| Credentials {
                application_name: None,
                api_key: helper.as_deref().and_then(run_credentials_helper),
            })
            .or(|| read_config_file(&config_path));

        let base_dir = PathBuf::from(var("FALBRIDGE_BASE_DIR").unwrap_or_else(|| ".".to_string()));
        let weights_dir = var("FALBRIDGE_WEIGHTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("models").join("fal"));

        Ok(Self {
            application_name: credentials.application_name,
            api_key: credentials.api_key,

            run_base_url: var("FAL_RUN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RUN_BASE_URL.to_string()),
            rest_base_url: var("FAL_REST_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REST_BASE_URL.to_string()),

            civitai_token: var("CIVITAI_TOKEN"),
            hf_token: var("HF_TOKEN"),

            base_dir,
            weights_dir,

            server_host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: var("SERVER_PORT")
                .unwrap_or_else(|| "8189".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,

            stream_timeout: Duration::from_secs(
                var("FAL_STREAM_TIMEOUT_SECS")
                    .unwrap_or_else(|| "120".to_string())
                    .parse()
                    .context("FAL_STREAM_TIMEOUT_SECS must be a number of seconds")?,
            ),
            upload_cache_capacity: var("FAL_UPLOAD_CACHE_CAPACITY")
                .unwrap_or_else(|| "128".to_string())
                .parse()
                .context("FAL_UPLOAD_CACHE_CAPACITY must be a number of entries")?,
            disable_metadata: var("FALBRIDGE_DISABLE_METADATA")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Remote endpoint executing workflows, if an application is configured
    pub fn endpoint(&self) -> Option<String> {
        self.application_name.as_ref().map(|app| {
            format!(
                "{}/{}",
                self.run_base_url.trim_end_matches('/'),
                app.trim_start_matches('/')
            )
        })
    }
}

/// Run the credential helper command and use its trimmed stdout as the key.
fn run_credentials_helper(command: &str) -> Option<String> {
    let output = match Command::new("sh").arg("-c").arg(command).output() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to run FAL_CREDENTIALS_HELPER");
            return None;
        }
    };
    if !output.status.success() {
        tracing::warn!(status = %output.status, "FAL_CREDENTIALS_HELPER exited with failure");
        return None;
    }
    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!key.is_empty()).then_some(key)
}

/// Read `[fal] application_name` and `[fal] api_key` from an INI file.
fn read_config_file(path: &Path) -> Credentials {
    if !path.exists() {
        return Credentials::default();
    }

    let settings = config::Config::builder()
        .add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Ini))
        .build();

    match settings {
        Ok(settings) => {
            let get = |key: &str| {
                settings
                    .get_string(key)
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            };
            Credentials {
                application_name: get("fal.application_name"),
                api_key: get("fal.api_key"),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Failed to read fal config file");
            Credentials::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = BridgeConfig::from_lookup(lookup(&[(
            "FAL_CONFIG_PATH",
            "/nonexistent/fal-config.ini",
        )]))
        .expect("config loads");

        assert_eq!(config.api_key, None);
        assert_eq!(config.endpoint(), None);
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.server_port, 8189);
        assert_eq!(config.stream_timeout, Duration::from_secs(120));
        assert_eq!(config.upload_cache_capacity, 128);
        assert_eq!(config.weights_dir, PathBuf::from("./models/fal"));
        assert!(!config.disable_metadata);
    }

    #[test]
    fn environment_takes_precedence_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fal-config.ini");
        std::fs::write(
            &path,
            "[fal]\napplication_name = file-app\napi_key = file-key\n",
        )
        .expect("write config");

        let config = BridgeConfig::from_lookup(lookup(&[
            ("FAL_CONFIG_PATH", path.to_str().expect("utf8 path")),
            ("FAL_KEY", "env-key"),
        ]))
        .expect("config loads");

        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.application_name.as_deref(), Some("file-app"));
        assert_eq!(
            config.endpoint().as_deref(),
            Some("https://fal.run/file-app")
        );
    }

    #[test]
    fn credentials_helper_supplies_the_key() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("FAL_CONFIG_PATH", "/nonexistent/fal-config.ini"),
            ("FAL_CREDENTIALS_HELPER", "echo helper-key"),
            ("FAL_APPLICATION_NAME", "me/comfy"),
        ]))
        .expect("config loads");

        assert_eq!(config.api_key.as_deref(), Some("helper-key"));
        assert_eq!(
            config.endpoint().as_deref(),
            Some("https://fal.run/me/comfy")
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = BridgeConfig::from_lookup(lookup(&[
            ("FAL_CONFIG_PATH", "/nonexistent/fal-config.ini"),
            ("SERVER_PORT", "not-a-port"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_cache_capacity_is_rejected() {
        let result = BridgeConfig::from_lookup(lookup(&[
            ("FAL_CONFIG_PATH", "/nonexistent/fal-config.ini"),
            ("FAL_UPLOAD_CACHE_CAPACITY", "lots"),
        ]));
        let message = format!("{:#}", result.err().expect("rejected"));
        assert!(message.contains("FAL_UPLOAD_CACHE_CAPACITY"));
    }
}
