use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::timeline::TimelineConfig;
use crate::verdict::classify::ClassifierThresholds;

/// One remote provider block from config.toml.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub model: Option<String>,
}

impl EndpointConfig {
    pub fn timeout(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(default_secs))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-job working directories are created under this path.
    pub work_dir: Option<PathBuf>,
    pub max_frames: u32,
    pub progress_every_frames: u32,
    pub keep_artifacts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            max_frames: 300,
            progress_every_frames: 5,
            keep_artifacts: false,
        }
    }
}

/// Top-level vmod config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct VmodConfig {
    pub vision: Option<EndpointConfig>,
    pub transcription: Option<EndpointConfig>,
    pub report: Option<EndpointConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub classifier: ClassifierThresholds,
}

impl VmodConfig {
    /// Load config from ~/.vmod/config.toml. Returns default if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(VmodConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: VmodConfig =
            toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
        Ok(config)
    }

    /// Working directory root, defaulting to ~/.vmod/work.
    pub fn work_dir(&self) -> Result<PathBuf> {
        match self.pipeline.work_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(vmod_home()?.join("work")),
        }
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        for (name, endpoint) in [
            ("vision", &self.vision),
            ("transcription", &self.transcription),
            ("report", &self.report),
        ] {
            if let Some(ref ep) = endpoint {
                lines.push(format!("[{name}]"));
                display_endpoint_config(&mut lines, ep);
            }
        }
        if lines.is_empty() {
            lines.push("(no providers configured, local simulators will be used)".to_string());
        }
        lines.push("[pipeline]".to_string());
        if let Some(ref dir) = self.pipeline.work_dir {
            lines.push(format!("  work_dir = \"{}\"", dir.display()));
        }
        lines.push(format!("  max_frames = {}", self.pipeline.max_frames));
        lines.push(format!(
            "  progress_every_frames = {}",
            self.pipeline.progress_every_frames
        ));
        lines.push(format!("  keep_artifacts = {}", self.pipeline.keep_artifacts));
        lines.join("\n")
    }
}

/// First and last four characters of a long secret, `****` otherwise.
fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn display_endpoint_config(lines: &mut Vec<String>, ep: &EndpointConfig) {
    if let Some(ref url) = ep.base_url {
        lines.push(format!("  base_url = \"{}\"", url));
    }
    if let Some(secs) = ep.timeout_secs {
        lines.push(format!("  timeout_secs = {}", secs));
    }
    if let Some(ref model) = ep.model {
        lines.push(format!("  model = \"{}\"", model));
    }
    if let Some(ref key) = ep.api_key {
        lines.push(format!("  api_key = \"{}\"", redact(key)));
    }
    if let Some(ref cmd) = ep.api_key_command {
        lines.push(format!("  api_key_command = \"{}\"", cmd));
    }
}

/// Resolve an endpoint URL: CLI flag > env var > config. `None` means "use the local fallback".
pub fn resolve_endpoint(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: Option<&EndpointConfig>,
) -> Option<String> {
    if let Some(url) = cli_flag {
        if !url.is_empty() {
            return Some(url.trim_end_matches('/').to_string());
        }
    }

    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Some(val.trim_end_matches('/').to_string());
        }
    }

    config
        .and_then(|c| c.base_url.as_deref())
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
}

/// Resolve the report API key: CLI flag > env var > config `api_key` > config `api_key_command`.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: Option<&EndpointConfig>,
) -> Result<String> {
    let from_env = std::env::var(env_var_name).ok();
    let direct = cli_flag
        .map(str::to_string)
        .into_iter()
        .chain(from_env)
        .chain(config.and_then(|ep| ep.api_key.clone()))
        .find(|k| !k.is_empty());
    if let Some(key) = direct {
        return Ok(key);
    }

    if let Some(cmd) = config
        .and_then(|ep| ep.api_key_command.as_deref())
        .filter(|c| !c.is_empty())
    {
        let secret = run_key_command(cmd)?;
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    bail!(
        "No API key found. Provide via --report-api-key, {} env var, or ~/.vmod/config.toml",
        env_var_name
    );
}

/// Run `api_key_command` through the shell and return its trimmed stdout.
fn run_key_command(cmd: &str) -> Result<String> {
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

    if !output.status.success() {
        bail!(
            "api_key_command failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8(output.stdout)
        .context("api_key_command output is not valid UTF-8")?
        .trim()
        .to_string())
}

/// ~/.vmod
pub fn vmod_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".vmod"))
}

/// Path to the config file: ~/.vmod/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(vmod_home()?.join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.vmod/config.toml
# Endpoint resolution order: CLI flag > env var > base_url
# Providers without a base_url fall back to the local simulators.

[vision]
# base_url = "http://localhost:5002"
# timeout_secs = 30

[transcription]
# base_url = "http://localhost:5002"
# timeout_secs = 120

[report]
# base_url = "https://llm.example.com/v1/moderation-report"
# model = "report-writer"
# api_key_command = "your-secrets-manager-command-here"
# timeout_secs = 30

[pipeline]
# work_dir = "/var/tmp/vmod"
max_frames = 300
progress_every_frames = 5
keep_artifacts = false
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_with_defaults() {
        let config = VmodConfig::parse(default_config_template()).unwrap();
        assert_eq!(config.pipeline.max_frames, 300);
        assert!(config.vision.as_ref().and_then(|v| v.base_url.clone()).is_none());
        assert_eq!(config.timeline.flag_threshold, 0.25);
        assert_eq!(config.classifier.flag_violence, 0.7);
    }

    #[test]
    fn endpoint_resolution_prefers_cli_flag() {
        let ep = EndpointConfig {
            base_url: Some("http://from-config:5002/".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_endpoint(Some("http://cli:1/"), "VMOD_TEST_UNSET_URL", Some(&ep)).as_deref(),
            Some("http://cli:1")
        );
        assert_eq!(
            resolve_endpoint(None, "VMOD_TEST_UNSET_URL", Some(&ep)).as_deref(),
            Some("http://from-config:5002")
        );
        assert_eq!(resolve_endpoint(None, "VMOD_TEST_UNSET_URL", None), None);
    }

    #[test]
    fn redacted_display_hides_keys() {
        let config = VmodConfig {
            report: Some(EndpointConfig {
                api_key: Some("sk-1234567890abcdef".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let shown = config.display_redacted();
        assert!(shown.contains("sk-1...cdef"));
        assert!(!shown.contains("1234567890"));
    }

    #[test]
    fn credential_falls_through_to_command() {
        let ep = EndpointConfig {
            api_key: Some(String::new()),
            api_key_command: Some("echo '  from-command  '".into()),
            ..Default::default()
        };
        let key = resolve_credential(None, "VMOD_TEST_UNSET_KEY", Some(&ep)).unwrap();
        assert_eq!(key, "from-command");
        assert_eq!(
            resolve_credential(Some("cli-key"), "VMOD_TEST_UNSET_KEY", Some(&ep)).unwrap(),
            "cli-key"
        );
        assert!(resolve_credential(None, "VMOD_TEST_UNSET_KEY", None).is_err());
    }
}
