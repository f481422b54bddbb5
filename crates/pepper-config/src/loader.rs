use crate::schema::{Configuration, MonitorOptions};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Jsonc,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;

        match ext {
            "jsonc" => Some(Self::Jsonc),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub options: MonitorOptions,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

impl ResolvedConfig {
    pub fn configuration(&self) -> Configuration {
        self.options.normalize()
    }
}

pub fn load_config_from_file(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unknown config format for: {}", path.display()))?;

    let options = parse_config_content(&content, format)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(ResolvedConfig {
        options: expand_env_vars(options),
        path: path.to_path_buf(),
        format,
    })
}

fn parse_config_content(content: &str, format: ConfigFormat) -> Result<MonitorOptions> {
    match format {
        ConfigFormat::Jsonc => json5::from_str(content).context("Failed to parse JSONC"),
        ConfigFormat::Json => serde_json::from_str(content).context("Failed to parse JSON"),
        ConfigFormat::Yaml => serde_yaml_ng::from_str(content).context("Failed to parse YAML"),
    }
}

const CONFIG_CANDIDATES: &[&str] = &[
    "pepper-monitor.jsonc",
    "pepper-monitor.json",
    "pepper-monitor.yml",
    "pepper-monitor.yaml",
    ".pepper-monitor.jsonc",
    ".pepper-monitor.json",
    ".pepper-monitor.yml",
    ".pepper-monitor.yaml",
];

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::new()];
    if let Some(config_dir) = dirs::config_dir() {
        dirs.push(config_dir.join("pepper-monitor"));
    }
    dirs
}

/// First existing candidate: working directory, then the user config dir.
pub fn find_config_file() -> Option<PathBuf> {
    find_all_config_files().into_iter().next()
}

fn find_all_config_files() -> Vec<PathBuf> {
    search_dirs()
        .iter()
        .flat_map(|dir| CONFIG_CANDIDATES.iter().map(move |name| dir.join(name)))
        .filter(|path| path.exists())
        .collect()
}

fn expand_env_vars(mut options: MonitorOptions) -> MonitorOptions {
    options.tag_prefix = expand_env_string(&options.tag_prefix);
    options.fluentd_host = expand_env_string(&options.fluentd_host);
    options
}

/// Substitute `${VAR}` and `$VAR`. Unset variables are left as written.
fn expand_env_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match env::var(&name) {
                Ok(value) => result.push_str(&value),
                Err(_) => {
                    result.push_str("${");
                    result.push_str(&name);
                    result.push('}');
                }
            }
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }

        match env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyErrorPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_expand_env_string_with_braces() {
        env::set_var("PEPPER_TEST_HOST", "fluentd.internal");
        let result = expand_env_string("${PEPPER_TEST_HOST}");
        assert_eq!(result, "fluentd.internal");
    }

    #[test]
    fn test_expand_env_string_without_braces() {
        env::set_var("PEPPER_TEST_ROBOT", "r2");
        let result = expand_env_string("pepper.$PEPPER_TEST_ROBOT.metrics");
        assert_eq!(result, "pepper.r2.metrics");
    }

    #[test]
    fn test_expand_env_string_missing_var() {
        let result = expand_env_string("${PEPPER_TEST_UNSET_VAR}-$PEPPER_TEST_UNSET_VAR");
        assert_eq!(result, "${PEPPER_TEST_UNSET_VAR}-$PEPPER_TEST_UNSET_VAR");
    }

    #[test]
    fn test_expand_env_string_lone_dollar() {
        assert_eq!(expand_env_string("cost $ 5"), "cost $ 5");
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("pepper-monitor.jsonc")),
            Some(ConfigFormat::Jsonc)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("pepper-monitor.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("pepper-monitor.yaml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("pepper-monitor.toml")), None);
    }

    #[test]
    fn test_load_jsonc_with_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.jsonc");
        fs::write(
            &path,
            r#"{
  // forward to the local collector
  "enable_fluentd": true,
  "interval_sec": "10" /* seconds */
}"#,
        )
        .unwrap();

        let resolved = load_config_from_file(&path).unwrap();
        assert_eq!(resolved.format, ConfigFormat::Jsonc);
        let config = resolved.configuration();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 10);
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.yml");
        fs::write(
            &path,
            "enable_fluentd: true\nfluentd_port: 24300\nkey_error_policy: skip_key\n",
        )
        .unwrap();

        let config = load_config_from_file(&path).unwrap().configuration();
        assert_eq!(config.port, 24300);
        assert_eq!(config.key_error_policy, KeyErrorPolicy::SkipKey);
    }

    #[test]
    fn test_env_expansion_applies_to_host_and_prefix() {
        env::set_var("PEPPER_TEST_COLLECTOR", "10.0.0.7");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(
            &path,
            r#"{"fluentd_host": "${PEPPER_TEST_COLLECTOR}", "tag_prefix": "robot"}"#,
        )
        .unwrap();

        let config = load_config_from_file(&path).unwrap().configuration();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.tag_prefix, "robot");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config_from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_config_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn test_unknown_extension_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pepper-monitor.ini");
        fs::write(&path, "enable_fluentd = true").unwrap();
        assert!(load_config_from_file(&path).is_err());
    }

    #[test]
    fn test_config_priority_order_documented() {
        assert_eq!(CONFIG_CANDIDATES[0], "pepper-monitor.jsonc");
        assert_eq!(CONFIG_CANDIDATES[1], "pepper-monitor.json");
        assert_eq!(CONFIG_CANDIDATES[2], "pepper-monitor.yml");
        assert_eq!(CONFIG_CANDIDATES[3], "pepper-monitor.yaml");
        assert_eq!(CONFIG_CANDIDATES[4], ".pepper-monitor.jsonc");
    }
}
