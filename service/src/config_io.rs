use std::path::Path;

use anyhow::Context as _;

use dirserve_core::policy::{PolicyConfig, ServeConfig};

const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Extensionless files are read as TOML.
    fn for_path(path: &Path) -> anyhow::Result<Self> {
        let Some(ext) = path.extension() else {
            return Ok(Self::Toml);
        };
        match ext.to_string_lossy().to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unsupported config extension {other:?} (expected .toml or .json)"),
        }
    }
}

/// Policy switches given on the command line. A set flag turns the switch on
/// even when the config file leaves it off; flags never turn a switch off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overrides {
    pub read_only: bool,
    pub show_hidden: bool,
    pub show_symlinks: bool,
}

impl Overrides {
    fn apply(self, policy: &mut PolicyConfig) {
        policy.read_only |= self.read_only;
        policy.show_hidden |= self.show_hidden;
        policy.show_symlinks |= self.show_symlinks;
    }
}

pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<ServeConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::for_path(path)?;

    let len = std::fs::metadata(path)
        .with_context(|| format!("read config {}", path.display()))?
        .len();
    if len > MAX_CONFIG_BYTES {
        anyhow::bail!(
            "config {} is too large ({len} bytes; max {MAX_CONFIG_BYTES})",
            path.display()
        );
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;

    let config: ServeConfig = match format {
        ConfigFormat::Toml => toml::from_str(&raw)
            .with_context(|| format!("parse {} as toml", path.display()))?,
        ConfigFormat::Json => serde_json::from_str(&raw)
            .with_context(|| format!("parse {} as json", path.display()))?,
    };
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// The configuration the server starts with: the file when one is given,
/// defaults otherwise, with command-line switches applied on top.
pub fn resolve_config(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<ServeConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ServeConfig::default(),
    };
    overrides.apply(&mut config.policy);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = write(
            &dir,
            "serve.toml",
            "[policy]\nread_only = true\n\n[limits]\nmax_concurrency_archive = 2\n",
        );
        let config = load_config(&toml_path).unwrap();
        assert!(config.policy.read_only);
        assert!(!config.policy.show_hidden);
        assert_eq!(config.limits.max_concurrency_archive, 2);

        let json_path = write(&dir, "SERVE.JSON", r#"{"policy":{"show_hidden":true}}"#);
        let config = load_config(&json_path).unwrap();
        assert!(config.policy.show_hidden);
        assert!(!config.policy.read_only);

        let bare = write(&dir, "dirserve", "[policy]\nshow_symlinks = true\n");
        assert!(load_config(&bare).unwrap().policy.show_symlinks);
    }

    #[test]
    fn errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(&dir, "serve.yaml", "policy: {}\n");
        assert!(load_config(&yaml).unwrap_err().to_string().contains("\"yaml\""));

        let zero = write(&dir, "zero.toml", "[limits]\nmax_concurrency_io = 0\n");
        let err = load_config(&zero).unwrap_err();
        assert!(err.to_string().contains("zero.toml"));
        assert!(format!("{err:#}").contains("max_concurrency_io"));

        let unknown = write(&dir, "unknown.toml", "[policy]\nallow_everything = true\n");
        let err = load_config(&unknown).unwrap_err();
        assert!(err.to_string().contains("parse"));
        assert!(err.to_string().contains("unknown.toml"));

        let missing = dir.path().join("missing.toml");
        assert!(load_config(&missing).unwrap_err().to_string().contains("missing.toml"));
    }

    #[test]
    fn rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let big = write(&dir, "big.toml", &"#".repeat(MAX_CONFIG_BYTES as usize + 1));
        let err = load_config(&big).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn command_line_switches_only_turn_policy_on() {
        let config = resolve_config(None, Overrides::default()).unwrap();
        assert_eq!(config.policy, PolicyConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "serve.toml", "[policy]\nshow_hidden = true\n");
        let config = resolve_config(
            Some(&path),
            Overrides {
                read_only: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        assert!(config.policy.read_only);
        assert!(config.policy.show_hidden);
        assert!(!config.policy.show_symlinks);
    }
}
