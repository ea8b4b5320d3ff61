//! Configuration file parsing for `caos.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `~/.config/caos/caos.toml` if no project-level file is found.

use caos_compiler::Dialect;
use caos_runtime::{SchedulerConfig, WorldConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "caos.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct CaosConfig {
    #[serde(default)]
    pub vm: VmSection,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VmSection {
    /// Dialect used when the command line doesn't name one.
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

impl Default for VmSection {
    fn default() -> Self {
        Self { dialect: default_dialect() }
    }
}

fn default_dialect() -> String {
    "c3".to_string()
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct LogSection {
    /// `error`, `warn`, `info`, `debug` or `trace`. `RUST_LOG` wins when set.
    pub level: Option<String>,
}

impl CaosConfig {
    /// Load config from `caos.toml`, searching current dir then parents.
    /// Returns `Default` when no file is found.
    pub fn load() -> Self {
        Self::load_with_path().map(|(_path, cfg)| cfg).unwrap_or_default()
    }

    /// Load config and return the path to the config file that was found.
    pub fn load_with_path() -> Option<(PathBuf, Self)> {
        let dir = std::env::current_dir().ok()?;
        Self::find_from(&dir).or_else(Self::find_global)
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        toml::from_str(&content).map_err(|e| format!("invalid toml in '{}': {}", path.display(), e))
    }

    /// Walk from `start` up to the filesystem root looking for `caos.toml`.
    pub fn find_from(start: &Path) -> Option<(PathBuf, Self)> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                let cfg = Self::load_from(&config_path).ok()?;
                return Some((config_path, cfg));
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    fn find_global() -> Option<(PathBuf, Self)> {
        let home = std::env::var("HOME").ok().map(PathBuf::from)?;
        let global = home.join(".config").join("caos").join(CONFIG_FILE);
        if !global.exists() {
            return None;
        }
        let cfg = Self::load_from(&global).ok()?;
        Some((global, cfg))
    }

    /// Parse a TOML string directly.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Resolve `[vm] dialect`, or `explicit` when the caller passed one.
    pub fn dialect(&self, explicit: Option<&str>) -> Result<Dialect, String> {
        let name = explicit.unwrap_or(&self.vm.dialect);
        Dialect::from_name(name).ok_or_else(|| {
            let known: Vec<&str> = Dialect::all().iter().map(|d| d.name()).collect();
            format!("unknown dialect '{}' (expected one of: {})", name, known.join(", "))
        })
    }

    /// Generate a default `caos.toml` template.
    pub fn default_template() -> &'static str {
        r#"# CAOS engine configuration

[vm]
dialect = "c3"

[scheduler]
# Per-tick quantum; defaults to 1 for c1/c2 and 5 for c3/cv/sm
# timeslice = 5
max_call_depth = 256

[world]
seed = 0
width = 1000.0
height = 1000.0

[log]
# level = "info"
"#
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new(prefix: &str) -> Self {
            let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
            let path = std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), stamp));
            fs::create_dir_all(&path).expect("should create temp directory");
            Self { path }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn empty_string_returns_default() {
        let cfg = CaosConfig::from_toml("").expect("empty toml is valid");
        assert_eq!(cfg, CaosConfig::default());
        assert_eq!(cfg.vm.dialect, "c3");
        assert!(cfg.log.level.is_none());
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(CaosConfig::from_toml("[broken").is_err());
    }

    #[test]
    fn default_template_parses() {
        let cfg = CaosConfig::from_toml(CaosConfig::default_template()).expect("template must be valid toml");
        assert_eq!(cfg.vm.dialect, "c3");
        assert_eq!(cfg.scheduler.timeslice, None);
        assert_eq!(cfg.world, WorldConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = CaosConfig::from_toml(
            r#"
[vm]
dialect = "c2"

[scheduler]
timeslice = 10

[world]
seed = 99

[log]
level = "debug"
"#,
        )
        .expect("should parse");
        assert_eq!(cfg.dialect(None), Ok(Dialect::C2));
        assert_eq!(cfg.scheduler.timeslice, Some(10));
        assert_eq!(cfg.scheduler.max_call_depth, SchedulerConfig::default().max_call_depth);
        assert_eq!(cfg.world.seed, 99);
        assert_eq!(cfg.world.width, WorldConfig::default().width);
        assert_eq!(cfg.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn explicit_dialect_wins() {
        let cfg = CaosConfig::default();
        assert_eq!(cfg.dialect(Some("sm")), Ok(Dialect::Sm));
        let err = cfg.dialect(Some("c9")).unwrap_err();
        assert!(err.contains("c9"));
        assert!(err.contains("c1, c2, c3, cv, sm"));
    }

    #[test]
    fn found_in_ancestor_directory() {
        let temp = TempDir::new("caos_config_search");
        let nested = temp.path.join("scripts").join("agents");
        fs::create_dir_all(&nested).expect("should create nested dirs");
        fs::write(temp.path.join(CONFIG_FILE), "[vm]\ndialect = \"c1\"\n").expect("should write config");

        let (path, cfg) = CaosConfig::find_from(&nested).expect("config should be found");
        assert_eq!(path, temp.path.join(CONFIG_FILE));
        assert_eq!(cfg.dialect(None), Ok(Dialect::C1));
    }

    #[test]
    fn load_from_reports_bad_files() {
        let temp = TempDir::new("caos_config_bad");
        let path = temp.path.join(CONFIG_FILE);
        fs::write(&path, "[world]\nseed = \"not a number\"\n").expect("should write config");
        let err = CaosConfig::load_from(&path).unwrap_err();
        assert!(err.starts_with("invalid toml"));
        assert!(CaosConfig::load_from(&temp.path.join("missing.toml")).is_err());
    }
}
