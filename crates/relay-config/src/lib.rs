//! Configuration management for Relay.
//!
//! Parses `relay.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `forum.name`
//! - `forum.server`
//! - `mappings[].target`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the site root directory.
    pub site_root: Option<PathBuf>,
    /// Override the permalink structure reported by the option store.
    pub permalink_structure: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "relay.toml";

/// Terminal directive the host keeps as its last rewrite rule.
pub const DEFAULT_TERMINAL_DIRECTIVE: &str = r"RewriteRule ^index\.php$ - [L]";

/// Unescaped spelling of [`DEFAULT_TERMINAL_DIRECTIVE`] found on some hosts.
pub const UNESCAPED_TERMINAL_DIRECTIVE: &str = "RewriteRule ^index.php$ - [L]";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site layout (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Rule merging configuration.
    pub rules: RulesConfig,
    /// Hosted forum preset.
    pub forum: ForumConfig,
    /// Additional proxy mappings, rendered after the forum preset.
    pub mappings: Vec<MappingConfig>,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    #[allow(clippy::derivable_impls)]
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw site configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root: Option<String>,
    control_file: Option<String>,
    rules_file: Option<String>,
    options_file: Option<String>,
    permalink_structure: Option<String>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default, Clone)]
pub struct SiteConfig {
    /// Site root directory.
    pub root: PathBuf,
    /// Root-level control file written in default routing mode.
    pub control_file: PathBuf,
    /// Rule text the host regenerates on a flush (custom routing mode).
    pub rules_file: PathBuf,
    /// JSON file backing the option store.
    pub options_file: PathBuf,
    /// Permalink structure override. `None` defers to the option store.
    pub permalink_structure: Option<String>,
}

/// Rule merging configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RulesConfig {
    /// Name of the `# BEGIN`/`# END` marker pair in the control file.
    pub marker: String,
    /// Accepted spellings of the host's terminal directive line.
    pub terminal_directives: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            marker: "WordPress".to_owned(),
            terminal_directives: vec![
                DEFAULT_TERMINAL_DIRECTIVE.to_owned(),
                UNESCAPED_TERMINAL_DIRECTIVE.to_owned(),
            ],
        }
    }
}

/// Hosted forum preset configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForumConfig {
    /// Remote forum identifier. Empty disables the preset.
    pub name: String,
    /// Remote host serving the forum, without scheme.
    pub server: String,
    /// Whether proxy rewrites are installed at all.
    pub proxy_rewrites: bool,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            server: "moot.it".to_owned(),
            proxy_rewrites: true,
        }
    }
}

/// A single proxy mapping as written in `[[mappings]]`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MappingConfig {
    /// Local path pattern (unanchored).
    pub pattern: String,
    /// Remote target template with `$N` backreferences.
    pub target: String,
    /// Rule flags in their textual form.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
}

fn default_flags() -> Vec<String> {
    vec!["P".to_owned()]
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`forum.name`").
        field: String,
        /// Error message (e.g., "${`FORUM_NAME`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `relay.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(site_root) = &settings.site_root {
            // Relative file names follow the new root
            self.resolve_site(site_root);
        }
        if let Some(permalink_structure) = &settings.permalink_structure {
            self.site_resolved.permalink_structure = Some(permalink_structure.clone());
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            site: SiteConfigRaw::default(),
            rules: RulesConfig::default(),
            forum: ForumConfig::default(),
            mappings: Vec::new(),
            site_resolved: SiteConfig::default(),
            config_path: None,
        };
        config.resolve_site(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before validation
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        let root = config_dir.join(config.site.root.as_deref().unwrap_or("."));
        config.resolve_site(&root);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_rules()?;
        self.validate_forum()?;
        self.validate_mappings()?;
        Ok(())
    }

    fn validate_rules(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.rules.marker, "rules.marker")?;
        if self.rules.terminal_directives.is_empty() {
            return Err(ConfigError::Validation(
                "rules.terminal_directives cannot be empty".to_owned(),
            ));
        }
        for (i, directive) in self.rules.terminal_directives.iter().enumerate() {
            require_non_empty(directive, &format!("rules.terminal_directives[{i}]"))?;
        }
        Ok(())
    }

    fn validate_forum(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.forum.server, "forum.server")?;
        if self.forum.server.contains("://") {
            return Err(ConfigError::Validation(
                "forum.server must be a host name without scheme".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_mappings(&self) -> Result<(), ConfigError> {
        for (i, mapping) in self.mappings.iter().enumerate() {
            require_non_empty(&mapping.pattern, &format!("mappings[{i}].pattern"))?;
            require_non_empty(&mapping.target, &format!("mappings[{i}].target"))?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.forum.name = expand::expand_env(&self.forum.name, "forum.name")?;
        self.forum.server = expand::expand_env(&self.forum.server, "forum.server")?;
        for (i, mapping) in self.mappings.iter_mut().enumerate() {
            mapping.target =
                expand::expand_env(&mapping.target, &format!("mappings[{i}].target"))?;
        }
        Ok(())
    }

    /// Resolve site file names against `root`.
    fn resolve_site(&mut self, root: &Path) {
        let resolve = |name: Option<&str>, default: &str| root.join(name.unwrap_or(default));

        self.site_resolved = SiteConfig {
            root: root.to_path_buf(),
            control_file: resolve(self.site.control_file.as_deref(), ".htaccess"),
            rules_file: resolve(self.site.rules_file.as_deref(), ".htaccess"),
            options_file: resolve(self.site.options_file.as_deref(), ".relay/options.json"),
            permalink_structure: self.site.permalink_structure.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/site"));
        assert_eq!(config.site_resolved.root, PathBuf::from("/site"));
        assert_eq!(
            config.site_resolved.control_file,
            PathBuf::from("/site/.htaccess")
        );
        assert_eq!(
            config.site_resolved.options_file,
            PathBuf::from("/site/.relay/options.json")
        );
        assert_eq!(config.site_resolved.permalink_structure, None);
        assert_eq!(config.rules.marker, "WordPress");
        assert_eq!(config.rules.terminal_directives.len(), 2);
        assert_eq!(config.forum.server, "moot.it");
        assert!(config.forum.proxy_rewrites);
        assert!(config.mappings.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.forum.name, "");
        assert_eq!(config.rules.marker, "WordPress");
    }

    #[test]
    fn test_parse_mappings_with_default_flags() {
        let toml = r#"
[[mappings]]
pattern = "feeds/(.*)"
target = "http://feeds.example/$1"

[[mappings]]
pattern = "api/(.*)"
target = "http://api.example/$1"
flags = ["P", "QSA"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.mappings,
            vec![
                MappingConfig {
                    pattern: "feeds/(.*)".to_owned(),
                    target: "http://feeds.example/$1".to_owned(),
                    flags: vec!["P".to_owned()],
                },
                MappingConfig {
                    pattern: "api/(.*)".to_owned(),
                    target: "http://api.example/$1".to_owned(),
                    flags: vec!["P".to_owned(), "QSA".to_owned()],
                },
            ]
        );
    }

    #[test]
    fn test_load_resolves_paths_relative_to_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[site]
root = "public"
options_file = "state/options.json"
permalink_structure = "/%postname%/"

[forum]
name = "acme"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        let root = tmp.path().join("public");
        assert_eq!(config.site_resolved.control_file, root.join(".htaccess"));
        assert_eq!(
            config.site_resolved.options_file,
            root.join("state/options.json")
        );
        assert_eq!(
            config.site_resolved.permalink_structure.as_deref(),
            Some("/%postname%/")
        );
        assert_eq!(config.forum.name, "acme");
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/relay.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_cli_settings_override() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[site]\ncontrol_file = \"custom.htaccess\"\n").unwrap();

        let settings = CliSettings {
            site_root: Some(PathBuf::from("/srv/www")),
            permalink_structure: Some(String::new()),
        };
        let config = Config::load(Some(&path), Some(&settings)).unwrap();
        assert_eq!(
            config.site_resolved.control_file,
            PathBuf::from("/srv/www/custom.htaccess")
        );
        assert_eq!(config.site_resolved.permalink_structure.as_deref(), Some(""));
    }

    #[test]
    fn test_server_with_scheme_rejected() {
        let toml = r#"
[forum]
server = "https://moot.it"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("forum.server"));
    }

    #[test]
    fn test_empty_terminal_directives_rejected() {
        let toml = r"
[rules]
terminal_directives = []
";
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("terminal_directives"));
    }

    #[test]
    fn test_empty_mapping_pattern_rejected() {
        let toml = r#"
[[mappings]]
pattern = ""
target = "http://x.example/"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mappings[0].pattern"));
    }

    #[test]
    fn test_env_expansion_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[forum]
name = "${RELAY_CFG_TEST_FORUM:-fallback}"

[[mappings]]
pattern = "x/(.*)"
target = "http://${RELAY_CFG_TEST_HOST:-x.example}/$1"
"#,
        )
        .unwrap();

        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RELAY_CFG_TEST_FORUM");
            std::env::remove_var("RELAY_CFG_TEST_HOST");
        }
        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.forum.name, "fallback");
        assert_eq!(config.mappings[0].target, "http://x.example/$1");
    }
}
