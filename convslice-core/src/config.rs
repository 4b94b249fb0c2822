use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SliceError};

pub const DEFAULT_FILENAME_TEMPLATE: &str = "convo_{date}_{time}_{id}_{slice}_{slug}.json";
pub const DEFAULT_SLUG_MAXLEN: usize = 50;
pub const DEFAULT_SLICE_NAME: &str = "slice";

/// Message ordering applied while normalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Document order for flat lists, traversal order for mapping trees
    #[default]
    AsGiven,
    /// Stable re-order by message `create_time`
    Chronological,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::AsGiven => "as-given",
            SortMode::Chronological => "chronological",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = SliceError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "as-given" | "as_given" | "asgiven" => Ok(SortMode::AsGiven),
            "chronological" => Ok(SortMode::Chronological),
            other => Err(SliceError::config(format!(
                "unsupported sort_mode '{other}' (expected 'as-given' or 'chronological')"
            ))),
        }
    }
}

/// Effective settings for one run: defaults, then the config file, then CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub filename_template: String,
    pub slug_maxlen: usize,
    pub sort_mode: SortMode,
    pub include_sha256: bool,
    pub allow_empty_slices: bool,
    pub default_slice_name: String,
    pub tags: Vec<String>,
    /// Config file the values were read from, if any
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            slug_maxlen: DEFAULT_SLUG_MAXLEN,
            sort_mode: SortMode::AsGiven,
            include_sha256: true,
            allow_empty_slices: false,
            default_slice_name: DEFAULT_SLICE_NAME.to_string(),
            tags: Vec::new(),
            config_path: None,
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub filename_template: Option<String>,
    pub slug_maxlen: Option<usize>,
    pub sort_mode: Option<SortMode>,
    pub include_sha256: Option<bool>,
    pub allow_empty_slices: Option<bool>,
    pub default_slice_name: Option<String>,
    /// Replaces `defaults.tags` when non-empty
    pub tags: Vec<String>,
}

impl Settings {
    /// Resolve settings from an explicit config path (or the search paths)
    /// and the CLI overrides.
    pub fn load(explicit: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let mut settings = Settings::default();

        let path = match explicit {
            Some(explicit) => {
                let expanded = expand_path(explicit);
                if !expanded.is_file() {
                    return Err(SliceError::config(format!(
                        "config file {} does not exist",
                        expanded.display()
                    )));
                }
                Some(expanded)
            }
            None => config_search_paths().into_iter().find(|p| p.is_file()),
        };

        match path {
            Some(path) => {
                if let Some(raw) = load_raw_config(&path)? {
                    settings.apply_file(raw)?;
                    info!(path = %path.display(), "loaded config file");
                    settings.config_path = Some(path);
                }
            }
            None => debug!("no config file found; using built-in defaults"),
        }

        settings.apply_cli(overrides);
        settings.validate()?;
        Ok(settings)
    }

    fn apply_file(&mut self, raw: RawConfig) -> Result<()> {
        let RawConfig { output, defaults } = raw;
        if let Some(template) = output.filename_template {
            self.filename_template = template;
        }
        if let Some(maxlen) = output.slug_maxlen {
            self.slug_maxlen = maxlen;
        }
        if let Some(mode) = output.sort_mode {
            self.sort_mode = mode.parse()?;
        }
        if let Some(include) = output.include_sha256 {
            self.include_sha256 = include;
        }
        if let Some(allow) = output.allow_empty_slices {
            self.allow_empty_slices = allow;
        }
        if let Some(name) = defaults.slice_name {
            self.default_slice_name = name;
        }
        if let Some(tags) = defaults.tags {
            self.tags = tags;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(template) = &overrides.filename_template {
            self.filename_template = template.clone();
        }
        if let Some(maxlen) = overrides.slug_maxlen {
            self.slug_maxlen = maxlen;
        }
        if let Some(mode) = overrides.sort_mode {
            self.sort_mode = mode;
        }
        if let Some(include) = overrides.include_sha256 {
            self.include_sha256 = include;
        }
        if let Some(allow) = overrides.allow_empty_slices {
            self.allow_empty_slices = allow;
        }
        if let Some(name) = &overrides.default_slice_name {
            self.default_slice_name = name.clone();
        }
        if !overrides.tags.is_empty() {
            self.tags = overrides.tags.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.filename_template.trim().is_empty() {
            return Err(SliceError::config("output.filename_template must not be empty"));
        }
        if self.filename_template.contains(['/', '\\']) {
            return Err(SliceError::config(format!(
                "output.filename_template '{}' must not contain path separators",
                self.filename_template
            )));
        }
        if self.slug_maxlen == 0 {
            return Err(SliceError::config("output.slug_maxlen must be at least 1"));
        }
        if self.default_slice_name.trim().is_empty() {
            return Err(SliceError::config("defaults.slice_name must not be empty"));
        }
        Ok(())
    }
}

/// Candidate config files, in lookup order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("convslice.yaml"), PathBuf::from("convslice.yml")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".convslice").join("config.yaml"));
    }
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("convslice").join("config.yaml"));
    }
    candidates
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    output: RawOutput,
    defaults: RawDefaults,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOutput {
    filename_template: Option<String>,
    slug_maxlen: Option<usize>,
    sort_mode: Option<String>,
    include_sha256: Option<bool>,
    allow_empty_slices: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDefaults {
    slice_name: Option<String>,
    tags: Option<Vec<String>>,
}

/// `Ok(None)` means the file exists but could not be read for lack of an
/// optional parser; defaults apply.
fn load_raw_config(path: &Path) -> Result<Option<RawConfig>> {
    let data = fs::read_to_string(path).map_err(|e| SliceError::filesystem(path, e))?;
    if data.trim().is_empty() {
        return Ok(Some(RawConfig::default()));
    }

    match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => toml::from_str::<RawConfig>(&data)
            .map(Some)
            .map_err(|e| parse_failure(path, e)),
        ConfigFormat::Json => serde_json::from_str::<RawConfig>(&data)
            .map(Some)
            .map_err(|e| parse_failure(path, e)),
        ConfigFormat::Yaml => parse_yaml(path, &data),
    }
}

fn parse_failure(path: &Path, err: impl fmt::Display) -> SliceError {
    SliceError::config(format!("failed to parse {}: {err}", path.display()))
}

#[cfg(feature = "yaml")]
fn parse_yaml(path: &Path, data: &str) -> Result<Option<RawConfig>> {
    serde_yaml::from_str::<Option<RawConfig>>(data)
        .map(|raw| Some(raw.unwrap_or_default()))
        .map_err(|e| parse_failure(path, e))
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(path: &Path, data: &str) -> Result<Option<RawConfig>> {
    // JSON documents are valid YAML, so they still load without the parser
    if let Ok(raw) = serde_json::from_str::<RawConfig>(data) {
        return Ok(Some(raw));
    }
    let err = SliceError::MissingOptionalDependency {
        feature: "yaml".to_string(),
        path: path.to_path_buf(),
    };
    tracing::warn!(error = %err, "ignoring config file; built-in defaults apply");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(
            settings.filename_template,
            "convo_{date}_{time}_{id}_{slice}_{slug}.json"
        );
        assert_eq!(settings.slug_maxlen, 50);
        assert_eq!(settings.sort_mode, SortMode::AsGiven);
        assert!(settings.include_sha256);
        assert!(!settings.allow_empty_slices);
        assert_eq!(settings.default_slice_name, "slice");
        assert!(settings.tags.is_empty());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_file_overrides_defaults_key_by_key() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "convslice.yaml",
            "output:\n  slug_maxlen: 20\n  sort_mode: chronological\ndefaults:\n  tags: [morning, ritual]\n",
        );
        let settings = Settings::load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(settings.slug_maxlen, 20);
        assert_eq!(settings.sort_mode, SortMode::Chronological);
        assert_eq!(settings.tags, vec!["morning", "ritual"]);
        // Untouched keys keep their defaults
        assert_eq!(settings.filename_template, DEFAULT_FILENAME_TEMPLATE);
        assert!(settings.include_sha256);
        assert_eq!(settings.config_path.as_deref(), Some(path.as_path()));
    }

    #[cfg(not(feature = "yaml"))]
    #[test]
    fn yaml_without_parser_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "convslice.yaml", "output:\n  slug_maxlen: 20\n");
        let settings = Settings::load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(settings.slug_maxlen, DEFAULT_SLUG_MAXLEN);
        assert!(settings.config_path.is_none());

        // JSON is valid YAML and still loads through the fallback
        let path = write_config(&dir, "json.yaml", r#"{"output": {"slug_maxlen": 12}}"#);
        let settings = Settings::load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(settings.slug_maxlen, 12);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.toml",
            "[output]\ninclude_sha256 = false\nslug_maxlen = 10\n\n[defaults]\ntags = [\"a\"]\n",
        );
        let overrides = CliOverrides {
            include_sha256: Some(true),
            tags: vec!["b".into()],
            ..CliOverrides::default()
        };
        let settings = Settings::load(Some(&path), &overrides).unwrap();
        assert!(settings.include_sha256);
        assert_eq!(settings.slug_maxlen, 10);
        assert_eq!(settings.tags, vec!["b"]);
    }

    #[test]
    fn json_config_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{"output": {"filename_template": "{n}_{slice}.json"}, "defaults": {"slice_name": "part"}}"#,
        );
        let settings = Settings::load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(settings.filename_template, "{n}_{slice}.json");
        assert_eq!(settings.default_slice_name, "part");
    }

    #[test]
    fn empty_config_file_means_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "convslice.yaml", "\n");
        let settings = Settings::load(Some(&path), &CliOverrides::default()).unwrap();
        assert_eq!(settings.slug_maxlen, DEFAULT_SLUG_MAXLEN);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.yaml")), &CliOverrides::default())
            .unwrap_err();
        assert!(matches!(err, SliceError::Config { .. }));
    }

    #[test]
    fn invalid_sort_mode_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.json", r#"{"output": {"sort_mode": "random"}}"#);
        let err = Settings::load(Some(&path), &CliOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("random"));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", "[output\nslug_maxlen = ");
        let err = Settings::load(Some(&path), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, SliceError::Config { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn template_with_path_separator_is_rejected() {
        let overrides = CliOverrides {
            filename_template: Some("../{slice}.json".into()),
            ..CliOverrides::default()
        };
        let mut settings = Settings::default();
        settings.apply_cli(&overrides);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn sort_mode_parsing() {
        assert_eq!("as-given".parse::<SortMode>().unwrap(), SortMode::AsGiven);
        assert_eq!(
            "Chronological".parse::<SortMode>().unwrap(),
            SortMode::Chronological
        );
        assert!("newest".parse::<SortMode>().is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path(Path::new("~/x.yaml")), home.join("x.yaml"));
        }
        assert_eq!(expand_path(Path::new("rel/x.yaml")), PathBuf::from("rel/x.yaml"));
    }
}
