use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the shootsorter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage scanning and sorting settings
    pub storage: StorageConfig,

    /// Filename candidate extraction settings
    pub extraction: ExtractionConfig,

    /// Frame/template/OCR recognition settings
    pub recognition: RecognitionConfig,

    /// Catalog backend settings
    pub catalog: CatalogConfig,

    /// Interactive confirmation settings
    pub interaction: InteractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// How deep to descend into the storage when scanning
    pub recursion_depth: usize,

    /// Symlink instead of moving files, and keep a diff list
    pub simulation: bool,

    /// Name of the database file inside the storage root
    pub database_name: String,

    /// Extension fallback when MIME sniffing is unavailable
    pub video_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Lower bound of the calendar-year exclusion range
    pub year_min: u64,

    /// Upper bound of the calendar-year exclusion range
    pub year_max: u64,

    /// Smallest value considered a plausible shoot ID
    pub min_plausible_id: u64,

    /// Common video-quality markers, excluded unless bracketed
    pub quality_markers: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Directory with overlay template images, newest style first
    /// in lexicographic order
    pub template_dir: PathBuf,

    /// Minimum normalized cross-correlation score for a template hit
    pub match_threshold: f64,

    /// Frame height the templates were authored against
    pub reference_height: f64,

    /// How far back from the end of playback to search, in seconds
    pub search_window_secs: f64,

    /// Step between sampled frame positions, in seconds
    pub step_secs: f64,

    /// Reject frames with more than this fraction of bright pixels
    pub bright_pixel_limit: f64,

    /// Red-channel value above which a pixel counts as bright
    pub brightness_floor: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Display name of the catalog, also used for directory matching
    pub name: String,

    /// Base URL of the site for direct scraping
    pub base_url: String,

    /// Base URL of the JSON API
    pub api_url: String,

    /// Which backend answers queries
    pub mode: CatalogMode,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// Retry budget for timeout/connection errors
    pub retries: u32,

    /// Backoff between retries in milliseconds
    pub retry_backoff_ms: u64,

    /// How long a query may wait for cache population before the
    /// cache is disabled for the rest of the process
    pub cache_wait_secs: u64,

    /// Normalized 0-100 score a directory name must reach to be
    /// assigned to this catalog
    pub fuzzy_threshold: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMode {
    /// Scrape the site directly
    Direct,
    /// Query the JSON API per request
    Api,
    /// Bulk-download the API once and answer from the snapshot
    Cached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Prompt the operator on ambiguous or unconfident decisions
    pub interactive: bool,

    /// What to do at a decision point when no prompt surface exists
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Accept the sole/best candidate
    AcceptBest,
    /// Leave the movie untagged
    LeaveUntagged,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recursion_depth: 2,
            simulation: true,
            database_name: ".shootsorter_db.json".to_string(),
            video_extensions: vec![
                "mp4".to_string(),
                "mkv".to_string(),
                "avi".to_string(),
                "mov".to_string(),
                "wmv".to_string(),
                "webm".to_string(),
                "m4v".to_string(),
                "rm".to_string(),
            ],
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            year_min: 1970,
            year_max: 2029,
            min_plausible_id: 200,
            quality_markers: vec![360, 480, 720, 1080, 1440, 2160],
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            match_threshold: 0.6,
            reference_height: 720.0,
            search_window_secs: 3.0,
            step_secs: 1.0 / 3.0,
            bright_pixel_limit: 0.10,
            brightness_floor: 32,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            name: "Kink.com".to_string(),
            base_url: "https://www.kink.com".to_string(),
            api_url: "https://www.kinkyapi.site/kinkcom".to_string(),
            mode: CatalogMode::Cached,
            timeout_secs: 2,
            retries: 3,
            retry_backoff_ms: 1000,
            cache_wait_secs: 60,
            fuzzy_threshold: 85,
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            fallback: FallbackPolicy::AcceptBest,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        // Try to load from various locations
        let config_paths = [
            "shootsorter.toml",
            "config/shootsorter.toml",
            "~/.config/shootsorter/config.toml",
            "/etc/shootsorter/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        // Try environment variables
        if let Ok(config) = Self::from_env() {
            return Ok(config);
        }

        Err(anyhow!("No configuration file found"))
    }

    /// Load a specific configuration file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&config_str)?;
        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(depth) = std::env::var("SHOOTSORTER_RECURSION_DEPTH") {
            config.storage.recursion_depth = depth.parse().unwrap_or(2);
        }

        if let Ok(api_url) = std::env::var("SHOOTSORTER_API_URL") {
            config.catalog.api_url = api_url;
        }

        if let Ok(base_url) = std::env::var("SHOOTSORTER_BASE_URL") {
            config.catalog.base_url = base_url;
        }

        if let Ok(templates) = std::env::var("SHOOTSORTER_TEMPLATE_DIR") {
            config.recognition.template_dir = PathBuf::from(templates);
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.recursion_depth == 0 {
            return Err(anyhow!("recursion_depth must be greater than 0"));
        }

        if self.extraction.year_min > self.extraction.year_max {
            return Err(anyhow!("year exclusion range is inverted"));
        }

        if !(0.0..=1.0).contains(&self.recognition.match_threshold) {
            return Err(anyhow!("match_threshold must be within 0.0..=1.0"));
        }

        if self.recognition.step_secs <= 0.0 || self.recognition.search_window_secs <= 0.0 {
            return Err(anyhow!("frame search window and step must be positive"));
        }

        if self.catalog.retries == 0 {
            return Err(anyhow!("retries must be greater than 0"));
        }

        if !(0..=100).contains(&self.catalog.fuzzy_threshold) {
            return Err(anyhow!("fuzzy_threshold must be within 0..=100"));
        }

        Ok(())
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_recursion_depth(mut self, depth: usize) -> Self {
        self.config.storage.recursion_depth = depth;
        self
    }

    pub fn with_catalog_mode(mut self, mode: CatalogMode) -> Self {
        self.config.catalog.mode = mode;
        self
    }

    pub fn with_template_dir(mut self, dir: PathBuf) -> Self {
        self.config.recognition.template_dir = dir;
        self
    }

    pub fn simulation(mut self, simulation: bool) -> Self {
        self.config.storage.simulation = simulation;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.config.interaction.interactive = interactive;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.extraction.min_plausible_id, 200);
        assert_eq!(config.recognition.match_threshold, 0.6);
        assert!(config.storage.simulation);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_recursion_depth(4)
            .with_catalog_mode(CatalogMode::Direct)
            .simulation(false)
            .build();

        assert_eq!(config.storage.recursion_depth, 4);
        assert_eq!(config.catalog.mode, CatalogMode::Direct);
        assert!(!config.storage.simulation);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut broken = Config::default();
        broken.extraction.year_min = 3000;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.catalog.fuzzy_threshold, config.catalog.fuzzy_threshold);
        assert_eq!(back.catalog.mode, config.catalog.mode);
    }
}
