use anyhow::{Context, Result};
use catalog_core::catalog::CacheSettings;
use catalog_core::generate::GenerateSettings;
use catalog_core::normalize::NormalizeSettings;
use catalog_core::rank::RankSettings;
use catalog_core::search::{SearchSettings, MAX_PAGE_SIZE};
use catalog_core::tokenize::IndexSettings;
use catalog_core::CatalogSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub normalize: NormalizeSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub ranking: RankSettings,
    #[serde(default)]
    pub generation: GenerateSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub studies: Option<StudiesSourceConfig>,
    pub articles: Option<ArticlesSourceConfig>,
}

/// `<root>/<organism>/<project>.json` study files.
#[derive(Debug, Deserialize, Clone)]
pub struct StudiesSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*/*.json".to_string()]
}

/// Flat JSON array of literature articles.
#[derive(Debug, Deserialize, Clone)]
pub struct ArticlesSourceConfig {
    pub path: PathBuf,
    /// Read instead of `path` when `path` does not exist.
    #[serde(default)]
    pub legacy_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Engine settings carried by this config.
    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            normalize: self.normalize.clone(),
            index: self.index.clone(),
            search: self.search.clone(),
            ranking: self.ranking.clone(),
            generation: self.generation.clone(),
            cache: self.cache.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate sources
    if config.sources.studies.is_none() && config.sources.articles.is_none() {
        anyhow::bail!("at least one of [sources.studies] or [sources.articles] must be configured");
    }

    // Validate index
    if config.index.min_token_len == 0 {
        anyhow::bail!("index.min_token_len must be >= 1");
    }

    // Validate search
    if !(0.0..=1.0).contains(&config.search.partial_min_fraction)
        || config.search.partial_min_fraction == 0.0
    {
        anyhow::bail!("search.partial_min_fraction must be in (0.0, 1.0]");
    }
    if config.search.max_query_chars == 0 {
        anyhow::bail!("search.max_query_chars must be >= 1");
    }

    // Validate ranking
    let r = &config.ranking;
    let weights = [
        ("text_weight", r.text_weight),
        ("recency_weight", r.recency_weight),
        ("citation_weight", r.citation_weight),
        ("completeness_weight", r.completeness_weight),
    ];
    if let Some((name, _)) = weights.iter().find(|(_, w)| *w < 0.0) {
        anyhow::bail!("ranking.{} must be >= 0.0", name);
    }
    if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
        anyhow::bail!("ranking weights must not all be zero");
    }
    if !(0.0..=1.0).contains(&r.important_relative) {
        anyhow::bail!("ranking.important_relative must be in [0.0, 1.0]");
    }
    if r.citation_half_saturation <= 0.0 {
        anyhow::bail!("ranking.citation_half_saturation must be > 0.0");
    }

    // Validate generation
    if config.generation.summary_max_chars == 0 {
        anyhow::bail!("generation.summary_max_chars must be > 0");
    }
    if config.generation.highlight_count as i64 > MAX_PAGE_SIZE {
        anyhow::bail!("generation.highlight_count must be <= {}", MAX_PAGE_SIZE);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config("[sources.studies]\nroot = \"./data/odr\"\n");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.index.min_token_len, 3);
        assert_eq!(cfg.cache.capacity, 256);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert_eq!(
            cfg.sources.studies.unwrap().include_globs,
            vec!["*/*.json".to_string()]
        );
    }

    #[test]
    fn test_config_requires_a_source() {
        let file = write_config("[server]\nbind = \"127.0.0.1:9000\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("sources"));
    }

    #[test]
    fn test_config_rejects_negative_weight() {
        let file = write_config(
            "[sources.articles]\npath = \"a.json\"\n\n[ranking]\ncitation_weight = -1.0\n",
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("citation_weight"));
    }

    #[test]
    fn test_config_aliases_extend_defaults() {
        let file = write_config(
            "[sources.articles]\npath = \"a.json\"\n\n[normalize.organism_aliases]\nmus_musculus = \"Rodent\"\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(
            cfg.normalize.organism_aliases.get("mus_musculus").map(String::as_str),
            Some("Rodent")
        );
    }
}
