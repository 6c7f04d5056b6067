use crate::criteria::WildcardFilter;
use crate::error::{ReconcileError, Result};
use crate::orphan::DefaultOrphanPolicy;
use crate::paths;
use crate::property::PropertyStrategy;
use crate::source::{BranchSource, ScmSource};
use crate::sources::{GitSource, ManifestSource};
use crate::strategy::{check_tag_window, into_chain, BuildStrategy, BuiltinStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    Git { remote: String },
    /// YAML head list; relative paths resolve against the project root.
    Manifest { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub properties: PropertyStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_strategies: Vec<BuiltinStrategy>,
}

impl SourceConfig {
    pub fn manifest(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Manifest { path: path.into() },
            properties: PropertyStrategy::default(),
            build_strategies: Vec::new(),
        }
    }

    pub fn git(id: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Git {
                remote: remote.into(),
            },
            properties: PropertyStrategy::default(),
            build_strategies: Vec::new(),
        }
    }

    pub fn to_branch_source(&self, root: &Path) -> BranchSource {
        let source: Arc<dyn ScmSource> = match &self.kind {
            SourceKind::Git { remote } => Arc::new(GitSource::new(&self.id, remote)),
            SourceKind::Manifest { path } => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    root.join(path)
                };
                Arc::new(ManifestSource::new(&self.id, path))
            }
        };
        let strategies: Vec<Arc<dyn BuildStrategy>> = into_chain(self.build_strategies.clone());
        BranchSource::new(source)
            .with_properties(self.properties.clone())
            .with_build_strategies(strategies)
    }
}

// ---------------------------------------------------------------------------
// CriteriaConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    #[serde(default = "default_include")]
    pub include: String,
    #[serde(default)]
    pub exclude: String,
}

fn default_include() -> String {
    "*".to_string()
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: String::new(),
        }
    }
}

impl CriteriaConfig {
    pub fn filter(&self) -> Result<WildcardFilter> {
        WildcardFilter::new(&self.include, &self.exclude)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    /// Priority order: the first source wins every conflict.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    #[serde(default)]
    pub orphans: DefaultOrphanPolicy,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            sources: Vec::new(),
            criteria: CriteriaConfig::default(),
            orphans: DefaultOrphanPolicy::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ReconcileError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Build the ordered source list. Refuses configurations with errors.
    pub fn branch_sources(&self, root: &Path) -> Result<Vec<BranchSource>> {
        if let Some(err) = self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            return Err(ReconcileError::InvalidConfig(err.message));
        }
        Ok(self
            .sources
            .iter()
            .map(|s| s.to_branch_source(root))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.sources.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no sources configured: every branch will be marked dead".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "source with an empty id".to_string(),
                });
            } else if !seen.insert(source.id.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("duplicate source id '{}'", source.id),
                });
            }
            if let SourceKind::Git { remote } = &source.kind {
                if remote.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("source '{}' has an empty remote", source.id),
                    });
                }
            }
            for strategy in &source.build_strategies {
                match strategy {
                    BuiltinStrategy::NamedBranches { patterns } => {
                        for message in patterns.iter().filter_map(|p| p.validate()) {
                            warnings.push(ConfigWarning {
                                level: WarnLevel::Error,
                                message: format!("source '{}': {message}", source.id),
                            });
                        }
                    }
                    BuiltinStrategy::Tags {
                        at_least_days,
                        at_most_days,
                    } => {
                        if let Some(message) = check_tag_window(*at_least_days, *at_most_days) {
                            warnings.push(ConfigWarning {
                                level: WarnLevel::Error,
                                message: format!("source '{}': {message}", source.id),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Err(e) = self.criteria.filter() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("invalid criteria: {e}"),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
