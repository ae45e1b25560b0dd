use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One retailer entry from `config/retailers.yaml`.
///
/// `aliases` lists the spellings the extraction step and catalog tags use
/// for the same store ("Whole Foods Market", "WFM", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetailerConfig {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RetailerConfig {
    /// Generate a URL-safe slug from the retailer name.
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct RetailersFile {
    pub retailers: Vec<RetailerConfig>,
}

/// Load and validate the retailers configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_retailers(path: &Path) -> Result<RetailersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RetailersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: RetailersFile = serde_yaml::from_str(&content)?;
    validate_retailers(&file)?;
    Ok(file)
}

fn validate_retailers(file: &RetailersFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for retailer in &file.retailers {
        if retailer.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "retailer name must be non-empty".to_string(),
            ));
        }

        let slug = retailer.slug();
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate retailer slug: '{}' (from retailer '{}')",
                slug, retailer.name
            )));
        }
    }

    Ok(())
}

/// Alias-aware lookup from any retailer spelling to its canonical slug.
#[derive(Debug, Clone)]
pub struct RetailerRegistry {
    by_alias: HashMap<String, String>,
}

impl RetailerRegistry {
    #[must_use]
    pub fn from_file(file: &RetailersFile) -> Self {
        let mut by_alias = HashMap::new();
        for retailer in &file.retailers {
            let slug = retailer.slug();
            by_alias.insert(slugify(&retailer.name), slug.clone());
            for alias in &retailer.aliases {
                by_alias.insert(slugify(alias), slug.clone());
            }
        }
        Self { by_alias }
    }

    /// Resolve any spelling of a retailer to its canonical slug.
    ///
    /// Unknown spellings fall back to their own slug so that two occurrences
    /// of the same unregistered store still compare equal.
    #[must_use]
    pub fn canonicalize(&self, raw: &str) -> String {
        let key = slugify(raw);
        self.by_alias.get(&key).cloned().unwrap_or(key)
    }
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c == ' ' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(entries: &[(&str, &[&str])]) -> RetailerRegistry {
        let file = RetailersFile {
            retailers: entries
                .iter()
                .map(|(name, aliases)| RetailerConfig {
                    name: (*name).to_string(),
                    aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
                })
                .collect(),
        };
        RetailerRegistry::from_file(&file)
    }

    #[test]
    fn slug_simple_name() {
        let retailer = RetailerConfig {
            name: "Whole Foods Market".to_string(),
            aliases: vec![],
        };
        assert_eq!(retailer.slug(), "whole-foods-market");
    }

    #[test]
    fn slug_special_characters() {
        let retailer = RetailerConfig {
            name: "Trader Joe's".to_string(),
            aliases: vec![],
        };
        assert_eq!(retailer.slug(), "trader-joes");
    }

    #[test]
    fn canonicalize_resolves_aliases() {
        let reg = registry(&[("Whole Foods Market", &["WFM", "Whole Foods"])]);
        assert_eq!(reg.canonicalize("WFM"), "whole-foods-market");
        assert_eq!(reg.canonicalize("whole foods"), "whole-foods-market");
        assert_eq!(reg.canonicalize("Whole Foods Market"), "whole-foods-market");
    }

    #[test]
    fn canonicalize_unknown_falls_back_to_own_slug() {
        let reg = registry(&[("Kroger", &[])]);
        assert_eq!(reg.canonicalize("Corner Bodega"), "corner-bodega");
    }

    #[test]
    fn validate_rejects_empty_name() {
        let file = RetailersFile {
            retailers: vec![RetailerConfig {
                name: "  ".to_string(),
                aliases: vec![],
            }],
        };
        let err = validate_retailers(&file).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn validate_rejects_duplicate_slug() {
        let file = RetailersFile {
            retailers: vec![
                RetailerConfig {
                    name: "Whole Foods".to_string(),
                    aliases: vec![],
                },
                RetailerConfig {
                    name: "Whole--Foods".to_string(),
                    aliases: vec![],
                },
            ],
        };
        let err = validate_retailers(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate retailer"));
    }

    #[test]
    fn load_retailers_from_real_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("retailers.yaml");
        assert!(
            path.exists(),
            "retailers.yaml missing at {path:?} — required for this test"
        );
        let result = load_retailers(&path);
        assert!(result.is_ok(), "failed to load retailers.yaml: {result:?}");
        let file = result.unwrap();
        assert!(!file.retailers.is_empty());
    }
}
