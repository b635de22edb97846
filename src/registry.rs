//! In-memory definition registry.
//!
//! Two indexes are built from the discovered definitions: packages grouped
//! by identifier then version, and command aliases mapped back to the
//! identifier providing them. Definitions flagged `auto-use` additionally
//! contribute implicit package requests.

use crate::definition::{self, Definition};
use crate::error::{Result, WizError};
use crate::requirement::Requirement;
use crate::version::UNKNOWN_VALUE;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One definition picked by a query, with the variant chosen for it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub definition: Definition,
    pub variant: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Registry {
    packages: BTreeMap<String, BTreeMap<String, Definition>>,
    commands: BTreeMap<String, String>,
    implicit: Vec<String>,
}

impl Registry {
    /// Discover definitions under *paths* and build the registry indexes.
    ///
    /// When *requests* is non-empty, only definitions whose identifier or
    /// description contains one of the requested names (case-insensitive)
    /// and whose version satisfies every request's specifiers are kept.
    pub fn fetch(paths: &[PathBuf], requests: &[Requirement], max_depth: Option<usize>) -> Registry {
        let mut definitions = definition::discover(paths, max_depth);

        if !requests.is_empty() {
            definitions.retain(|definition| {
                let identifier = definition.identifier.to_lowercase();
                let description = definition.description().to_lowercase();
                let named = requests.iter().any(|request| {
                    let name = request.name.to_lowercase();
                    identifier.contains(&name) || description.contains(&name)
                });
                named
                    && requests
                        .iter()
                        .all(|request| request.is_satisfied_by(&definition.version))
            });
        }

        Registry::from_definitions(definitions)
    }

    /// Build the indexes from already-loaded definitions, in discovery order.
    pub fn from_definitions(definitions: Vec<Definition>) -> Registry {
        let mut registry = Registry::default();

        // Latest auto-use definition per identifier, first-seen order.
        let mut implicit_order: Vec<String> = Vec::new();
        let mut implicit_best: BTreeMap<String, Definition> = BTreeMap::new();

        for definition in definitions {
            for alias in definition.command.keys() {
                registry
                    .commands
                    .insert(alias.clone(), definition.identifier.clone());
            }

            if definition.auto_use {
                let replace = match implicit_best.get(&definition.identifier) {
                    Some(existing) => {
                        definition.version.partial_cmp(&existing.version)
                            == Some(Ordering::Greater)
                    }
                    None => {
                        implicit_order.push(definition.identifier.clone());
                        true
                    }
                };
                if replace {
                    implicit_best.insert(definition.identifier.clone(), definition.clone());
                }
            }

            registry
                .packages
                .entry(definition.identifier.clone())
                .or_default()
                .insert(definition.version.to_string(), definition);
        }

        registry.implicit = implicit_order
            .iter()
            .map(|identifier| {
                let best = &implicit_best[identifier];
                if best.version.is_unknown() {
                    identifier.clone()
                } else {
                    format!("{}=={}", identifier, best.version)
                }
            })
            .collect();

        registry
    }

    /// Best-matching definition for *requirement*: the highest version whose
    /// version satisfies the specifier set, expanded into one candidate per
    /// selectable variant.
    pub fn query(&self, requirement: &Requirement) -> Result<Vec<Candidate>> {
        let versions = self
            .packages
            .get(&requirement.name)
            .ok_or_else(|| WizError::RequestNotFound(requirement.to_string()))?;

        if versions.contains_key(UNKNOWN_VALUE) && versions.len() > 1 {
            return Err(WizError::RequestNotFound(format!(
                "'{}' mixes unknown and concrete versions",
                requirement.name
            )));
        }

        let mut ordered: Vec<&Definition> = versions.values().collect();
        ordered.sort_by(|left, right| {
            right
                .version
                .partial_cmp(&left.version)
                .unwrap_or(Ordering::Equal)
        });

        let definition = ordered
            .into_iter()
            .find(|definition| requirement.is_satisfied_by(&definition.version))
            .ok_or_else(|| WizError::RequestNotFound(requirement.to_string()))?;

        if definition.variants.is_empty() {
            return Ok(vec![Candidate {
                definition: definition.clone(),
                variant: None,
            }]);
        }

        if let Some(extra) = requirement.extras.first() {
            let index = definition.variant_index(extra).ok_or_else(|| {
                WizError::RequestNotFound(format!(
                    "variant '{}' of '{}'",
                    extra, requirement.name
                ))
            })?;
            return Ok(vec![Candidate {
                definition: definition.clone(),
                variant: Some(index),
            }]);
        }

        Ok((0..definition.variants.len())
            .map(|index| Candidate {
                definition: definition.clone(),
                variant: Some(index),
            })
            .collect())
    }

    /// Identifier providing the given command alias, if any.
    pub fn command_identifier(&self, alias: &str) -> Option<&str> {
        self.commands.get(alias).map(String::as_str)
    }

    pub fn commands(&self) -> &BTreeMap<String, String> {
        &self.commands
    }

    /// Implicit package requests contributed by `auto-use` definitions.
    pub fn implicit(&self) -> &[String] {
        &self.implicit
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate definitions grouped by identifier, versions in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Definition>)> {
        self.packages
            .iter()
            .map(|(identifier, versions)| (identifier.as_str(), versions))
    }
}

/// Write *definition* as `{identifier}[-{version}].json` under *directory*.
pub fn export(directory: &Path, definition: &Definition, overwrite: bool) -> Result<PathBuf> {
    let target = directory.join(definition.file_name());
    if target.exists() && !overwrite {
        return Err(WizError::FileExists(target));
    }
    fs::write(&target, definition.encode()?)?;
    Ok(target)
}

/// Fallback registry location when neither `--path` nor the environment
/// provides one.
pub fn default_paths() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| vec![home.join(".wiz").join("registry")])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(content: serde_json::Value) -> Definition {
        serde_json::from_value(content).unwrap()
    }

    fn request(input: &str) -> Requirement {
        input.parse().unwrap()
    }

    fn sample_registry() -> Registry {
        Registry::from_definitions(vec![
            definition(serde_json::json!({"identifier": "app", "version": "1.0.0"})),
            definition(serde_json::json!({"identifier": "app", "version": "2.3.0"})),
            definition(serde_json::json!({"identifier": "app", "version": "2.0.0"})),
        ])
    }

    #[test]
    fn query_returns_the_highest_matching_version() {
        let registry = sample_registry();
        let candidates = registry.query(&request("app")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].definition.version.to_string(), "2.3.0");

        let candidates = registry.query(&request("app<2.3")).unwrap();
        assert_eq!(candidates[0].definition.version.to_string(), "2.0.0");
    }

    #[test]
    fn query_fails_for_unknown_name_or_version() {
        let registry = sample_registry();
        assert!(matches!(
            registry.query(&request("missing")),
            Err(WizError::RequestNotFound(_))
        ));
        assert!(matches!(
            registry.query(&request("app>=3")),
            Err(WizError::RequestNotFound(_))
        ));
    }

    #[test]
    fn query_rejects_mixed_unknown_and_concrete_versions() {
        let registry = Registry::from_definitions(vec![
            definition(serde_json::json!({"identifier": "app"})),
            definition(serde_json::json!({"identifier": "app", "version": "1.0.0"})),
        ]);
        let error = registry.query(&request("app")).unwrap_err();
        assert!(error.to_string().contains("mixes unknown and concrete"));
    }

    #[test]
    fn query_expands_variants_in_declared_order() {
        let registry = Registry::from_definitions(vec![definition(serde_json::json!({
            "identifier": "app",
            "version": "1.0.0",
            "variants": [{"identifier": "v2"}, {"identifier": "v1"}]
        }))]);

        let candidates = registry.query(&request("app")).unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|candidate| candidate.definition.variant_name(candidate.variant).unwrap())
            .collect();
        assert_eq!(names, vec!["v2", "v1"]);

        let candidates = registry.query(&request("app[v1]")).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].variant, Some(1));

        assert!(matches!(
            registry.query(&request("app[v3]")),
            Err(WizError::RequestNotFound(_))
        ));
    }

    #[test]
    fn implicit_requests_pin_the_latest_auto_use_version() {
        let registry = Registry::from_definitions(vec![
            definition(serde_json::json!({
                "identifier": "studio", "version": "1.0.0", "auto-use": true
            })),
            definition(serde_json::json!({
                "identifier": "studio", "version": "1.5.0", "auto-use": true
            })),
            definition(serde_json::json!({
                "identifier": "studio", "version": "2.0.0"
            })),
        ]);
        assert_eq!(registry.implicit(), ["studio==1.5.0"]);
    }

    #[test]
    fn commands_map_back_to_identifiers() {
        let registry = Registry::from_definitions(vec![definition(serde_json::json!({
            "identifier": "nuke",
            "version": "11.0.0",
            "command": {"nuke": "Nuke11.0", "nukex": "Nuke11.0 --nukex"}
        }))]);
        assert_eq!(registry.command_identifier("nukex"), Some("nuke"));
        assert_eq!(registry.command_identifier("missing"), None);
    }
}
