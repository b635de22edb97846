//! Package definition model.
//!
//! A definition is a declarative record describing one package version: its
//! identity, environment contributions, commands, requirements and variants.
//! Definitions are immutable once constructed; selecting a variant never
//! mutates or deep-copies the record, the effective view is computed on
//! demand by the `merged_*` accessors.

use crate::error::{Result, WizError};
use crate::requirement::Requirement;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Named alternative configuration of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub command: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environ: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Requirement>,
}

/// Environment definition record.
///
/// Field order is the canonical serialization order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Version::is_unknown")]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(
        rename = "definition-location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub definition_location: Option<PathBuf>,
    #[serde(
        rename = "install-location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub install_location: Option<String>,
    #[serde(rename = "auto-use", default, skip_serializing_if = "is_false")]
    pub auto_use: bool,
    #[serde(default, skip_serializing)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub system: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub command: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environ: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
    /// Side-table for keys the schema does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Definition {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("unknown")
    }

    pub fn variant(&self, index: usize) -> Option<&Variant> {
        self.variants.get(index)
    }

    pub fn variant_index(&self, identifier: &str) -> Option<usize> {
        self.variants
            .iter()
            .position(|variant| variant.identifier == identifier)
    }

    pub fn variant_name(&self, index: Option<usize>) -> Option<&str> {
        index
            .and_then(|index| self.variants.get(index))
            .map(|variant| variant.identifier.as_str())
    }

    /// Definition requirements followed by the variant's.
    pub fn merged_requirements(&self, variant: Option<usize>) -> Vec<Requirement> {
        let mut requirements = self.requirements.clone();
        if let Some(variant) = variant.and_then(|index| self.variants.get(index)) {
            requirements.extend(variant.requirements.iter().cloned());
        }
        requirements
    }

    pub fn merged_constraints(&self, variant: Option<usize>) -> Vec<Requirement> {
        let mut constraints = self.constraints.clone();
        if let Some(variant) = variant.and_then(|index| self.variants.get(index)) {
            constraints.extend(variant.constraints.iter().cloned());
        }
        constraints
    }

    /// The variant value wins on alias collision.
    pub fn merged_command(&self, variant: Option<usize>) -> BTreeMap<String, String> {
        let mut command = self.command.clone();
        if let Some(variant) = variant.and_then(|index| self.variants.get(index)) {
            for (alias, value) in &variant.command {
                command.insert(alias.clone(), value.clone());
            }
        }
        command
    }

    /// The variant value wins, except that `${NAME}` references within it are
    /// substituted from the definition's environ, so a variant can extend a
    /// variable instead of clobbering it:
    ///
    /// definition `PATH=/base`, variant `PATH=/extra:${PATH}` gives
    /// `PATH=/extra:/base`.
    pub fn merged_environ(&self, variant: Option<usize>) -> BTreeMap<String, String> {
        let mut environ = self.environ.clone();
        if let Some(variant) = variant.and_then(|index| self.variants.get(index)) {
            for (name, value) in &variant.environ {
                environ.insert(name.clone(), substitute(value, &self.environ));
            }
        }
        environ
    }

    /// Target file name for `export`: `{identifier}[-{version}].json`.
    pub fn file_name(&self) -> String {
        if self.version.is_unknown() {
            format!("{}.json", self.identifier)
        } else {
            format!("{}-{}.json", self.identifier, self.version)
        }
    }

    /// Serialize with canonical key order and 4-space indentation.
    pub fn encode(&self) -> Result<String> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)
            .map_err(|error| WizError::Internal(format!("definition encoding failed: {error}")))?;
        String::from_utf8(buffer)
            .map_err(|error| WizError::Internal(format!("definition encoding failed: {error}")))
    }

    /// JSON value form, for structural comparison.
    pub fn to_mapping(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|error| WizError::Internal(format!("definition encoding failed: {error}")))
    }

    fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(WizError::IncorrectDefinition {
                identifier: String::from("<unnamed>"),
                reason: String::from("identifier must not be empty"),
            });
        }
        let mut seen = Vec::new();
        for variant in &self.variants {
            if variant.identifier.is_empty() {
                return Err(WizError::IncorrectDefinition {
                    identifier: self.identifier.clone(),
                    reason: String::from("variant identifier must not be empty"),
                });
            }
            if seen.contains(&&variant.identifier) {
                return Err(WizError::IncorrectDefinition {
                    identifier: self.identifier.clone(),
                    reason: format!("duplicate variant '{}'", variant.identifier),
                });
            }
            seen.push(&variant.identifier);
        }
        Ok(())
    }
}

/// Replace `${NAME}` references from *environ*; unmatched references are
/// left untouched.
fn substitute(value: &str, environ: &BTreeMap<String, String>) -> String {
    let mut result = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(offset) => {
                let end = start + 2 + offset;
                let name = &rest[start + 2..end];
                match environ.get(name) {
                    Some(replacement) => result.push_str(replacement),
                    None => result.push_str(&rest[start..=end]),
                }
                rest = &rest[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Load a definition file, recording where it came from.
pub fn load(path: &Path) -> Result<Definition> {
    let content = fs::read_to_string(path)?;
    let mut definition: Definition =
        serde_json::from_str(&content).map_err(|error| WizError::IncorrectDefinition {
            identifier: path.display().to_string(),
            reason: error.to_string(),
        })?;
    definition.validate()?;
    definition.definition_location = Some(path.to_path_buf());
    Ok(definition)
}

/// Discover definition files under *paths*, up to *max_depth* (0 searches
/// only directly under each path, `None` searches the whole sub-tree).
///
/// Unreadable or invalid files and `disabled` definitions are reported on
/// stderr and skipped; discovery itself never fails.
pub fn discover(paths: &[PathBuf], max_depth: Option<usize>) -> Vec<Definition> {
    let mut definitions = Vec::new();

    for root in paths {
        let root = match fs::canonicalize(root) {
            Ok(root) => root,
            Err(_) => continue,
        };
        let mut files = Vec::new();
        collect_files(&root, 0, max_depth, &mut files);

        for file in files {
            let mut definition = match load(&file) {
                Ok(definition) => definition,
                Err(error) => {
                    eprintln!("warning: skipping {}: {}", file.display(), error);
                    continue;
                }
            };
            if definition.disabled {
                eprintln!(
                    "warning: skipping disabled definition '{}' from {}",
                    definition.identifier,
                    file.display()
                );
                continue;
            }
            definition.registry = Some(root.display().to_string());
            definitions.push(definition);
        }
    }

    definitions
}

fn collect_files(dir: &Path, depth: usize, max_depth: Option<usize>, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            eprintln!("warning: cannot read {}: {}", dir.display(), error);
            return;
        }
    };
    // Sorted traversal keeps discovery order stable across platforms.
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            if max_depth.is_none_or(|limit| depth < limit) {
                collect_files(&path, depth + 1, max_depth, files);
            }
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
}
