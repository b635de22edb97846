//! Requirement graph.
//!
//! Nodes are concrete definition versions (with a variant chosen when the
//! definition has any); edges carry the requirement that induced them and a
//! positional weight. Node removal is lazy: only the live node map shrinks,
//! links and per-definition indexes are kept, so every traversal filters
//! against the live map.

use crate::definition::Definition;
use crate::error::{Result, WizError};
use crate::registry::Registry;
use crate::requirement::Requirement;
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of the synthetic root every request hangs from.
pub const ROOT: &str = "root";

/// A definition version in the graph, with the chosen variant if any.
#[derive(Debug, Clone)]
pub struct Node {
    identifier: String,
    definition: Definition,
    variant: Option<usize>,
    parents: BTreeSet<String>,
    order: usize,
}

impl Node {
    /// Canonical node identifier: `name[variant]==version`, the variant
    /// segment omitted when the definition has none.
    pub fn identifier_for(definition: &Definition, variant: Option<usize>) -> String {
        match definition.variant_name(variant) {
            Some(name) => format!(
                "{}[{}]=={}",
                definition.identifier, name, definition.version
            ),
            None => format!("{}=={}", definition.identifier, definition.version),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn variant(&self) -> Option<usize> {
        self.variant
    }

    pub fn parents(&self) -> &BTreeSet<String> {
        &self.parents
    }

    /// Creation sequence number, used for deterministic tie-breaks.
    pub fn order(&self) -> usize {
        self.order
    }
}

/// Weighted, requirement-labeled edge. The lower the weight, the more
/// important the dependency link.
#[derive(Debug, Clone)]
pub struct Link {
    requirement: Requirement,
    weight: u64,
}

impl Link {
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Live nodes only; lazily removed entries disappear from here first.
    nodes: BTreeMap<String, Node>,
    /// Node identifiers per definition identifier, never pruned.
    definitions: BTreeMap<String, BTreeSet<String>>,
    /// Sibling nodes produced when one requirement matched several variants.
    variant_groups: Vec<Vec<String>>,
    /// Outgoing links per parent, in creation order.
    links: BTreeMap<String, Vec<(String, Link)>>,
    next_order: usize,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Seed the graph from ordered top-level *requirements*; the first
    /// request gets weight 1, the most important.
    pub fn update_from_requests(
        &mut self,
        requirements: &[Requirement],
        registry: &Registry,
    ) -> Result<()> {
        for (index, requirement) in requirements.iter().enumerate() {
            self.update_from_requirement(requirement, registry, ROOT, index as u64 + 1)?;
        }
        Ok(())
    }

    /// Resolve *requirement* against *registry* and grow the graph with the
    /// resulting nodes, recursing into the requirements of every node seen
    /// for the first time.
    pub fn update_from_requirement(
        &mut self,
        requirement: &Requirement,
        registry: &Registry,
        parent: &str,
        weight: u64,
    ) -> Result<()> {
        let candidates = registry.query(requirement)?;
        let identifiers: Vec<String> = candidates
            .iter()
            .map(|candidate| Node::identifier_for(&candidate.definition, candidate.variant))
            .collect();

        if identifiers.len() > 1 {
            self.record_variant_group(identifiers.clone());
        }

        for (candidate, identifier) in candidates.into_iter().zip(identifiers) {
            let definition_identifier = candidate.definition.identifier.clone();

            if !self.nodes.contains_key(&identifier) {
                let requirements = candidate
                    .definition
                    .merged_requirements(candidate.variant);
                let node = Node {
                    identifier: identifier.clone(),
                    definition: candidate.definition,
                    variant: candidate.variant,
                    parents: BTreeSet::new(),
                    order: self.next_order,
                };
                self.next_order += 1;
                self.nodes.insert(identifier.clone(), node);

                for (index, child) in requirements.iter().enumerate() {
                    self.update_from_requirement(child, registry, &identifier, index as u64 + 1)?;
                }
            }

            self.definitions
                .entry(definition_identifier)
                .or_default()
                .insert(identifier.clone());
            if let Some(node) = self.nodes.get_mut(&identifier) {
                node.parents.insert(parent.to_string());
            }
            self.create_link(parent, &identifier, requirement, weight)?;
        }

        Ok(())
    }

    fn record_variant_group(&mut self, group: Vec<String>) {
        if !self.variant_groups.contains(&group) {
            self.variant_groups.push(group);
        }
    }

    fn create_link(
        &mut self,
        parent: &str,
        child: &str,
        requirement: &Requirement,
        weight: u64,
    ) -> Result<()> {
        let children = self.links.entry(parent.to_string()).or_default();
        if children.iter().any(|(existing, _)| existing == child) {
            return Err(WizError::IncorrectDefinition {
                identifier: child.to_string(),
                reason: format!("several dependency links from '{parent}'"),
            });
        }
        children.push((
            child.to_string(),
            Link {
                requirement: requirement.clone(),
                weight,
            },
        ));
        Ok(())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.nodes.contains_key(identifier)
    }

    pub fn node(&self, identifier: &str) -> Option<&Node> {
        self.nodes.get(identifier)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_identifiers(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Live node identifiers sharing *definition_identifier*.
    pub fn nodes_for_definition(&self, definition_identifier: &str) -> Vec<String> {
        self.definitions
            .get(definition_identifier)
            .map(|identifiers| {
                identifiers
                    .iter()
                    .filter(|identifier| self.contains(identifier))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lazy removal: the node leaves the live map, links stay behind.
    pub fn remove_node(&mut self, identifier: &str) {
        self.nodes.remove(identifier);
    }

    /// Live children of *identifier*, in link creation order.
    pub fn outgoing(&self, identifier: &str) -> Vec<&str> {
        self.links
            .get(identifier)
            .map(|children| {
                children
                    .iter()
                    .filter(|(child, _)| self.contains(child))
                    .map(|(child, _)| child.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn link(&self, parent: &str, child: &str) -> Option<&Link> {
        self.links
            .get(parent)?
            .iter()
            .find(|(existing, _)| existing == child)
            .map(|(_, link)| link)
    }

    /// Identifiers of nodes whose definition currently has several live
    /// versions or variants in the graph.
    pub fn conflicts(&self) -> Vec<String> {
        let mut conflicted = Vec::new();
        for identifiers in self.definitions.values() {
            let live: Vec<&String> = identifiers
                .iter()
                .filter(|identifier| self.contains(identifier))
                .collect();
            if live.len() > 1 {
                conflicted.extend(live.into_iter().cloned());
            }
        }
        conflicted
    }

    /// Recorded variant groups whose members are all still live.
    pub fn variant_groups(&self) -> Vec<Vec<String>> {
        self.variant_groups
            .iter()
            .filter(|group| group.iter().all(|identifier| self.contains(identifier)))
            .cloned()
            .collect()
    }

    pub fn reset_variant_groups(&mut self) {
        self.variant_groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(definitions: serde_json::Value) -> Registry {
        let definitions: Vec<Definition> = serde_json::from_value(definitions).unwrap();
        Registry::from_definitions(definitions)
    }

    fn request(input: &str) -> Requirement {
        input.parse().unwrap()
    }

    #[test]
    fn grows_transitively_from_requests() {
        let registry = registry(serde_json::json!([
            {"identifier": "app", "version": "1.0.0", "requirements": ["lib>=1"]},
            {"identifier": "lib", "version": "1.2.0"}
        ]));
        let mut graph = Graph::new();
        graph
            .update_from_requests(&[request("app")], &registry)
            .unwrap();

        assert!(graph.contains("app==1.0.0"));
        assert!(graph.contains("lib==1.2.0"));
        assert_eq!(graph.outgoing(ROOT), vec!["app==1.0.0"]);
        assert_eq!(graph.outgoing("app==1.0.0"), vec!["lib==1.2.0"]);

        let link = graph.link("app==1.0.0", "lib==1.2.0").unwrap();
        assert_eq!(link.weight(), 1);
        assert_eq!(link.requirement().to_string(), "lib>=1");
    }

    #[test]
    fn duplicate_links_are_rejected() {
        let registry = registry(serde_json::json!([
            {"identifier": "app", "version": "1.0.0", "requirements": ["lib", "lib>=1"]},
            {"identifier": "lib", "version": "1.0.0"}
        ]));
        let mut graph = Graph::new();
        let error = graph
            .update_from_requests(&[request("app")], &registry)
            .unwrap_err();
        assert!(matches!(error, WizError::IncorrectDefinition { .. }));
    }

    #[test]
    fn conflicts_report_definitions_with_several_live_nodes() {
        let registry = registry(serde_json::json!([
            {"identifier": "app", "version": "1.0.0", "requirements": ["lib==1"]},
            {"identifier": "tool", "version": "1.0.0", "requirements": ["lib==2"]},
            {"identifier": "lib", "version": "1.0.0"},
            {"identifier": "lib", "version": "2.0.0"}
        ]));
        let mut graph = Graph::new();
        graph
            .update_from_requests(&[request("app"), request("tool")], &registry)
            .unwrap();

        let mut conflicts = graph.conflicts();
        conflicts.sort();
        assert_eq!(conflicts, vec!["lib==1.0.0", "lib==2.0.0"]);

        graph.remove_node("lib==2.0.0");
        assert!(graph.conflicts().is_empty());
        assert_eq!(graph.outgoing("tool==1.0.0"), Vec::<&str>::new());
    }

    #[test]
    fn variant_groups_track_live_members() {
        let registry = registry(serde_json::json!([
            {
                "identifier": "app",
                "version": "1.0.0",
                "variants": [{"identifier": "v1"}, {"identifier": "v2"}]
            }
        ]));
        let mut graph = Graph::new();
        graph
            .update_from_requests(&[request("app")], &registry)
            .unwrap();

        assert_eq!(
            graph.variant_groups(),
            vec![vec![
                "app[v1]==1.0.0".to_string(),
                "app[v2]==1.0.0".to_string()
            ]]
        );

        graph.remove_node("app[v2]==1.0.0");
        assert!(graph.variant_groups().is_empty());
    }
}
