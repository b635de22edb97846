//! Graph resolver.
//!
//! Builds a requirement graph from the root requests, splits it into
//! alternative graphs whenever variants leave a choice open, resolves
//! version conflicts inside each candidate, and extracts the surviving
//! nodes as an ordered package list. Alternatives live on a LIFO stack so
//! the combination using the earliest-declared variants is attempted first.

use crate::definition::Definition;
use crate::error::{Result, WizError};
use crate::graph::{Graph, Node, ROOT};
use crate::priority::{PriorityMapping, compute_priority_mapping};
use crate::registry::Registry;
use crate::requirement::Requirement;
use crate::version::Version;
use std::collections::BTreeMap;

/// One resolved package: a definition plus the variant chosen for it.
///
/// Accessors expose the merged view, with the variant fields overlaid on
/// the definition's.
#[derive(Debug, Clone)]
pub struct Package {
    definition: Definition,
    variant: Option<usize>,
}

impl Package {
    pub fn identifier(&self) -> String {
        Node::identifier_for(&self.definition, self.variant)
    }

    pub fn name(&self) -> &str {
        &self.definition.identifier
    }

    pub fn version(&self) -> &Version {
        &self.definition.version
    }

    pub fn variant_name(&self) -> Option<&str> {
        self.definition.variant_name(self.variant)
    }

    pub fn requirements(&self) -> Vec<Requirement> {
        self.definition.merged_requirements(self.variant)
    }

    pub fn constraints(&self) -> Vec<Requirement> {
        self.definition.merged_constraints(self.variant)
    }

    pub fn environ(&self) -> BTreeMap<String, String> {
        self.definition.merged_environ(self.variant)
    }

    pub fn command(&self) -> BTreeMap<String, String> {
        self.definition.merged_command(self.variant)
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }
}

/// Result of conflict resolution on one candidate graph.
enum Outcome {
    /// All conflicts settled; the graph can be extracted.
    Resolved,
    /// Resolving a conflict pulled in new variants; the given alternatives
    /// replace the current graph.
    Divided(Vec<Graph>),
}

pub struct Resolver<'a> {
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry) -> Resolver<'a> {
        Resolver { registry }
    }

    /// Resolve *requests* into an ordered package list.
    ///
    /// Implicit requests from `auto-use` definitions are prepended to the
    /// explicit ones. The output is ordered deepest-dependency first, so
    /// every package appears after its own dependencies.
    pub fn resolve(&self, requests: &[String]) -> Result<Vec<Package>> {
        let mut requirements: Vec<Requirement> = Vec::new();
        for request in self.registry.implicit() {
            requirements.push(request.parse()?);
        }
        for request in requests {
            requirements.push(request.parse()?);
        }

        let mut graph = Graph::new();
        graph.update_from_requests(&requirements, self.registry)?;

        let mut stack = vec![graph];
        while let Some(mut graph) = stack.pop() {
            let priorities = compute_priority_mapping(&graph);

            let divided = divide(&graph, &priorities);
            if !divided.is_empty() {
                stack.extend(divided.into_iter().rev());
                continue;
            }

            match self.resolve_conflicts(&mut graph) {
                Ok(Outcome::Resolved) => {
                    let priorities = compute_priority_mapping(&graph);
                    return Ok(extract_ordered_packages(&graph, &priorities));
                }
                Ok(Outcome::Divided(graphs)) => {
                    stack.extend(graphs.into_iter().rev());
                }
                Err(error) => {
                    // Another alternative may still resolve; the error only
                    // surfaces once every candidate graph failed.
                    if stack.is_empty() {
                        return Err(error);
                    }
                }
            }
        }

        Err(WizError::Internal(String::from(
            "alternative graphs exhausted",
        )))
    }

    /// Settle every version conflict in *graph*, deepest node first.
    fn resolve_conflicts(&self, graph: &mut Graph) -> Result<Outcome> {
        let mut conflicts = graph.conflicts();
        if conflicts.is_empty() {
            return Ok(Outcome::Resolved);
        }

        loop {
            let priorities = compute_priority_mapping(graph);

            // Nodes without a priority cannot be reached from the root
            // anymore; drop them before looking at the conflicts.
            for identifier in graph.node_identifiers() {
                let reachable = priorities
                    .get(&identifier)
                    .is_some_and(|entry| entry.priority.is_some());
                if !reachable {
                    graph.remove_node(&identifier);
                }
            }
            conflicts.retain(|identifier| graph.contains(identifier));

            let Some(identifier) = pop_farthest(&mut conflicts, &priorities) else {
                return Ok(Outcome::Resolved);
            };

            let Some(node) = graph.node(&identifier) else {
                continue;
            };
            let definition_identifier = node.definition().identifier.clone();
            let others: Vec<String> = graph
                .nodes_for_definition(&definition_identifier)
                .into_iter()
                .filter(|other| *other != identifier)
                .collect();

            self.validate_node_requirements(graph, &identifier, &others)?;

            let requirement = combined_requirement(graph, &identifier, &others, &priorities)?;
            let candidates = self.registry.query(&requirement)?;
            let candidate_identifiers: Vec<String> = candidates
                .iter()
                .map(|candidate| Node::identifier_for(&candidate.definition, candidate.variant))
                .collect();

            if candidate_identifiers.contains(&identifier) {
                continue;
            }

            graph.remove_node(&identifier);

            // Identifiers outside the conflicting set mean the combined
            // requirement brings new nodes; grow the graph with them.
            if candidate_identifiers
                .iter()
                .any(|candidate| !others.contains(candidate))
            {
                graph.update_from_requirement(&requirement, self.registry, ROOT, 1)?;

                for conflict in graph.conflicts() {
                    if !conflicts.contains(&conflict) {
                        conflicts.push(conflict);
                    }
                }

                let priorities = compute_priority_mapping(graph);
                let divided = divide(graph, &priorities);
                if !divided.is_empty() {
                    return Ok(Outcome::Divided(divided));
                }
            }
        }
    }

    /// Ensure all pairs of requirements pulling on the conflicting nodes are
    /// mutually satisfiable.
    fn validate_node_requirements(
        &self,
        graph: &Graph,
        identifier: &str,
        others: &[String],
    ) -> Result<()> {
        let Some(node) = graph.node(identifier) else {
            return Ok(());
        };
        let version = node.definition().version.clone();
        let definition_identifier = node.definition().identifier.clone();
        let requirements = requirement_mapping(graph, identifier);

        for other in others {
            let Some(other_node) = graph.node(other) else {
                continue;
            };
            let other_version = other_node.definition().version.clone();
            let other_requirements = requirement_mapping(graph, other);

            let all: Vec<&(Requirement, String)> = requirements
                .iter()
                .chain(other_requirements.iter())
                .collect();

            for (index, (first, first_parent)) in all.iter().enumerate() {
                for (second, second_parent) in &all[index + 1..] {
                    let version_conflict = !second.is_satisfied_by(&version)
                        && !first.is_satisfied_by(&other_version)
                        && version != other_version;
                    let variant_conflict = !first.same_extras(second);

                    if version_conflict || variant_conflict {
                        return Err(WizError::GraphResolution(format!(
                            "a requirement conflict has been detected for \
                             '{definition_identifier}'\n - {first} [from {first_parent}]\n \
                             - {second} [from {second_parent}]"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Pop the conflict farthest from the root: resolving deepest first leaves
/// the most information available for the shallower ones.
fn pop_farthest(conflicts: &mut Vec<String>, priorities: &PriorityMapping) -> Option<String> {
    conflicts.sort_by_key(|identifier| {
        priorities
            .get(identifier)
            .and_then(|entry| entry.priority)
            .unwrap_or(0)
    });
    conflicts.pop()
}

/// Requirements pulling on *identifier*, each with the parent that induced
/// it. Parents no longer live (other than the root) are ignored; duplicate
/// requirements collapse onto the first parent seen.
fn requirement_mapping(graph: &Graph, identifier: &str) -> Vec<(Requirement, String)> {
    let Some(node) = graph.node(identifier) else {
        return Vec::new();
    };

    let mut mapping: Vec<(Requirement, String)> = Vec::new();
    for parent in node.parents() {
        if parent != ROOT && !graph.contains(parent) {
            continue;
        }
        if let Some(link) = graph.link(parent, identifier) {
            if !mapping
                .iter()
                .any(|(requirement, _)| requirement == link.requirement())
            {
                mapping.push((link.requirement().clone(), parent.clone()));
            }
        }
    }
    mapping
}

/// Intersect the requirements recorded on the priority-parent links of the
/// conflicting nodes into a single combined requirement.
fn combined_requirement(
    graph: &Graph,
    identifier: &str,
    others: &[String],
    priorities: &PriorityMapping,
) -> Result<Requirement> {
    let mut combined: Option<Requirement> = None;

    for node in std::iter::once(identifier).chain(others.iter().map(String::as_str)) {
        let parent = priorities
            .get(node)
            .and_then(|entry| entry.parent.clone())
            .ok_or_else(|| WizError::Internal(format!("no recorded parent for '{node}'")))?;
        let link = graph
            .link(&parent, node)
            .ok_or_else(|| WizError::Internal(format!("no link from '{parent}' to '{node}'")))?;
        let requirement = link.requirement();

        match combined.as_mut() {
            None => combined = Some(requirement.clone()),
            Some(combined) => {
                if combined.name != requirement.name {
                    return Err(WizError::Internal(format!(
                        "impossible to combine requirements with different names \
                         ['{}' and '{}']",
                        combined.name, requirement.name
                    )));
                }
                combined.specifiers.intersect(&requirement.specifiers);
            }
        }
    }

    combined.ok_or_else(|| WizError::Internal(String::from("no requirements to combine")))
}

/// Split *graph* into one alternative per combination of variant choices.
///
/// Groups nearest to the root are expanded first and the declared variant
/// order is preserved inside each group, so the returned list goes from the
/// most to the least preferred combination.
fn divide(graph: &Graph, priorities: &PriorityMapping) -> Vec<Graph> {
    let mut groups = graph.variant_groups();
    if groups.is_empty() {
        return Vec::new();
    }

    groups.sort_by_key(|group| {
        group
            .iter()
            .filter_map(|identifier| priorities.get(identifier).and_then(|entry| entry.priority))
            .min()
    });

    let mut combinations = vec![graph.clone()];
    for group in &groups {
        let mut divided = Vec::new();
        for base in &combinations {
            for chosen in group {
                let mut alternative = base.clone();
                for other in group {
                    if other != chosen {
                        alternative.remove_node(other);
                    }
                }
                divided.push(alternative);
            }
        }
        combinations = divided;
    }

    for combination in &mut combinations {
        combination.reset_variant_groups();
    }
    combinations
}

/// Emit the live packages ordered by decreasing priority (deepest
/// dependency first), ties broken by node creation order.
fn extract_ordered_packages(graph: &Graph, priorities: &PriorityMapping) -> Vec<Package> {
    let mut reachable: Vec<(&Node, u64)> = graph
        .nodes()
        .filter_map(|node| {
            priorities
                .get(node.identifier())
                .and_then(|entry| entry.priority)
                .map(|priority| (node, priority))
        })
        .collect();

    reachable.sort_by(|(left, left_priority), (right, right_priority)| {
        right_priority
            .cmp(left_priority)
            .then_with(|| left.order().cmp(&right.order()))
    });

    reachable
        .into_iter()
        .map(|(node, _)| Package {
            definition: node.definition().clone(),
            variant: node.variant(),
        })
        .collect()
}
