//! Node priorities.
//!
//! The priority of a node is its weighted distance from the synthetic root,
//! keeping the *longest* recorded path when several exist. Deeper nodes get
//! larger priorities, which is exactly what ordered extraction relies on:
//! dependencies must land before their dependents.

use crate::graph::{Graph, ROOT};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Priority and chosen parent for one node; `None` marks a node that cannot
/// be reached from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePriority {
    pub priority: Option<u64>,
    pub parent: Option<String>,
}

impl NodePriority {
    fn unreachable() -> NodePriority {
        NodePriority {
            priority: None,
            parent: None,
        }
    }
}

pub type PriorityMapping = BTreeMap<String, NodePriority>;

/// Priority queue whose entries can be re-prioritized in place.
///
/// Updates leave stale pairs in the heap; `pop_smallest` skips entries whose
/// recorded priority no longer matches, and the heap is rebuilt whenever it
/// grows past twice the number of live entries.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    priorities: HashMap<String, u64>,
    heap: BinaryHeap<Reverse<(u64, usize, String)>>,
    sequence: usize,
}

impl PriorityQueue {
    pub fn set(&mut self, identifier: &str, priority: u64) {
        self.priorities.insert(identifier.to_string(), priority);
        if self.heap.len() < 2 * self.priorities.len() {
            self.heap
                .push(Reverse((priority, self.sequence, identifier.to_string())));
            self.sequence += 1;
        } else {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        let mut entries: Vec<(&String, &u64)> = self.priorities.iter().collect();
        entries.sort();
        self.heap = entries
            .into_iter()
            .map(|(identifier, priority)| {
                let entry = Reverse((*priority, self.sequence, identifier.clone()));
                self.sequence += 1;
                entry
            })
            .collect();
    }

    /// Pop the entry with the smallest priority; equal priorities come out
    /// in insertion order.
    pub fn pop_smallest(&mut self) -> Option<String> {
        while let Some(Reverse((priority, _, identifier))) = self.heap.pop() {
            if self.priorities.get(&identifier) == Some(&priority) {
                self.priorities.remove(&identifier);
                return Some(identifier);
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }
}

/// Compute the priority and parent of every node in *graph*.
///
/// Traversal starts from the root with priority 0 and relaxes links the
/// Dijkstra way, except that a recorded priority is replaced when the new
/// candidate is *larger*. When two paths produce the same priority the
/// first-created link wins.
pub fn compute_priority_mapping(graph: &Graph) -> PriorityMapping {
    let mut mapping: PriorityMapping = graph
        .node_identifiers()
        .into_iter()
        .map(|identifier| (identifier, NodePriority::unreachable()))
        .collect();
    mapping.insert(
        ROOT.to_string(),
        NodePriority {
            priority: Some(0),
            parent: Some(ROOT.to_string()),
        },
    );

    let mut queue = PriorityQueue::default();
    queue.set(ROOT, 0);

    while let Some(identifier) = queue.pop_smallest() {
        let current = match mapping.get(&identifier).and_then(|entry| entry.priority) {
            Some(current) => current,
            None => continue,
        };

        for child in graph.outgoing(&identifier) {
            let weight = match graph.link(&identifier, child) {
                Some(link) => link.weight(),
                None => continue,
            };
            let priority = current + weight;
            let last = mapping.get(child).and_then(|entry| entry.priority);

            if last.is_none_or(|last| last < priority) {
                mapping.insert(
                    child.to_string(),
                    NodePriority {
                        priority: Some(priority),
                        parent: Some(identifier.clone()),
                    },
                );
                queue.set(child, priority);
            }
        }
    }

    mapping
}
