//! The action graph and its activation-time validation.
//!
//! Actions link to each other by id (`next_action_id`, branch yes/no
//! edges), so the graph is stored as a flat action list and indexed into a
//! map. petgraph is used only for validation: reachability from trigger
//! entry points and cycle analysis.

use crate::action::{Action, ActionId};
use crate::error::ValidationError;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The action graph of one automation.
///
/// Serialized as the flat action list; the id index is rebuilt on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Action>", into = "Vec<Action>")]
pub struct ActionGraph {
    actions: HashMap<ActionId, Action>,
    /// Insertion order, so serialization is stable.
    order: Vec<ActionId>,
}

impl ActionGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds an action to the graph, returning its id.
    ///
    /// Re-inserting an existing id replaces the action in place.
    pub fn insert(&mut self, action: Action) -> ActionId {
        let id = action.id;
        if self.actions.insert(id, action).is_none() {
            self.order.push(id);
        }
        id
    }

    /// Returns the action with the given id, if any.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(&id)
    }

    /// Returns all actions in insertion order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.order.iter().filter_map(|id| self.actions.get(id))
    }

    /// Returns the number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if the graph has no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Validates the graph against the given trigger entry points.
    ///
    /// Checks, in order:
    /// - every successor reference resolves to an action in the graph
    /// - every entry id resolves
    /// - every cycle contains at least one wait action
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self, entry_ids: &[ActionId]) -> Result<(), ValidationError> {
        for action in self.actions() {
            for target in action.successor_ids() {
                if !self.actions.contains_key(&target) {
                    return Err(ValidationError::DanglingReference {
                        action_id: action.id,
                        target,
                    });
                }
            }
        }

        for &entry in entry_ids {
            if !self.actions.contains_key(&entry) {
                return Err(ValidationError::EntryActionMissing { action_id: entry });
            }
        }

        self.check_cycles()
    }

    /// Rejects cycles that contain no wait action.
    fn check_cycles(&self) -> Result<(), ValidationError> {
        let (graph, _) = self.build_petgraph();

        for component in petgraph::algo::tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| graph.find_edge(idx, idx).is_some());
            if !is_cycle {
                continue;
            }

            let action_ids: Vec<ActionId> = component
                .iter()
                .filter_map(|idx| graph.node_weight(*idx).copied())
                .collect();

            let has_wait = action_ids
                .iter()
                .filter_map(|id| self.actions.get(id))
                .any(Action::is_wait);

            if !has_wait {
                return Err(ValidationError::CycleWithoutWait { action_ids });
            }
        }

        Ok(())
    }

    /// Returns actions not reachable from any entry point.
    ///
    /// Unreachable actions are legal (they never run) but worth warning
    /// about when an automation is activated.
    #[must_use]
    pub fn unreachable_from(&self, entry_ids: &[ActionId]) -> Vec<ActionId> {
        let mut visited: HashSet<ActionId> = HashSet::new();
        let mut to_visit: Vec<ActionId> = entry_ids
            .iter()
            .copied()
            .filter(|id| self.actions.contains_key(id))
            .collect();

        while let Some(id) = to_visit.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(action) = self.actions.get(&id) {
                for successor in action.successor_ids() {
                    if self.actions.contains_key(&successor) {
                        to_visit.push(successor);
                    }
                }
            }
        }

        self.order
            .iter()
            .copied()
            .filter(|id| !visited.contains(id))
            .collect()
    }

    fn build_petgraph(&self) -> (DiGraph<ActionId, ()>, HashMap<ActionId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for id in &self.order {
            let idx = graph.add_node(*id);
            index_of.insert(*id, idx);
        }

        for action in self.actions() {
            let Some(&source) = index_of.get(&action.id) else {
                continue;
            };
            for successor in action.successor_ids() {
                if let Some(&target) = index_of.get(&successor) {
                    graph.add_edge(source, target, ());
                }
            }
        }

        (graph, index_of)
    }
}

impl Default for ActionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Action>> for ActionGraph {
    fn from(actions: Vec<Action>) -> Self {
        let mut graph = Self::new();
        for action in actions {
            graph.insert(action);
        }
        graph
    }
}

impl From<ActionGraph> for Vec<Action> {
    fn from(graph: ActionGraph) -> Self {
        let ActionGraph { mut actions, order } = graph;
        order
            .into_iter()
            .filter_map(|id| actions.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, WaitDelay, WaitUnit};

    fn wait_action(name: &str) -> Action {
        Action::new(
            name,
            ActionKind::Wait {
                delay: WaitDelay::new(1, WaitUnit::Hour),
            },
        )
    }

    fn branch_action(name: &str, yes: Option<ActionId>, no: Option<ActionId>) -> Action {
        Action::new(
            name,
            ActionKind::Branch {
                segment_id: None,
                condition: None,
                yes_action_id: yes,
                no_action_id: no,
            },
        )
    }

    #[test]
    fn insert_and_get() {
        let mut graph = ActionGraph::new();
        let action = wait_action("Wait");
        let id = action.id;
        graph.insert(action);

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get(id).map(|a| a.name.as_str()), Some("Wait"));
    }

    #[test]
    fn validate_accepts_linear_chain() {
        let mut graph = ActionGraph::new();
        let b = wait_action("B");
        let b_id = b.id;
        let a = wait_action("A").with_next(b_id);
        let a_id = a.id;
        graph.insert(a);
        graph.insert(b);

        assert!(graph.validate(&[a_id]).is_ok());
    }

    #[test]
    fn validate_rejects_dangling_next() {
        let mut graph = ActionGraph::new();
        let a = wait_action("A").with_next(ActionId::new());
        let a_id = a.id;
        graph.insert(a);

        let result = graph.validate(&[a_id]);
        assert!(matches!(
            result,
            Err(ValidationError::DanglingReference { .. })
        ));
    }

    #[test]
    fn validate_rejects_missing_entry() {
        let graph = ActionGraph::new();
        let result = graph.validate(&[ActionId::new()]);
        assert!(matches!(
            result,
            Err(ValidationError::EntryActionMissing { .. })
        ));
    }

    #[test]
    fn validate_rejects_waitless_cycle() {
        let mut graph = ActionGraph::new();
        let a_id = ActionId::new();
        let b_id = ActionId::new();

        // A -> B -> A, no wait anywhere.
        let mut a = branch_action("A", Some(b_id), None);
        a.id = a_id;
        let mut b = branch_action("B", Some(a_id), None);
        b.id = b_id;
        graph.insert(a);
        graph.insert(b);

        let result = graph.validate(&[a_id]);
        assert!(matches!(
            result,
            Err(ValidationError::CycleWithoutWait { .. })
        ));
    }

    #[test]
    fn validate_accepts_cycle_through_wait() {
        let mut graph = ActionGraph::new();
        let branch_id = ActionId::new();
        let wait_id = ActionId::new();

        // branch -> wait -> branch: a retry loop paced by the wait.
        let mut branch = branch_action("Check", Some(wait_id), None);
        branch.id = branch_id;
        let mut wait = wait_action("Backoff").with_next(branch_id);
        wait.id = wait_id;
        graph.insert(branch);
        graph.insert(wait);

        assert!(graph.validate(&[branch_id]).is_ok());
    }

    #[test]
    fn validate_rejects_waitless_self_loop() {
        let mut graph = ActionGraph::new();
        let id = ActionId::new();
        let mut action = branch_action("Loop", Some(id), None);
        action.id = id;
        graph.insert(action);

        let result = graph.validate(&[id]);
        assert!(matches!(
            result,
            Err(ValidationError::CycleWithoutWait { .. })
        ));
    }

    #[test]
    fn unreachable_actions_are_reported() {
        let mut graph = ActionGraph::new();
        let reachable = wait_action("Reachable");
        let reachable_id = reachable.id;
        let orphan = wait_action("Orphan");
        let orphan_id = orphan.id;
        graph.insert(reachable);
        graph.insert(orphan);

        let unreachable = graph.unreachable_from(&[reachable_id]);
        assert_eq!(unreachable, vec![orphan_id]);
    }

    #[test]
    fn graph_serde_roundtrip_preserves_order() {
        let mut graph = ActionGraph::new();
        let b = wait_action("B");
        let b_id = b.id;
        let a = wait_action("A").with_next(b_id);
        graph.insert(a.clone());
        graph.insert(b);

        let encoded = serde_json::to_string(&graph).expect("serialize");
        let parsed: ActionGraph = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(graph, parsed);
        let names: Vec<_> = parsed.actions().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
