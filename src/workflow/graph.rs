// StateGraph - Step table, edge table and interrupt points (LangGraph-inspired)
use super::error::WorkflowError;
use super::state::WorkflowState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Step function - takes current state, returns a partial update
#[async_trait]
pub trait NodeFunction<S: WorkflowState>: Send + Sync {
    async fn execute(&self, state: &S) -> Result<S::Update, WorkflowError>;
}

/// Outcome enum returned by a routing predicate
pub trait RouteOutcome: Copy + Send + Sync + 'static {
    /// Every outcome the predicate can produce; used to check branch coverage
    const ALL: &'static [Self];

    fn label(self) -> &'static str;
}

/// Node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// LLM completion step
    Agent,
    /// External data lookup
    Tool,
    /// Human review anchor
    Human,
}

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Node(String),
    /// Terminal: the checkpoint's next-step list becomes empty
    End,
    /// Stay paused before the current interrupt anchor, awaiting input
    AwaitInput,
}

impl Target {
    pub fn node(name: &str) -> Self {
        Target::Node(name.to_string())
    }
}

type Predicate<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

/// Edge types
#[derive(Clone)]
pub enum EdgeType<S> {
    /// Fixed edge (always follows this path)
    Fixed(Target),
    /// Conditional edge: named predicate plus an outcome -> target table
    Conditional {
        predicate_name: &'static str,
        predicate: Predicate<S>,
        branches: HashMap<&'static str, Target>,
    },
}

impl<S> std::fmt::Debug for EdgeType<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeType::Fixed(target) => write!(f, "Fixed({:?})", target),
            EdgeType::Conditional {
                predicate_name,
                branches,
                ..
            } => write!(f, "Conditional({}, {:?})", predicate_name, branches),
        }
    }
}

/// Graph node
pub struct Node<S: WorkflowState> {
    pub id: String,
    pub node_type: NodeType,
    pub function: Arc<dyn NodeFunction<S>>,
    pub description: String,
}

/// StateGraph - fixed at construction, validated by `StateGraphBuilder::build`
pub struct StateGraph<S: WorkflowState> {
    nodes: HashMap<String, Node<S>>,
    edges: HashMap<String, EdgeType<S>>,
    entry_point: String,
    interrupt_before: HashSet<String>,
}

impl<S: WorkflowState> StateGraph<S> {
    pub fn get_node(&self, node_id: &str) -> Option<&Node<S>> {
        self.nodes.get(node_id)
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn is_interrupt(&self, node_id: &str) -> bool {
        self.interrupt_before.contains(node_id)
    }

    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve the edge leaving `current_node` against the post-step state
    pub fn next_target(&self, current_node: &str, state: &S) -> Result<Target, WorkflowError> {
        let edge = self
            .edges
            .get(current_node)
            .ok_or_else(|| WorkflowError::UnknownStep(current_node.to_string()))?;

        match edge {
            EdgeType::Fixed(target) => Ok(target.clone()),
            EdgeType::Conditional {
                predicate_name,
                predicate,
                branches,
            } => {
                let outcome = predicate(state);
                tracing::debug!("🔀 {} -> {} via '{}'", current_node, outcome, predicate_name);
                branches.get(outcome).cloned().ok_or_else(|| {
                    WorkflowError::GraphConfig(format!(
                        "predicate '{}' returned unmapped outcome '{}'",
                        predicate_name, outcome
                    ))
                })
            }
        }
    }
}

/// Builder pattern for StateGraph
pub struct StateGraphBuilder<S: WorkflowState> {
    nodes: HashMap<String, Node<S>>,
    edges: HashMap<String, EdgeType<S>>,
    entry_point: Option<String>,
    interrupt_before: HashSet<String>,
    errors: Vec<String>,
}

impl<S: WorkflowState> StateGraphBuilder<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry_point: None,
            interrupt_before: HashSet::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_node(
        mut self,
        id: &str,
        node_type: NodeType,
        function: Arc<dyn NodeFunction<S>>,
        description: &str,
    ) -> Self {
        let node = Node {
            id: id.to_string(),
            node_type,
            function,
            description: description.to_string(),
        };
        if self.nodes.insert(id.to_string(), node).is_some() {
            self.errors.push(format!("duplicate node '{}'", id));
        }
        self
    }

    pub fn add_edge(self, from: &str, to: &str) -> Self {
        self.add_edge_to(from, Target::node(to))
    }

    pub fn add_edge_to(mut self, from: &str, target: Target) -> Self {
        self.insert_edge(from, EdgeType::Fixed(target));
        self
    }

    /// Add conditional edge; `branches` must cover every outcome of `O`
    pub fn add_conditional_edge<O: RouteOutcome>(
        mut self,
        from: &str,
        predicate_name: &'static str,
        predicate: fn(&S) -> O,
        branches: &[(O, Target)],
    ) -> Self {
        let table: HashMap<&'static str, Target> = branches
            .iter()
            .map(|(outcome, target)| (outcome.label(), target.clone()))
            .collect();

        for outcome in O::ALL {
            if !table.contains_key(outcome.label()) {
                self.errors.push(format!(
                    "predicate '{}' has no branch for outcome '{}'",
                    predicate_name,
                    outcome.label()
                ));
            }
        }

        let edge = EdgeType::Conditional {
            predicate_name,
            predicate: Arc::new(move |state: &S| predicate(state).label()),
            branches: table,
        };
        self.insert_edge(from, edge);
        self
    }

    pub fn set_entry_point(mut self, node_id: &str) -> Self {
        self.entry_point = Some(node_id.to_string());
        self
    }

    pub fn interrupt_before(mut self, node_id: &str) -> Self {
        self.interrupt_before.insert(node_id.to_string());
        self
    }

    fn insert_edge(&mut self, from: &str, edge: EdgeType<S>) {
        if self.edges.insert(from.to_string(), edge).is_some() {
            self.errors.push(format!("node '{}' has more than one outgoing edge", from));
        }
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<StateGraph<S>, WorkflowError> {
        let mut errors = self.errors;

        let entry_point = match self.entry_point {
            Some(entry) if self.nodes.contains_key(&entry) => entry,
            Some(entry) => {
                errors.push(format!("entry point '{}' does not exist", entry));
                entry
            }
            None => {
                errors.push("no entry point set".to_string());
                String::new()
            }
        };

        for name in &self.interrupt_before {
            if !self.nodes.contains_key(name) {
                errors.push(format!("interrupt on non-existent node '{}'", name));
            }
        }

        let mut node_ids: Vec<&String> = self.nodes.keys().collect();
        node_ids.sort();
        for id in node_ids {
            if !self.edges.contains_key(id) {
                errors.push(format!("node '{}' has no outgoing edge", id));
            }
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                errors.push(format!("edge from non-existent node '{}'", from));
            }

            let targets: Vec<&Target> = match edge {
                EdgeType::Fixed(target) => vec![target],
                EdgeType::Conditional { branches, .. } => branches.values().collect(),
            };

            for target in targets {
                match target {
                    Target::Node(to) if !self.nodes.contains_key(to) => {
                        errors.push(format!("edge from '{}' to non-existent node '{}'", from, to));
                    }
                    Target::AwaitInput if !self.interrupt_before.contains(from) => {
                        errors.push(format!(
                            "'{}' can only await input if it is an interrupt point",
                            from
                        ));
                    }
                    _ => {}
                }
            }
        }

        if !errors.is_empty() {
            return Err(WorkflowError::GraphConfig(errors.join("; ")));
        }

        tracing::info!(
            "✅ StateGraph compiled: {} nodes, {} edges, interrupts {:?}",
            self.nodes.len(),
            self.edges.len(),
            self.interrupt_before
        );

        Ok(StateGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry_point,
            interrupt_before: self.interrupt_before,
        })
    }
}

impl<S: WorkflowState> Default for StateGraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{TravelState, TravelUpdate};

    struct Noop;

    #[async_trait]
    impl NodeFunction<TravelState> for Noop {
        async fn execute(&self, _state: &TravelState) -> Result<TravelUpdate, WorkflowError> {
            Ok(TravelUpdate::default())
        }
    }

    #[derive(Clone, Copy)]
    enum Coin {
        Heads,
        Tails,
    }

    impl RouteOutcome for Coin {
        const ALL: &'static [Self] = &[Coin::Heads, Coin::Tails];

        fn label(self) -> &'static str {
            match self {
                Coin::Heads => "heads",
                Coin::Tails => "tails",
            }
        }
    }

    fn flip(state: &TravelState) -> Coin {
        if state.location.is_empty() {
            Coin::Tails
        } else {
            Coin::Heads
        }
    }

    fn noop() -> Arc<dyn NodeFunction<TravelState>> {
        Arc::new(Noop)
    }

    #[test]
    fn test_conditional_edge_resolves_by_outcome() {
        let graph = StateGraphBuilder::<TravelState>::new()
            .add_node("a", NodeType::Agent, noop(), "a")
            .add_node("b", NodeType::Human, noop(), "b")
            .set_entry_point("a")
            .add_conditional_edge("a", "flip", flip, &[(Coin::Heads, Target::node("b")), (Coin::Tails, Target::End)])
            .add_edge_to("b", Target::End)
            .build()
            .unwrap();

        let empty = TravelState::default();
        let named = TravelState {
            location: "Paris".to_string(),
            ..TravelState::default()
        };
        assert_eq!(graph.next_target("a", &empty).unwrap(), Target::End);
        assert_eq!(graph.next_target("a", &named).unwrap(), Target::node("b"));
        assert!(matches!(
            graph.next_target("missing", &empty),
            Err(WorkflowError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_build_rejects_uncovered_outcome() {
        let result = StateGraphBuilder::<TravelState>::new()
            .add_node("a", NodeType::Agent, noop(), "a")
            .set_entry_point("a")
            .add_conditional_edge("a", "flip", flip, &[(Coin::Heads, Target::End)])
            .build();

        match result {
            Err(WorkflowError::GraphConfig(msg)) => assert!(msg.contains("tails")),
            other => panic!("expected GraphConfig error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_build_rejects_dangling_targets_and_missing_edges() {
        let result = StateGraphBuilder::<TravelState>::new()
            .add_node("a", NodeType::Agent, noop(), "a")
            .add_node("b", NodeType::Agent, noop(), "b")
            .set_entry_point("a")
            .add_edge("a", "ghost")
            .build();

        match result {
            Err(WorkflowError::GraphConfig(msg)) => {
                assert!(msg.contains("ghost"));
                assert!(msg.contains("'b' has no outgoing edge"));
            }
            other => panic!("expected GraphConfig error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_await_input_requires_interrupt_point() {
        let result = StateGraphBuilder::<TravelState>::new()
            .add_node("review", NodeType::Human, noop(), "review")
            .set_entry_point("review")
            .add_edge_to("review", Target::AwaitInput)
            .build();
        assert!(matches!(result, Err(WorkflowError::GraphConfig(_))));

        let graph = StateGraphBuilder::<TravelState>::new()
            .add_node("review", NodeType::Human, noop(), "review")
            .set_entry_point("review")
            .add_edge_to("review", Target::AwaitInput)
            .interrupt_before("review")
            .build()
            .unwrap();
        assert!(graph.is_interrupt("review"));
    }
}
