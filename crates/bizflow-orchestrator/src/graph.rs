use bizflow_core::{AgentId, BizflowError, BizflowResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Outgoing edge of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Next(usize),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub index: usize,
    pub agent: AgentId,
    pub next: Edge,
}

/// A linear chain: node `i` has exactly one edge, to `i + 1` or to the end.
///
/// No node has more than one predecessor and edges only point forward, so a
/// walk visits every node exactly once in sequence order.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionGraph {
    signature: String,
    nodes: Vec<GraphNode>,
}

impl ExecutionGraph {
    /// Cache key of the sequence, e.g. `coordinator>invoice>analysis`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    pub fn agents(&self) -> Vec<AgentId> {
        self.nodes.iter().map(|n| n.agent).collect()
    }

    /// Follow the edges from the first node.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            graph: self,
            cursor: if self.nodes.is_empty() {
                Edge::End
            } else {
                Edge::Next(0)
            },
        }
    }

    /// Number of incoming edges per node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for node in &self.nodes {
            if let Edge::Next(i) = node.next {
                degrees[i] += 1;
            }
        }
        degrees
    }
}

/// Iterator over the nodes of an [`ExecutionGraph`] in edge order.
pub struct Walk<'a> {
    graph: &'a ExecutionGraph,
    cursor: Edge,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a GraphNode;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor {
            Edge::End => None,
            Edge::Next(i) => {
                let node = self.graph.nodes.get(i)?;
                self.cursor = node.next;
                Some(node)
            }
        }
    }
}

/// Compiles sequences into graphs, caching one graph per distinct sequence.
#[derive(Default)]
pub struct GraphBuilder {
    cache: Mutex<HashMap<String, Arc<ExecutionGraph>>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signature(sequence: &[AgentId]) -> String {
        sequence
            .iter()
            .map(AgentId::as_str)
            .collect::<Vec<_>>()
            .join(">")
    }

    /// Compile `sequence`, reusing a cached graph when one exists.
    pub fn compile(&self, sequence: &[AgentId]) -> BizflowResult<Arc<ExecutionGraph>> {
        if sequence.is_empty() {
            return Err(BizflowError::Orchestrator(
                "cannot compile an empty agent sequence".into(),
            ));
        }
        for (i, agent) in sequence.iter().enumerate() {
            if sequence[..i].contains(agent) {
                return Err(BizflowError::Orchestrator(format!(
                    "agent '{agent}' appears more than once in the sequence"
                )));
            }
        }

        let signature = Self::signature(sequence);
        let mut cache = self.cache.lock();
        if let Some(graph) = cache.get(&signature) {
            debug!(signature = %signature, "Graph cache hit");
            return Ok(graph.clone());
        }

        let last = sequence.len() - 1;
        let nodes = sequence
            .iter()
            .enumerate()
            .map(|(index, agent)| GraphNode {
                index,
                agent: *agent,
                next: if index == last {
                    Edge::End
                } else {
                    Edge::Next(index + 1)
                },
            })
            .collect();
        let graph = Arc::new(ExecutionGraph {
            signature: signature.clone(),
            nodes,
        });
        debug!(signature = %signature, "Graph compiled");
        cache.insert(signature, graph.clone());
        Ok(graph)
    }

    /// Number of distinct graphs compiled so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}
