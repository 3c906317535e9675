// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame-stamped task execution.
//!
//! A node runs its upstream producers before itself. The frame number is
//! only a stamp: a node already stamped with the current frame is skipped,
//! so shared producers run once per frame and link cycles end.

use crate::graph::Graph;
use crate::id::NodeId;

/// Outcome of one execution walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Nodes whose task ran, in execution order
    pub executed: Vec<NodeId>,
    /// Nodes skipped because they already ran this frame
    pub skipped: Vec<NodeId>,
    /// Nodes whose task reported a failure
    pub failed: Vec<NodeId>,
}

impl ExecutionReport {
    /// Check if every executed task succeeded
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Graph {
    /// Run every producer feeding `node`, once per frame
    pub fn execute_input_tasks(&mut self, node: NodeId, frame: u64) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        self.run_inputs(node, frame, &mut report);
        report
    }

    /// Run the producers feeding `node`, then `node` itself
    pub fn execute_all_time(&mut self, node: NodeId, frame: u64) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        self.run_once(node, frame, &mut report);
        report
    }

    /// Run every output node of a graph, pulling their inputs first
    pub fn execute_graph(&mut self, container: NodeId, frame: u64) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let sinks: Vec<NodeId> = self
            .children(container)
            .into_iter()
            .filter(|id| self.node(*id).is_some_and(|n| n.outputs().all(|s| !s.is_connected())))
            .collect();
        for sink in sinks {
            self.run_once(sink, frame, &mut report);
        }
        report
    }

    fn run_inputs(&mut self, node: NodeId, frame: u64, report: &mut ExecutionReport) {
        let producers: Vec<NodeId> = self
            .input_refs(node)
            .into_iter()
            .flat_map(|slot| self.slot(slot).map(|s| s.linked_slots().to_vec()).unwrap_or_default())
            .map(|partner| partner.node)
            .collect();
        for producer in producers {
            self.run_once(producer, frame, report);
        }
    }

    fn run_once(&mut self, node: NodeId, frame: u64, report: &mut ExecutionReport) {
        match self.nodes.get_mut(&node) {
            Some(n) if n.last_executed_frame == Some(frame) => {
                report.skipped.push(node);
                return;
            }
            Some(n) => n.last_executed_frame = Some(frame),
            None => return,
        }

        self.run_inputs(node, frame, report);

        if let Some(n) = self.nodes.get_mut(&node) {
            if n.behavior.execute(frame) {
                report.executed.push(node);
            } else {
                tracing::warn!("task of node {} '{}' failed at frame {}", node, n.name, frame);
                report.failed.push(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeBehavior};
    use crate::slot::Slot;

    #[derive(Debug)]
    struct Failing;

    impl NodeBehavior for Failing {
        fn execute(&mut self, _frame: u64) -> bool {
            false
        }
    }

    fn pass(graph: &mut Graph, name: &str) -> NodeId {
        let root = graph.root();
        graph
            .add_node(
                root,
                Node::new(name, "PASS")
                    .with_input(Slot::input("in", "TASK").accept_many_inputs())
                    .with_output(Slot::output("out", "TASK")),
                true,
            )
            .unwrap()
    }

    fn link(graph: &mut Graph, from: NodeId, to: NodeId) {
        let o = graph.find_slot_by_name(from, "out").unwrap();
        let i = graph.find_slot_by_name(to, "in").unwrap();
        assert!(graph.connect_slots(o, i));
    }

    #[test]
    fn test_upstream_runs_first() {
        let mut graph = Graph::new();
        let a = pass(&mut graph, "A");
        let b = pass(&mut graph, "B");
        let c = pass(&mut graph, "C");
        link(&mut graph, a, b);
        link(&mut graph, b, c);

        let report = graph.execute_all_time(c, 1);
        assert_eq!(report.executed, vec![a, b, c]);
        assert!(report.success());
        assert_eq!(graph.node(a).unwrap().last_executed_frame(), Some(1));
    }

    #[test]
    fn test_once_per_frame() {
        let mut graph = Graph::new();
        let shared = pass(&mut graph, "Shared");
        let b = pass(&mut graph, "B");
        let c = pass(&mut graph, "C");
        let sink = pass(&mut graph, "Sink");
        link(&mut graph, shared, b);
        link(&mut graph, shared, c);
        link(&mut graph, b, sink);
        link(&mut graph, c, sink);

        let report = graph.execute_input_tasks(sink, 7);
        assert_eq!(report.executed, vec![shared, b, c]);
        assert_eq!(report.skipped, vec![shared]);

        // Same frame again: everything is stamped already
        let again = graph.execute_input_tasks(sink, 7);
        assert!(again.executed.is_empty());

        // Next frame runs everything again
        let next = graph.execute_input_tasks(sink, 8);
        assert_eq!(next.executed.len(), 3);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = Graph::new();
        let a = pass(&mut graph, "A");
        let b = pass(&mut graph, "B");
        link(&mut graph, a, b);
        link(&mut graph, b, a);

        let report = graph.execute_all_time(a, 1);
        assert_eq!(report.executed, vec![b, a]);
        assert_eq!(report.skipped, vec![a]);
    }

    #[test]
    fn test_failure_reported() {
        let mut graph = Graph::new();
        let root = graph.root();
        let bad = graph
            .add_node(
                root,
                Node::new("Bad", "PASS")
                    .with_output(Slot::output("out", "TASK"))
                    .with_behavior(Box::new(Failing)),
                true,
            )
            .unwrap();
        let sink = pass(&mut graph, "Sink");
        link(&mut graph, bad, sink);

        let report = graph.execute_graph(root, 3);
        assert_eq!(report.failed, vec![bad]);
        assert_eq!(report.executed, vec![sink]);
        assert!(!report.success());
    }
}
