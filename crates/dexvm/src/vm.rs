use std::collections::VecDeque;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::{debug, trace};

use crate::class::ClassManager;
use crate::error::VmError;
use crate::exec::{Heap, Interpreter};
use crate::graph::{Ceiling, ExecutionGraph, GraphStatus, NodeId};
use crate::method::{Addr, Method};
use crate::state::MethodState;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Nodes a single execution may create, counting those of nested callees.
    pub max_nodes: usize,
    /// Times a single address may be executed.
    pub max_address_visits: usize,
    /// Nesting depth for executing local callees.
    pub max_call_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_nodes: 50_000,
            max_address_visits: 500,
            max_call_depth: 10,
        }
    }
}

/// Nodes left to an execution and to every callee it runs.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    nodes: usize,
}

impl Budget {
    pub fn new(options: &VmOptions) -> Self {
        Self {
            nodes: options.max_nodes,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.nodes == 0
    }

    fn charge(&mut self) {
        self.nodes = self.nodes.saturating_sub(1);
    }
}

pub struct Vm {
    classes: ClassManager,
    options: VmOptions,
}

impl Vm {
    pub fn new(classes: ClassManager, options: VmOptions) -> Self {
        Self { classes, options }
    }

    pub fn classes(&self) -> &ClassManager {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassManager {
        &mut self.classes
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// A state in which every parameter is an unknown value of its declared type.
    pub fn initial_state(&self, method: &Method) -> MethodState {
        let mut state = MethodState::new(method.locals(), method.param_count());

        for (idx, ty) in method.param_tys().into_iter().enumerate() {
            // the parameter count always matches the types
            let _ = state.assign_param(idx as u16, Value::Unknown(ty));
        }

        state
    }

    pub fn execute(&self, method: &Method, entry: MethodState) -> Result<ExecutionGraph> {
        method
            .validate()
            .with_context(|| format!("invalid method {}", method.reference))?;

        let mut heap = Heap::after(&entry);
        let mut budget = Budget::new(&self.options);
        let mut graph = self
            .run(method, entry, 0, &mut heap, &mut budget)
            .with_context(|| format!("failed to execute {}", method.reference))?;
        graph.heap = heap;

        Ok(graph)
    }

    pub(crate) fn run(
        &self,
        method: &Method,
        entry: MethodState,
        depth: usize,
        heap: &mut Heap,
        budget: &mut Budget,
    ) -> Result<ExecutionGraph, VmError> {
        let mut graph = ExecutionGraph::new(method.clone(), entry.clone());

        if method.is_empty() {
            return Ok(graph);
        }

        let mut queue = VecDeque::<(Option<NodeId>, Addr, MethodState)>::new();
        let mut visits = HashMap::<Addr, usize>::new();
        queue.push_back((None, Addr(0), entry));

        while let Some((parent, addr, pre)) = queue.pop_front() {
            if budget.is_spent() {
                abort(&mut graph, Ceiling::Nodes, parent);

                for (parent, _, _) in queue.drain(..) {
                    truncate(&mut graph, parent);
                }

                break;
            }

            let visited = visits.entry(addr).or_default();

            if *visited >= self.options.max_address_visits {
                abort(&mut graph, Ceiling::AddressVisits, parent);

                continue;
            }

            *visited += 1;

            let step = Interpreter::new(self, method, heap, budget, depth).apply(addr, &pre)?;
            let id = graph.add_node(addr, pre, step.state, parent);
            budget.charge();

            for (succ, state) in step.successors {
                queue.push_back((Some(id), succ, state));
            }
        }

        debug!(
            "executed {} at depth {depth}: {} nodes over {} addresses, {:?}",
            method.reference,
            graph.node_count(),
            graph.addresses().len(),
            graph.status(),
        );

        Ok(graph)
    }
}

fn truncate(graph: &mut ExecutionGraph, parent: Option<NodeId>) {
    if let Some(parent) = parent {
        graph.node_mut(parent).truncated = true;
    }
}

fn abort(graph: &mut ExecutionGraph, ceiling: Ceiling, parent: Option<NodeId>) {
    if graph.status == GraphStatus::Completed {
        trace!("execution of {} hit the {ceiling}", graph.method().reference);
        graph.status = GraphStatus::Aborted(ceiling);
    }

    truncate(graph, parent);
}
