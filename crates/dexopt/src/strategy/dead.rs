use log::debug;
use slotmap::SecondaryMap;

use dexvm::emulate;
use dexvm::insn::InvokeKind;
use dexvm::state::Reg;
use dexvm::{Addr, ExecutionGraph, Insn, NodeId, Value};

use super::{Category, Counts, Outcome, Strategy};
use crate::manipulator::{Manipulator, ManipulatorError};

/// Removes instructions that never execute or whose only effect is lost.
pub struct DeadCodeRemoval {
    remove_weak: bool,
    counts: Counts,
}

impl DeadCodeRemoval {
    /// With `remove_weak`, side-effect-free instructions whose results are never read
    /// go too.
    pub fn new(remove_weak: bool) -> Self {
        Self {
            remove_weak,
            counts: Default::default(),
        }
    }

    fn classify(&self, graph: &ExecutionGraph, addr: Addr, insn: &Insn) -> Option<Category> {
        let method = graph.method();

        if !graph.was_address_reached(addr) {
            // an aborted graph says nothing about what is unreachable
            return graph.is_complete().then_some(Category::DeadUnreachable);
        }

        match insn {
            Insn::Nop => Some(Category::DeadNop),
            Insn::Goto { target } if method.next_addr(addr) == Some(*target) => {
                Some(Category::DeadUselessGoto)
            }
            _ if self.remove_weak => weak(graph, addr, insn),
            _ => None,
        }
    }
}

fn weak(graph: &ExecutionGraph, addr: Addr, insn: &Insn) -> Option<Category> {
    if let Insn::Invoke { kind, method, args } = insn {
        let discarded = !matches!(
            graph
                .method()
                .next_addr(addr)
                .and_then(|next| graph.method().insn_at(next)),
            Some(Insn::MoveResult { .. })
        );
        let receiver_safe = *kind == InvokeKind::Static
            || graph.node_pile(addr).all(|node| {
                args.first()
                    .and_then(|&reg| node.pre.peek(reg))
                    .is_some_and(|value| value.is_known() && !matches!(value, Value::Null(_)))
            });

        return (emulate::is_pure(method) && discarded && receiver_safe)
            .then_some(Category::DeadUnusedResult);
    }

    if insn.has_side_effect() || insn.may_throw() {
        return None;
    }

    let reg = insn.writes()?;
    let unread = graph
        .pile(addr)
        .iter()
        .all(|&id| !is_read_later(graph, id, reg));

    match insn {
        _ if !unread => None,
        Insn::MoveResult { .. } => Some(Category::DeadUnusedResult),
        _ => Some(Category::DeadUnusedAssignment),
    }
}

/// Whether any path out of `id` may read `reg` before overwriting it. Paths the graph
/// didn't explore count as reads.
fn is_read_later(graph: &ExecutionGraph, id: NodeId, reg: Reg) -> bool {
    if graph.node(id).truncated {
        return true;
    }

    let mut stack = graph.node(id).children.clone();
    let mut seen = SecondaryMap::<NodeId, ()>::new();

    while let Some(node_id) = stack.pop() {
        if seen.insert(node_id, ()).is_some() {
            continue;
        }

        let node = graph.node(node_id);

        let Some(insn) = graph.method().insn_at(node.addr) else {
            return true;
        };

        if insn.reads().contains(&reg) || node.truncated {
            return true;
        }

        // handlers still see the old value
        if insn.writes() == Some(reg) && !insn.may_throw() {
            continue;
        }

        stack.extend(node.children.iter().copied());
    }

    false
}

impl Strategy for DeadCodeRemoval {
    fn name(&self) -> &'static str {
        "dead code removal"
    }

    fn perform(&mut self, manipulator: &mut Manipulator<'_>) -> Result<Outcome, ManipulatorError> {
        let graph = manipulator.graph();
        let mut found = graph
            .method()
            .iter()
            .filter_map(|(addr, insn)| Some((addr, self.classify(graph, addr, insn)?)))
            .collect::<Vec<_>>();

        let mut addrs = found.iter().map(|&(addr, _)| addr).collect::<Vec<_>>();

        while !addrs.is_empty() && manipulator.check_removal(&addrs).is_err() {
            addrs.pop();
        }

        if addrs.is_empty() {
            return Ok(Outcome::Unchanged);
        }

        found.truncate(addrs.len());
        manipulator.remove_all(&addrs)?;

        for (_, category) in found {
            self.counts.add(category, 1);
        }

        debug!("{}: removed {} instructions", self.name(), addrs.len());

        Ok(Outcome::Changed)
    }

    fn counts(&self) -> &Counts {
        &self.counts
    }
}
