//! Edits a method together with its execution graph, keeping node addresses, piles and
//! branch targets consistent with the instruction stream.

use hashbrown::HashSet;
use log::{debug, trace};
use thiserror::Error;

use dexvm::method::Relocation;
use dexvm::{Addr, ExecutionGraph, ExecutionNode, Insn, Method, VmError, Vm};

#[derive(Error, Debug)]
pub enum ManipulatorError {
    #[error("no instruction at address {0}")]
    NoInstruction(Addr),

    #[error("removing the instruction at {0} would disconnect the graph")]
    WouldDisconnect(Addr),

    #[error("failed to re-execute the instruction at {addr}")]
    Execution {
        addr: Addr,

        #[source]
        source: VmError,
    },
}

pub struct Manipulator<'a> {
    vm: &'a Vm,
    graph: &'a mut ExecutionGraph,
    reexecute: bool,
}

impl<'a> Manipulator<'a> {
    pub fn new(vm: &'a Vm, graph: &'a mut ExecutionGraph) -> Self {
        Self {
            vm,
            graph,
            reexecute: false,
        }
    }

    pub fn vm(&self) -> &'a Vm {
        self.vm
    }

    pub fn graph(&self) -> &ExecutionGraph {
        self.graph
    }

    pub fn method(&self) -> &Method {
        self.graph.method()
    }

    pub fn get_instruction(&self, addr: Addr) -> Result<&Insn, ManipulatorError> {
        self.method()
            .insn_at(addr)
            .ok_or(ManipulatorError::NoInstruction(addr))
    }

    pub fn get_node_pile(&self, addr: Addr) -> impl Iterator<Item = &ExecutionNode> + '_ {
        self.graph.node_pile(addr)
    }

    pub fn was_address_reached(&self, addr: Addr) -> bool {
        self.graph.was_address_reached(addr)
    }

    /// Instruction addresses in order, captured before any edit.
    pub fn addresses(&self) -> Vec<Addr> {
        self.method().addrs().to_vec()
    }

    pub fn request_reexecution(&mut self) {
        self.reexecute = true;
    }

    pub fn reexecution_requested(&self) -> bool {
        self.reexecute
    }

    fn index_of(&self, addr: Addr) -> Result<usize, ManipulatorError> {
        self.method()
            .index_of(addr)
            .ok_or(ManipulatorError::NoInstruction(addr))
    }

    /// Swaps the instruction at `addr`. The nodes there stay as they were.
    pub fn replace(&mut self, addr: Addr, insn: Insn) -> Result<Relocation, ManipulatorError> {
        self.replace_many(addr, vec![insn])
    }

    /// Replaces the instruction at `addr` with a sequence. The existing nodes move to the
    /// first instruction of the sequence; the rest start out unreached.
    pub fn replace_many(&mut self, addr: Addr, insns: Vec<Insn>) -> Result<Relocation, ManipulatorError> {
        let idx = self.index_of(addr)?;
        trace!("replacing {addr} with {} instructions", insns.len());

        let mut relocation = self.graph.method_mut().splice(idx, 1, insns, true);
        relocation.insns.insert(addr, relocation.label(addr));
        self.graph.relocate(&relocation);

        Ok(relocation)
    }

    /// Inserts `insn` so that every jump to `addr` now executes it first.
    pub fn insert_before(&mut self, addr: Addr, insn: Insn) -> Result<Relocation, ManipulatorError> {
        let idx = self.index_of(addr)?;

        Ok(self.splice(idx, 0, vec![insn], true))
    }

    /// Inserts `insn` right after the instruction at `addr`. Jumps to the following
    /// instruction skip it.
    pub fn insert_after(&mut self, addr: Addr, insn: Insn) -> Result<Relocation, ManipulatorError> {
        let idx = self.index_of(addr)?;

        Ok(self.splice(idx + 1, 0, vec![insn], false))
    }

    fn splice(&mut self, idx: usize, remove: usize, insns: Vec<Insn>, retarget: bool) -> Relocation {
        let relocation = self.graph.method_mut().splice(idx, remove, insns, retarget);
        self.graph.relocate(&relocation);

        relocation
    }

    pub fn remove(&mut self, addr: Addr) -> Result<Relocation, ManipulatorError> {
        self.remove_all(&[addr])
    }

    /// Deletes instructions along with their nodes. Each node's parents are linked to its
    /// children, and jumps to a removed instruction land on the next surviving one.
    ///
    /// Fails without changing anything if a surviving jump or handler would be left
    /// without a target, or if a reached node continues anywhere other than the next
    /// instruction or a handler.
    pub fn remove_all(&mut self, addrs: &[Addr]) -> Result<Relocation, ManipulatorError> {
        let mut addrs = addrs.to_vec();
        addrs.sort_unstable();
        addrs.dedup();

        self.check_removal(&addrs)?;

        let mut combined = Relocation::default();

        for &addr in addrs.iter().rev() {
            let idx = self.index_of(addr)?;
            self.graph.remove_pile(addr);
            let relocation = self.splice(idx, 1, vec![], false);
            compose(&mut combined, &relocation);
        }

        debug!("removed {} instructions from {}", addrs.len(), self.method().reference);

        Ok(combined)
    }

    /// Whether [`Self::remove_all`] would accept `addrs` (which must be sorted).
    pub fn check_removal(&self, addrs: &[Addr]) -> Result<(), ManipulatorError> {
        let method = self.method();
        let removed = addrs
            .iter()
            .map(|&addr| self.index_of(addr))
            .collect::<Result<HashSet<_>, _>>()?;
        let survives = |idx: usize| !removed.contains(&idx);

        // a target needs a surviving instruction at or after it
        let lands = |target: Addr| match method.index_of(target) {
            Some(idx) => (idx..method.len()).any(survives),
            None => false,
        };

        for (idx, insn) in method.insns().iter().enumerate() {
            if !survives(idx) {
                continue;
            }

            if let Some(&target) = insn.targets().iter().find(|&&target| !lands(target)) {
                return Err(ManipulatorError::WouldDisconnect(target));
            }
        }

        for handler in method.tries.iter().flat_map(|block| &block.handlers) {
            if !lands(handler.target) {
                return Err(ManipulatorError::WouldDisconnect(handler.target));
            }
        }

        for &addr in addrs {
            let next = method.next_addr(addr);

            for node in self.graph.node_pile(addr) {
                let strays = node.children.iter().any(|&child| {
                    let child_addr = self.graph.node(child).addr;

                    Some(child_addr) != next && !method.is_handler(child_addr)
                });

                if strays {
                    return Err(ManipulatorError::WouldDisconnect(addr));
                }
            }
        }

        Ok(())
    }

    /// Grows the register file by `count` scratch locals, renumbering parameters in the
    /// method and in every recorded state.
    pub fn add_locals(&mut self, count: u16) {
        self.graph.method_mut().add_locals(count);
        self.graph.insert_locals(count);
    }

    /// Re-executes the instruction at `addr` in each node's pre-state. If that changes
    /// where control goes, the graph is stale and re-execution is requested.
    pub fn refresh(&mut self, addr: Addr) -> Result<(), ManipulatorError> {
        self.index_of(addr)?;

        let consistent = self
            .graph
            .reapply(self.vm, addr)
            .map_err(|source| ManipulatorError::Execution { addr, source })?;

        if !consistent {
            debug!("successors changed at {addr}, requesting re-execution");
            self.request_reexecution();
        }

        Ok(())
    }
}

/// Folds a later relocation into an earlier one, so `combined` maps original addresses
/// straight to their final positions.
fn compose(combined: &mut Relocation, later: &Relocation) {
    if combined.labels.is_empty() {
        *combined = later.clone();

        return;
    }

    combined.insns = combined
        .insns
        .iter()
        .filter_map(|(&orig, &mid)| later.insn(mid).map(|new| (orig, new)))
        .collect();

    for target in combined.labels.values_mut() {
        *target = later.label(*target);
    }
}
