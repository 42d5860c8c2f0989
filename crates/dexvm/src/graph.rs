mod dot;

use hashbrown::HashMap;
use log::trace;
use slotmap::{new_key_type, SlotMap};
use strum::Display;

use crate::error::VmError;
use crate::exec::{Heap, Interpreter};
use crate::method::{Addr, Method, Relocation};
use crate::state::{MethodState, Reg};
use crate::value::Value;
use crate::vm::{Budget, Vm};

new_key_type! {
    pub struct NodeId;
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceiling {
    #[strum(serialize = "node limit")]
    Nodes,

    #[strum(serialize = "address visit limit")]
    AddressVisits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    Completed,
    /// Some paths were cut off. Unreached addresses may still be live.
    Aborted(Ceiling),
}

/// One execution of the instruction at `addr` in a particular incoming state.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub addr: Addr,
    pub pre: MethodState,
    pub state: MethodState,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// Exploration stopped before this node's successors were recorded.
    pub truncated: bool,
}

impl ExecutionNode {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty() && !self.truncated
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    method: Method,
    entry: MethodState,
    nodes: SlotMap<NodeId, ExecutionNode>,
    piles: HashMap<Addr, Vec<NodeId>>,
    root: Option<NodeId>,
    pub(crate) status: GraphStatus,
    pub(crate) heap: Heap,
}

impl ExecutionGraph {
    pub(crate) fn new(method: Method, entry: MethodState) -> Self {
        Self {
            method,
            entry,
            nodes: SlotMap::with_key(),
            piles: HashMap::new(),
            root: None,
            status: GraphStatus::Completed,
            heap: Heap::default(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    pub fn into_method(self) -> Method {
        self.method
    }

    /// The state execution started from.
    pub fn entry(&self) -> &MethodState {
        &self.entry
    }

    pub fn status(&self) -> GraphStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == GraphStatus::Completed
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ExecutionNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ExecutionNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ExecutionNode)> + '_ {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pile(&self, addr: Addr) -> &[NodeId] {
        self.piles.get(&addr).map_or(&[], Vec::as_slice)
    }

    pub fn node_pile(&self, addr: Addr) -> impl Iterator<Item = &ExecutionNode> + '_ {
        self.pile(addr).iter().map(|&id| &self.nodes[id])
    }

    pub fn was_address_reached(&self, addr: Addr) -> bool {
        !self.pile(addr).is_empty()
    }

    /// Reached addresses in ascending order.
    pub fn addresses(&self) -> Vec<Addr> {
        let mut addrs = self
            .piles
            .iter()
            .filter(|(_, pile)| !pile.is_empty())
            .map(|(&addr, _)| addr)
            .collect::<Vec<_>>();
        addrs.sort_unstable();

        addrs
    }

    pub fn terminal_nodes(&self) -> impl Iterator<Item = &ExecutionNode> + '_ {
        self.nodes.values().filter(|node| node.is_terminal())
    }

    pub fn is_interned(&self, value: &Value) -> bool {
        self.heap.is_interned(value)
    }

    /// The value `reg` holds after the instruction at `addr` in every node of its pile,
    /// if they all agree on a known value.
    pub fn consensus(&self, addr: Addr, reg: Reg) -> Option<Value> {
        let mut values = self.node_pile(addr).map(|node| node.state.peek(reg));
        let first = values.next()??;

        if !first.is_known() {
            return None;
        }

        values
            .all(|value| value == Some(first))
            .then(|| first.clone())
    }

    pub(crate) fn add_node(
        &mut self,
        addr: Addr,
        pre: MethodState,
        state: MethodState,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = self.nodes.insert(ExecutionNode {
            addr,
            pre,
            state,
            parents: parent.into_iter().collect(),
            children: vec![],
            truncated: false,
        });

        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.root = Some(id),
        }

        self.piles.entry(addr).or_default().push(id);

        id
    }

    /// Drops every node at `addr`, linking each parent straight to the removed
    /// node's children.
    pub fn remove_pile(&mut self, addr: Addr) -> Vec<NodeId> {
        let pile = self.piles.remove(&addr).unwrap_or_default();

        for &id in &pile {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };

            let children = node
                .children
                .iter()
                .copied()
                .filter(|&child| child != id && self.nodes.contains_key(child))
                .collect::<Vec<_>>();
            let parents = node
                .parents
                .iter()
                .copied()
                .filter(|&parent| parent != id && self.nodes.contains_key(parent))
                .collect::<Vec<_>>();

            for &parent in &parents {
                let siblings = &mut self.nodes[parent].children;
                siblings.retain(|&sibling| sibling != id);

                for &child in &children {
                    if !siblings.contains(&child) {
                        siblings.push(child);
                    }
                }
            }

            for &child in &children {
                let node = &mut self.nodes[child];
                node.parents.retain(|&parent| parent != id);

                for &parent in &parents {
                    if !node.parents.contains(&parent) {
                        node.parents.push(parent);
                    }
                }
            }

            if self.root == Some(id) {
                self.root = children.first().copied();
            }
        }

        trace!("removed {} nodes at {addr}", pile.len());

        pile
    }

    /// Moves nodes and piles to the addresses their instructions now live at.
    pub fn relocate(&mut self, relocation: &Relocation) {
        let stale = self
            .piles
            .keys()
            .copied()
            .filter(|&addr| relocation.insn(addr).is_none())
            .collect::<Vec<_>>();

        for addr in stale {
            self.remove_pile(addr);
        }

        for (addr, pile) in std::mem::take(&mut self.piles) {
            if let Some(new_addr) = relocation.insn(addr) {
                for &id in &pile {
                    self.nodes[id].addr = new_addr;
                }

                self.piles.insert(new_addr, pile);
            }
        }
    }

    /// Widens every recorded state after the method gained `count` local registers.
    pub fn insert_locals(&mut self, count: u16) {
        self.entry.insert_locals(count);

        for node in self.nodes.values_mut() {
            node.pre.insert_locals(count);
            node.state.insert_locals(count);
        }
    }

    /// Re-executes the instruction at `addr` from each node's pre-state.
    ///
    /// Returns `false` if some node would now reach different addresses, in which case
    /// the graph no longer describes the method and has to be rebuilt.
    pub fn reapply(&mut self, vm: &Vm, addr: Addr) -> Result<bool, VmError> {
        let pile = self.pile(addr).to_vec();

        for id in pile {
            let mut budget = Budget::new(vm.options());
            let step = Interpreter::new(vm, &self.method, &mut self.heap, &mut budget, 0)
                .apply(addr, &self.nodes[id].pre)?;

            let mut expected = self.nodes[id]
                .children
                .iter()
                .map(|&child| self.nodes[child].addr)
                .collect::<Vec<_>>();
            let mut actual = step.successors.iter().map(|(addr, _)| *addr).collect::<Vec<_>>();
            expected.sort_unstable();
            expected.dedup();
            actual.sort_unstable();
            actual.dedup();

            self.nodes[id].state = step.state;

            if !self.nodes[id].truncated && expected != actual {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
