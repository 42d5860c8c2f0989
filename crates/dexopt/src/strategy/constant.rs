use log::{debug, trace};

use dexvm::value::{self, Literal};
use dexvm::{Addr, ExecutionGraph, Insn, Value};

use super::{Category, Counts, Outcome, Strategy};
use crate::manipulator::{Manipulator, ManipulatorError};

/// Replaces computations with constant loads and decided branches with jumps, wherever
/// every execution of the instruction agrees.
#[derive(Default)]
pub struct ConstantPropagation {
    counts: Counts,
}

impl ConstantPropagation {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
enum Plan {
    Load(Insn),
    Jump(Addr),
    FallThrough,
}

/// The value every item agrees on. Fails on an empty sequence.
fn agree<T: PartialEq>(mut items: impl Iterator<Item = Option<T>>) -> Option<T> {
    let first = items.next()??;

    for item in items {
        if item.as_ref() != Some(&first) {
            return None;
        }
    }

    Some(first)
}

fn branch(next: Addr, taken: Addr) -> Plan {
    if taken == next {
        Plan::FallThrough
    } else {
        Plan::Jump(taken)
    }
}

fn plan(graph: &ExecutionGraph, addr: Addr, insn: &Insn) -> Option<(Plan, Category)> {
    let next = graph.method().next_addr(addr)?;
    let pre = |reg| graph.node_pile(addr).map(move |node| node.pre.read(reg).ok());

    match insn {
        Insn::If {
            cmp,
            lhs,
            rhs,
            target,
        } => {
            let taken = agree(graph.node_pile(addr).map(|node| {
                let lhs = node.pre.read(*lhs).ok()?;
                let rhs = match rhs {
                    Some(rhs) => node.pre.read(*rhs).ok()?,
                    None => Value::Int(0),
                };

                value::compare(*cmp, &lhs, &rhs)
            }))?;
            let dest = if taken { *target } else { next };

            Some((branch(next, dest), Category::ConstantPredicate))
        }

        Insn::Switch { src, cases } => {
            let key = agree(pre(*src).map(|value| value?.as_i32()))?;
            let dest = cases
                .iter()
                .find(|&&(case, _)| case == key)
                .map_or(next, |&(_, target)| target);

            Some((branch(next, dest), Category::ConstantSwitch))
        }

        Insn::Move { .. }
        | Insn::MoveResult { .. }
        | Insn::Unary { .. }
        | Insn::Binary { .. }
        | Insn::Compare { .. }
        | Insn::ArrayLength { .. }
        | Insn::ArrayGet { .. }
        | Insn::InstanceOf { .. } => {
            let dst = insn.writes()?;

            // a node that threw never assigned the result
            let falls_through = graph.node_pile(addr).all(|node| {
                !node.children.is_empty()
                    && node
                        .children
                        .iter()
                        .all(|&child| graph.node(child).addr == next)
            });

            if !falls_through {
                return None;
            }

            let value = graph.consensus(addr, dst)?;

            // `const-string` would trade a fresh instance for the interned one
            if value.as_str().is_some() && !graph.is_interned(&value) {
                return None;
            }

            let value: Literal = value.to_literal()?;

            Some((Plan::Load(Insn::Const { dst, value }), Category::ConstantPropagation))
        }

        _ => None,
    }
}

impl Strategy for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant propagation"
    }

    fn perform(&mut self, manipulator: &mut Manipulator<'_>) -> Result<Outcome, ManipulatorError> {
        // piles of an aborted graph are partial
        if !manipulator.graph().is_complete() {
            return Ok(Outcome::Unchanged);
        }

        let graph = manipulator.graph();
        let mut plans = graph
            .method()
            .iter()
            .filter(|&(addr, _)| graph.was_address_reached(addr))
            .filter_map(|(addr, insn)| plan(graph, addr, insn).map(|(plan, category)| (addr, plan, category)))
            .collect::<Vec<_>>();
        let mut changed = false;

        // back to front, so pending addresses stay valid
        while let Some((addr, plan, category)) = plans.pop() {
            trace!("{}: {plan:?} at {addr}", self.name());

            let relocation = match plan {
                Plan::Load(insn) => manipulator.replace(addr, insn)?,
                Plan::Jump(target) => manipulator.replace(addr, Insn::Goto { target })?,

                Plan::FallThrough => match manipulator.remove(addr) {
                    Ok(relocation) => relocation,
                    Err(ManipulatorError::WouldDisconnect(_)) => continue,
                    Err(e) => return Err(e),
                },
            };

            for (_, plan, _) in &mut plans {
                if let Plan::Jump(target) = plan {
                    *target = relocation.label(*target);
                }
            }

            self.counts.add(category, 1);
            changed = true;
        }

        if !changed {
            return Ok(Outcome::Unchanged);
        }

        debug!("{}: {}", self.name(), self.counts);

        Ok(Outcome::Changed)
    }

    fn counts(&self) -> &Counts {
        &self.counts
    }
}
