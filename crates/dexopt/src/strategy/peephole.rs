use std::rc::Rc;

use log::{debug, trace};

use dexvm::insn::InvokeKind;
use dexvm::state::Reg;
use dexvm::ty::{self, MethodRef};
use dexvm::value::Literal;
use dexvm::{Addr, ExecutionGraph, Insn, Ty, Value};

use super::{Category, Counts, Outcome, Strategy};
use crate::manipulator::{Manipulator, ManipulatorError};

const FOR_NAME: &str = "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;";
const STRING_FROM_BYTES: &str = "Ljava/lang/String;-><init>([B)V";

/// Local rewrites of single calls and casts whose operands are known on every path.
#[derive(Default)]
pub struct Peephole {
    counts: Counts,
}

impl Peephole {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
enum Rewrite {
    /// `Class.forName` followed by its `move-result`.
    ClassForName { dst: Reg, class: Ty },
    StringInit { receiver: Reg, content: Rc<str> },
    RedundantCast,
}

fn is_call(method: &MethodRef, text: &str) -> bool {
    method.to_string() == text
}

/// The value every node in the pile agrees on.
fn agree<T: PartialEq>(graph: &ExecutionGraph, addr: Addr, f: impl Fn(&Value) -> Option<T>, reg: Reg) -> Option<T> {
    let mut values = graph
        .node_pile(addr)
        .map(|node| node.pre.read(reg).ok().as_ref().and_then(&f));
    let first = values.next()??;

    values.all(|value| value.as_ref() == Some(&first)).then_some(first)
}

fn find(graph: &ExecutionGraph, addr: Addr, insn: &Insn) -> Option<Rewrite> {
    match insn {
        Insn::Invoke {
            kind: InvokeKind::Static,
            method,
            args,
        } if is_call(method, FOR_NAME) => {
            let next = graph.method().next_addr(addr)?;
            let &Insn::MoveResult { dst } = graph.method().insn_at(next)? else {
                return None;
            };

            let name = agree(graph, addr, |value| value.as_str().map(str::to_owned), *args.first()?)?;

            Some(Rewrite::ClassForName {
                dst,
                class: Ty::from_java_name(&name),
            })
        }

        Insn::Invoke {
            kind: InvokeKind::Direct,
            method,
            args,
        } if is_call(method, STRING_FROM_BYTES) => {
            let (&receiver, &bytes) = (args.first()?, args.get(1)?);
            let bytes = agree(graph, addr, Value::as_bytes, bytes)?;

            // other registers holding the same uninitialized string would go stale
            let unaliased = graph.node_pile(addr).all(|node| {
                node.pre
                    .registers()
                    .filter(|(_, value)| matches!(value, Value::Uninit(class) if class.as_str() == ty::STRING))
                    .map(|(reg, _)| reg)
                    .eq([receiver])
            });

            unaliased.then(|| Rewrite::StringInit {
                receiver,
                content: String::from_utf8_lossy(&bytes).into(),
            })
        }

        Insn::CheckCast { reg, ty } => {
            let mut pile = graph.node_pile(addr).peekable();
            pile.peek()?;

            pile.all(|node| match node.pre.peek(*reg) {
                Some(Value::Null(_)) => true,
                Some(value) => value.is_known() && !matches!(value, Value::Uninit(_)) && &value.ty() == ty,
                None => false,
            })
            .then_some(Rewrite::RedundantCast)
        }

        _ => None,
    }
}

impl Strategy for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn perform(&mut self, manipulator: &mut Manipulator<'_>) -> Result<Outcome, ManipulatorError> {
        // piles of an aborted graph are partial
        if !manipulator.graph().is_complete() {
            return Ok(Outcome::Unchanged);
        }

        let graph = manipulator.graph();
        let mut rewrites = graph
            .method()
            .iter()
            .filter(|&(addr, _)| graph.was_address_reached(addr))
            .filter_map(|(addr, insn)| Some((addr, find(graph, addr, insn)?)))
            .collect::<Vec<_>>();
        let changed = !rewrites.is_empty();

        while let Some((addr, rewrite)) = rewrites.pop() {
            trace!("{}: {rewrite:?} at {addr}", self.name());

            match rewrite {
                Rewrite::ClassForName { dst, class } => {
                    let next = manipulator
                        .method()
                        .next_addr(addr)
                        .ok_or(ManipulatorError::NoInstruction(addr))?;
                    manipulator.remove(next)?;
                    manipulator.replace(
                        addr,
                        Insn::Const {
                            dst,
                            value: Literal::Class(class),
                        },
                    )?;
                    manipulator.refresh(addr)?;
                    self.counts.add(Category::PeepClassForName, 1);
                }

                Rewrite::StringInit { receiver, content } => {
                    manipulator.replace(
                        addr,
                        Insn::Const {
                            dst: receiver,
                            value: Literal::String(content),
                        },
                    )?;
                    manipulator.refresh(addr)?;
                    self.counts.add(Category::PeepStringInit, 1);
                }

                Rewrite::RedundantCast => {
                    manipulator.remove(addr)?;
                    self.counts.add(Category::PeepCheckCast, 1);
                }
            }
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
