//! Turns reflective `Method.invoke` calls with a known target into direct calls.
//!
//! The argument array is unpacked into fresh locals, primitives are unboxed, and a
//! primitive result is boxed again so the following `move-result-object` still sees an
//! object. The rewritten call may now be executed for real, so the graph is rebuilt
//! afterwards.

use log::{debug, trace};

use dexvm::insn::InvokeKind;
use dexvm::state::Reg;
use dexvm::ty::{AccessFlags, MethodRef};
use dexvm::value::Literal;
use dexvm::{Addr, ExecutionGraph, Insn, Ty, Value, Vm};

use super::{Category, Counts, Outcome, Strategy};
use crate::manipulator::{Manipulator, ManipulatorError};

const METHOD_INVOKE: &str =
    "Ljava/lang/reflect/Method;->invoke(Ljava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;";

/// Box class and unboxing method for each primitive descriptor.
const BOXES: [(&str, &str, &str); 8] = [
    ("Z", "Ljava/lang/Boolean;", "booleanValue"),
    ("B", "Ljava/lang/Byte;", "byteValue"),
    ("C", "Ljava/lang/Character;", "charValue"),
    ("S", "Ljava/lang/Short;", "shortValue"),
    ("I", "Ljava/lang/Integer;", "intValue"),
    ("J", "Ljava/lang/Long;", "longValue"),
    ("F", "Ljava/lang/Float;", "floatValue"),
    ("D", "Ljava/lang/Double;", "doubleValue"),
];

fn box_of(primitive: &Ty) -> Option<(Ty, &'static str)> {
    BOXES
        .iter()
        .find(|&&(desc, _, _)| desc == primitive.as_str())
        .map(|&(_, class, getter)| (Ty::new(class), getter))
}

fn unbox(reg: Reg, primitive: &Ty) -> Vec<Insn> {
    let Some((class, getter)) = box_of(primitive) else {
        return vec![];
    };

    vec![
        Insn::CheckCast {
            reg,
            ty: class.clone(),
        },
        Insn::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodRef {
                class,
                name: getter.into(),
                params: vec![],
                ret: primitive.clone(),
            },
            args: vec![reg],
        },
        Insn::MoveResult { dst: reg },
    ]
}

fn rebox(reg: Reg, primitive: &Ty) -> Vec<Insn> {
    let Some((class, _)) = box_of(primitive) else {
        return vec![];
    };

    vec![
        Insn::MoveResult { dst: reg },
        Insn::Invoke {
            kind: InvokeKind::Static,
            method: MethodRef {
                class: class.clone(),
                name: "valueOf".into(),
                params: vec![primitive.clone()],
                ret: class,
            },
            args: vec![reg],
        },
    ]
}

#[derive(Debug)]
struct Site {
    addr: Addr,
    target: MethodRef,
    kind: InvokeKind,
}

#[derive(Default)]
pub struct Unreflection {
    counts: Counts,
}

impl Unreflection {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find(vm: &Vm, graph: &ExecutionGraph, addr: Addr, insn: &Insn) -> Option<Site> {
    let Insn::Invoke {
        kind: InvokeKind::Virtual,
        method,
        args,
    } = insn
    else {
        return None;
    };

    if method.to_string() != METHOD_INVOKE {
        return None;
    }

    let (&handle, &argv) = (args.first()?, args.get(2)?);
    let mut pile = graph.node_pile(addr);

    let first = pile.next()?;
    let target = first.pre.peek(handle)?.as_method()?.clone();
    let length = |value: Option<&Value>| match value? {
        Value::Array(array) => array.length,
        Value::Null(_) => Some(0),
        _ => None,
    };
    let argc = length(first.pre.peek(argv))?;

    let agrees = pile.all(|node| {
        node.pre.peek(handle).and_then(Value::as_method) == Some(&target)
            && length(node.pre.peek(argv)) == Some(argc)
    });

    if !agrees || argc != target.params.len() || target.is_constructor() {
        return None;
    }

    let (_, flags) = vm
        .classes()
        .find_method(&target.class, &target.name, &target.params)?;
    let own_class = target.class == graph.method().reference.class;

    // the direct call must pass the verifier from this class
    if !own_class && !flags.contains(AccessFlags::PUBLIC) {
        return None;
    }

    let kind = if flags.contains(AccessFlags::STATIC) {
        InvokeKind::Static
    } else if flags.contains(AccessFlags::PRIVATE) {
        InvokeKind::Direct
    } else {
        InvokeKind::Virtual
    };

    Some(Site { addr, target, kind })
}

/// The direct-call sequence replacing `Method.invoke`. `scratch` is the first of
/// `argc + 2` fresh locals.
fn lower(site: &Site, receiver: Reg, argv: Reg, scratch: Reg) -> Vec<Insn> {
    let index = scratch;
    let this = scratch + 1;
    let params = (0..site.target.params.len() as Reg)
        .map(|idx| scratch + 2 + idx)
        .collect::<Vec<_>>();
    let mut insns = vec![];

    if site.kind != InvokeKind::Static {
        insns.push(Insn::Move {
            dst: this,
            src: receiver,
        });
        insns.push(Insn::CheckCast {
            reg: this,
            ty: site.target.class.clone(),
        });
    }

    for (idx, (&reg, ty)) in params.iter().zip(&site.target.params).enumerate() {
        insns.push(Insn::Const {
            dst: index,
            value: Literal::Int(idx as i32),
        });
        insns.push(Insn::ArrayGet {
            dst: reg,
            array: argv,
            index,
        });

        if ty.is_primitive() {
            insns.extend(unbox(reg, ty));
        } else if ty != &Ty::object() {
            insns.push(Insn::CheckCast { reg, ty: ty.clone() });
        }
    }

    let args = match site.kind {
        InvokeKind::Static => params,
        _ => [this].into_iter().chain(params).collect(),
    };

    insns.push(Insn::Invoke {
        kind: site.kind,
        method: site.target.clone(),
        args,
    });

    if site.target.ret.is_primitive() {
        insns.extend(rebox(index, &site.target.ret));
    }

    insns
}

impl Strategy for Unreflection {
    fn name(&self) -> &'static str {
        "unreflection"
    }

    fn perform(&mut self, manipulator: &mut Manipulator<'_>) -> Result<Outcome, ManipulatorError> {
        if !manipulator.graph().is_complete() {
            return Ok(Outcome::Unchanged);
        }

        let vm = manipulator.vm();
        let graph = manipulator.graph();
        let mut sites = graph
            .method()
            .iter()
            .filter(|&(addr, _)| graph.was_address_reached(addr))
            .filter_map(|(addr, insn)| find(vm, graph, addr, insn))
            .collect::<Vec<_>>();

        if sites.is_empty() {
            return Ok(Outcome::Unchanged);
        }

        while let Some(site) = sites.pop() {
            trace!("{}: {} at {}", self.name(), site.target, site.addr);

            let argc = site.target.params.len() as u16;
            let scratch = manipulator.method().locals();
            manipulator.add_locals(argc + 2);

            // registers were renumbered
            let Insn::Invoke { args, .. } = manipulator.get_instruction(site.addr)? else {
                return Err(ManipulatorError::NoInstruction(site.addr));
            };
            let (receiver, argv) = (args[1], args[2]);

            let next = manipulator.method().next_addr(site.addr);

            // a void target leaves no result; `Method.invoke` would have returned null
            if let (true, Some(next)) = (site.target.ret.is_void(), next) {
                if let Some(&Insn::MoveResult { dst }) = manipulator.method().insn_at(next) {
                    manipulator.replace(
                        next,
                        Insn::Const {
                            dst,
                            value: Literal::Null,
                        },
                    )?;
                }
            }

            let insns = lower(&site, receiver, argv, scratch);
            manipulator.replace_many(site.addr, insns)?;
            self.counts.add(Category::Unreflection, 1);
        }

        manipulator.request_reexecution();
        debug!("{}: {}", self.name(), self.counts);

        Ok(Outcome::ReexecuteNeeded)
    }

    fn counts(&self) -> &Counts {
        &self.counts
    }
}
