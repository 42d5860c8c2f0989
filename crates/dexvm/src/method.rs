use std::fmt::{self, Display};

use hashbrown::HashMap;
use log::trace;

use crate::error::VmError;
use crate::insn::Insn;
use crate::state::Reg;
use crate::ty::{AccessFlags, MethodRef, Ty};

/// A code-unit offset into a method body.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub u32);

impl Addr {
    pub fn offset(self, units: u32) -> Self {
        Self(self.0 + units)
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    /// `None` catches everything.
    pub ty: Option<Ty>,
    pub target: Addr,
}

/// Covers the instructions in `start..end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    pub start: Addr,
    pub end: Addr,
    pub handlers: Vec<Handler>,
}

impl TryBlock {
    pub fn covers(&self, addr: Addr) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// How an edit moved addresses around.
#[derive(Debug, Default, Clone)]
pub struct Relocation {
    /// Where each surviving instruction now lives.
    pub insns: HashMap<Addr, Addr>,
    /// Where a jump to each old address now lands, including the end of the method.
    pub labels: HashMap<Addr, Addr>,
}

impl Relocation {
    pub fn insn(&self, addr: Addr) -> Option<Addr> {
        self.insns.get(&addr).copied()
    }

    pub fn label(&self, addr: Addr) -> Addr {
        self.labels.get(&addr).copied().unwrap_or(addr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub reference: MethodRef,
    pub flags: AccessFlags,
    pub tries: Vec<TryBlock>,
    locals: u16,
    // invariant: addrs[i] is the address of insns[i]
    insns: Vec<Insn>,
    addrs: Vec<Addr>,
}

impl Method {
    pub fn new(
        reference: MethodRef,
        flags: AccessFlags,
        locals: u16,
        insns: Vec<Insn>,
        tries: Vec<TryBlock>,
    ) -> Self {
        let mut method = Self {
            reference,
            flags,
            tries,
            locals,
            insns,
            addrs: vec![],
        };
        method.layout();

        method
    }

    fn layout(&mut self) {
        let mut addr = Addr(0);
        self.addrs.clear();

        for insn in &self.insns {
            self.addrs.push(addr);
            addr = addr.offset(insn.code_units());
        }
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::STATIC)
    }

    pub fn is_native_or_abstract(&self) -> bool {
        self.flags.intersects(AccessFlags::NATIVE | AccessFlags::ABSTRACT)
    }

    /// Parameter registers, counting `this` for instance methods.
    pub fn param_count(&self) -> u16 {
        self.reference.params.len() as u16 + !self.is_static() as u16
    }

    /// Types of the parameter registers in order, `this` first for instance methods.
    pub fn param_tys(&self) -> Vec<Ty> {
        let this = (!self.is_static()).then(|| self.reference.class.clone());

        this.into_iter()
            .chain(self.reference.params.iter().cloned())
            .collect()
    }

    pub fn locals(&self) -> u16 {
        self.locals
    }

    pub fn register_count(&self) -> u16 {
        self.locals + self.param_count()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn addrs(&self) -> &[Addr] {
        &self.addrs
    }

    pub fn iter(&self) -> impl Iterator<Item = (Addr, &Insn)> + '_ {
        self.addrs.iter().copied().zip(&self.insns)
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// The address one past the last instruction.
    pub fn end(&self) -> Addr {
        match (self.addrs.last(), self.insns.last()) {
            (Some(&addr), Some(insn)) => addr.offset(insn.code_units()),
            _ => Addr(0),
        }
    }

    pub fn index_of(&self, addr: Addr) -> Option<usize> {
        self.addrs.binary_search(&addr).ok()
    }

    pub fn insn_at(&self, addr: Addr) -> Option<&Insn> {
        self.index_of(addr).map(|idx| &self.insns[idx])
    }

    /// The address control falls through to from `addr`, if an instruction lives there.
    pub fn next_addr(&self, addr: Addr) -> Option<Addr> {
        let idx = self.index_of(addr)?;

        self.addrs.get(idx + 1).copied()
    }

    pub fn handlers_at(&self, addr: Addr) -> impl Iterator<Item = &Handler> + '_ {
        self.tries
            .iter()
            .filter(move |block| block.covers(addr))
            .flat_map(|block| &block.handlers)
    }

    pub fn is_handler(&self, addr: Addr) -> bool {
        self.tries
            .iter()
            .flat_map(|block| &block.handlers)
            .any(|handler| handler.target == addr)
    }

    /// Checks that every register and address the body mentions exists.
    pub fn validate(&self) -> Result<(), VmError> {
        let count = self.register_count();

        for insn in &self.insns {
            for reg in insn.reads().into_iter().chain(insn.writes()) {
                if reg >= count {
                    return Err(VmError::InvalidRegister { reg, count });
                }
            }

            for target in insn.targets() {
                if self.index_of(target).is_none() {
                    return Err(VmError::InvalidAddress(target));
                }
            }
        }

        for block in &self.tries {
            for handler in &block.handlers {
                if self.index_of(handler.target).is_none() {
                    return Err(VmError::InvalidAddress(handler.target));
                }
            }
        }

        Ok(())
    }

    /// Replaces `remove` instructions starting at `idx` with `insns`.
    ///
    /// Branch targets inside `insns` are given in pre-edit addresses. Jumps to a removed
    /// instruction land on whatever now occupies its position. When nothing is removed,
    /// `retarget` decides whether jumps to the instruction at `idx` land on the
    /// inserted code or keep going to the original instruction.
    pub fn splice(&mut self, idx: usize, remove: usize, insns: Vec<Insn>, retarget: bool) -> Relocation {
        let old_addrs = self.addrs.clone();
        let old_end = self.end();
        let inserted = insns.len();

        self.insns.splice(idx..idx + remove, insns);
        self.layout();

        let new_end = self.end();
        let new_addr = |new_idx: usize| self.addrs.get(new_idx).copied().unwrap_or(new_end);
        let mut relocation = Relocation::default();

        for (old_idx, &old_addr) in old_addrs.iter().enumerate() {
            let label_idx = if old_idx < idx {
                relocation.insns.insert(old_addr, new_addr(old_idx));
                old_idx
            } else if old_idx < idx + remove {
                idx
            } else {
                let new_idx = old_idx - remove + inserted;
                relocation.insns.insert(old_addr, new_addr(new_idx));

                if old_idx == idx && retarget {
                    idx
                } else {
                    new_idx
                }
            };

            relocation.labels.insert(old_addr, new_addr(label_idx));
        }

        relocation.labels.insert(old_end, new_end);
        self.relocate(&relocation);
        trace!("spliced {inserted} instructions in place of {remove} at index {idx}");

        relocation
    }

    fn relocate(&mut self, relocation: &Relocation) {
        for insn in &mut self.insns {
            for target in insn.targets_mut() {
                *target = relocation.label(*target);
            }
        }

        for block in &mut self.tries {
            block.start = relocation.label(block.start);
            block.end = relocation.label(block.end);

            for handler in &mut block.handlers {
                handler.target = relocation.label(handler.target);
            }
        }

        self.tries.retain(|block| block.start < block.end);
    }

    /// Grows the local register range by `count`, moving parameter registers up.
    pub fn add_locals(&mut self, count: u16) {
        let locals = self.locals;

        for insn in &mut self.insns {
            for reg in insn.regs_mut() {
                if *reg >= locals {
                    *reg += count;
                }
            }
        }

        self.locals += count;
    }

    pub fn reg_name(&self, reg: Reg) -> String {
        if reg >= self.locals {
            format!("p{}", reg - self.locals)
        } else {
            format!("v{reg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::Cmp;
    use crate::value::Literal;

    fn method(insns: Vec<Insn>) -> Method {
        Method::new(
            "Lt;->m(I)V".parse().unwrap(),
            AccessFlags::STATIC,
            1,
            insns,
            vec![],
        )
    }

    #[test]
    fn test_layout_uses_code_units() {
        let method = method(vec![
            Insn::Const {
                dst: 0,
                value: Literal::Long(1),
            },
            Insn::Nop,
            Insn::ReturnVoid,
        ]);

        assert_eq!(method.addrs(), &[Addr(0), Addr(5), Addr(6)]);
        assert_eq!(method.end(), Addr(7));
        assert_eq!(method.next_addr(Addr(5)), Some(Addr(6)));
        assert_eq!(method.insn_at(Addr(1)), None);
    }

    #[test]
    fn test_removal_retargets_jumps_to_successor() {
        let mut method = method(vec![
            Insn::If {
                cmp: Cmp::Eq,
                lhs: 1,
                rhs: None,
                target: Addr(3),
            },
            Insn::Nop,
            Insn::ReturnVoid,
        ]);

        let relocation = method.splice(1, 1, vec![], false);

        assert_eq!(method.addrs(), &[Addr(0), Addr(2)]);
        assert_eq!(method.insns()[0].targets(), vec![Addr(2)]);
        assert_eq!(relocation.insn(Addr(3)), Some(Addr(2)));
        assert_eq!(relocation.insn(Addr(2)), None);
    }

    #[test]
    fn test_insertion_can_keep_or_take_jumps() {
        let insns = vec![
            Insn::Goto { target: Addr(3) },
            Insn::ReturnVoid,
        ];

        let mut keep = method(insns.clone());
        keep.splice(1, 0, vec![Insn::Nop], false);
        assert_eq!(keep.insns()[0].targets(), vec![Addr(4)]);

        let mut take = method(insns);
        take.splice(1, 0, vec![Insn::Nop], true);
        assert_eq!(take.insns()[0].targets(), vec![Addr(3)]);
    }

    #[test]
    fn test_add_locals_shifts_params() {
        let mut method = method(vec![Insn::Return { src: 1 }]);
        method.add_locals(2);

        assert_eq!(method.insns()[0], Insn::Return { src: 3 });
        assert_eq!(method.register_count(), 4);
        assert!(method.validate().is_ok());
    }
}
