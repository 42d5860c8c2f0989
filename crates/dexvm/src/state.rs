use std::fmt::{self, Display};

use bitvec::prelude::*;

use crate::error::VmError;
use crate::value::{InstanceId, Value};

pub type Reg = u16;

/// A register file: `locals` local registers followed by `params` parameter registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodState {
    // invariant: registers.len() == assigned.len() == locals + params
    registers: Vec<Value>,
    assigned: BitVec,
    locals: u16,
    params: u16,
    result: Option<Value>,
    exception: Option<Value>,
}

impl MethodState {
    pub fn new(locals: u16, params: u16) -> Self {
        let count = (locals + params) as usize;

        Self {
            registers: vec![Value::unknown(crate::ty::OBJECT); count],
            assigned: bitvec![0; count],
            locals,
            params,
            result: None,
            exception: None,
        }
    }

    pub fn locals(&self) -> u16 {
        self.locals
    }

    pub fn params(&self) -> u16 {
        self.params
    }

    pub fn register_count(&self) -> u16 {
        self.locals + self.params
    }

    /// The register holding parameter `idx`.
    pub fn param_reg(&self, idx: u16) -> Reg {
        self.locals + idx
    }

    pub fn is_param(&self, reg: Reg) -> bool {
        reg >= self.locals && reg < self.register_count()
    }

    fn check(&self, reg: Reg) -> Result<usize, VmError> {
        if reg < self.register_count() {
            Ok(reg as usize)
        } else {
            Err(VmError::InvalidRegister {
                reg,
                count: self.register_count(),
            })
        }
    }

    /// Reads a register. A register nothing has written yet reads as unknown.
    pub fn read(&self, reg: Reg) -> Result<Value, VmError> {
        let idx = self.check(reg)?;

        Ok(self.registers[idx].clone())
    }

    /// The register's value if it has been assigned.
    pub fn peek(&self, reg: Reg) -> Option<&Value> {
        let idx = reg as usize;

        self.assigned
            .get(idx)
            .is_some_and(|bit| *bit)
            .then(|| &self.registers[idx])
    }

    pub fn is_assigned(&self, reg: Reg) -> bool {
        self.peek(reg).is_some()
    }

    pub fn assign(&mut self, reg: Reg, value: Value) -> Result<(), VmError> {
        let idx = self.check(reg)?;
        self.registers[idx] = value;
        self.assigned.set(idx, true);

        Ok(())
    }

    pub fn assign_param(&mut self, idx: u16, value: Value) -> Result<(), VmError> {
        self.assign(self.param_reg(idx), value)
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, value: Option<Value>) {
        self.result = value;
    }

    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    pub fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, value: Option<Value>) {
        self.exception = value;
    }

    /// Replaces every register referring to instance `id` with `value`.
    pub fn update_instance(&mut self, id: InstanceId, value: &Value) {
        for (idx, register) in self.registers.iter_mut().enumerate() {
            if self.assigned[idx] && register.instance_id() == Some(id) {
                *register = value.clone();
            }
        }

        if let Some(result) = &mut self.result {
            if result.instance_id() == Some(id) {
                *result = value.clone();
            }
        }
    }

    /// Grows the local register range by `count`. Parameter registers move up.
    pub fn insert_locals(&mut self, count: u16) {
        let at = self.locals as usize;
        let fresh = (0..count).map(|_| Value::unknown(crate::ty::OBJECT));
        self.registers.splice(at..at, fresh);

        for _ in 0..count {
            self.assigned.insert(at, false);
        }

        self.locals += count;
    }

    pub fn registers(&self) -> impl Iterator<Item = (Reg, &Value)> + '_ {
        self.assigned
            .iter_ones()
            .map(|idx| (idx as Reg, &self.registers[idx]))
    }

    /// The register's name as printed: `vN` for locals, `pN` for parameters.
    pub fn reg_name(&self, reg: Reg) -> String {
        if self.is_param(reg) {
            format!("p{}", reg - self.locals)
        } else {
            format!("v{reg}")
        }
    }
}

impl Display for MethodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "params: {}, locals: {}", self.params, self.locals)?;

        for (reg, value) in self.registers() {
            write!(
                f,
                "\n{}: type={}, value={value}",
                self.reg_name(reg),
                value.ty()
            )?;
        }

        Ok(())
    }
}
