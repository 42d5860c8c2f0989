//! Instruction semantics: one abstract step from a pre-state to a post-state and the
//! addresses control may reach next.

use std::rc::Rc;

use hashbrown::HashMap;
use log::{debug, trace};

use crate::emulate::{self, Effect};
use crate::error::VmError;
use crate::insn::{BinOp, Insn, InvokeKind, NumTy, Operand, UnOp};
use crate::method::{Addr, Method};
use crate::state::{MethodState, Reg};
use crate::ty::{self, MethodRef, Ty};
use crate::value::{self, Array, InstanceId, Literal, Object, ObjectData, Value};
use crate::vm::{Budget, Vm};

/// Arrays longer than this are tracked by length only.
const MAX_TRACKED_ELEMENTS: usize = 1 << 16;

/// Hands out instance identities and interns string literals.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    next: u32,
    interned: HashMap<Rc<str>, InstanceId>,
}

impl Heap {
    /// A heap whose fresh ids don't collide with any instance already in `state`.
    pub fn after(state: &MethodState) -> Self {
        let next = state
            .registers()
            .filter_map(|(_, value)| value.instance_id())
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or(0);

        Self {
            next,
            interned: HashMap::new(),
        }
    }

    pub fn alloc(&mut self) -> InstanceId {
        let id = InstanceId(self.next);
        self.next += 1;

        id
    }

    pub fn object(&mut self, ty: Ty, data: ObjectData) -> Value {
        Value::Object(Object {
            id: self.alloc(),
            ty,
            data,
        })
    }

    /// A string instance distinct from every other.
    pub fn new_string(&mut self, s: &str) -> Value {
        self.object(Ty::string(), ObjectData::String(s.into()))
    }

    /// Whether `value` is the shared instance of its string literal.
    pub fn is_interned(&self, value: &Value) -> bool {
        match (value.as_str(), value.instance_id()) {
            (Some(s), Some(id)) => self.interned.get(s) == Some(&id),
            _ => false,
        }
    }

    /// The shared instance for a string literal.
    pub fn intern(&mut self, s: &str) -> Value {
        let id = match self.interned.get(s) {
            Some(&id) => id,
            None => {
                let id = self.alloc();
                self.interned.insert(s.into(), id);

                id
            }
        };

        Value::Object(Object {
            id,
            ty: Ty::string(),
            data: ObjectData::String(s.into()),
        })
    }

    pub fn array(&mut self, ty: Ty, length: Option<usize>, elements: Option<Vec<Value>>) -> Value {
        Value::Array(Array {
            id: self.alloc(),
            ty,
            length,
            elements: elements.map(Into::into),
        })
    }

    pub fn literal(&mut self, literal: &Literal) -> Value {
        match literal {
            Literal::Int(v) => Value::Int(*v),
            Literal::Long(v) => Value::Long(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::Boolean(v) => Value::Boolean(*v),
            Literal::Char(v) => Value::Char(*v),
            Literal::Short(v) => Value::Short(*v),
            Literal::Byte(v) => Value::Byte(*v),
            Literal::Null => Value::Null(Ty::object()),
            Literal::String(s) => self.intern(s),
            Literal::Class(ty) => Value::Class(ty.clone()),
        }
    }
}

/// The outcome of executing one instruction.
#[derive(Debug, Clone)]
pub struct Step {
    pub state: MethodState,
    /// Each reachable address with the state control arrives there with.
    pub successors: Vec<(Addr, MethodState)>,
}

enum Flow {
    Next,
    Jump(Vec<Addr>),
    Return,
    Throw(Value),
}

fn exception(name: &str) -> Value {
    Value::unknown(name)
}

pub struct Interpreter<'a> {
    vm: &'a Vm,
    method: &'a Method,
    heap: &'a mut Heap,
    budget: &'a mut Budget,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(vm: &'a Vm, method: &'a Method, heap: &'a mut Heap, budget: &'a mut Budget, depth: usize) -> Self {
        Self {
            vm,
            method,
            heap,
            budget,
            depth,
        }
    }

    pub fn apply(&mut self, addr: Addr, pre: &MethodState) -> Result<Step, VmError> {
        let method = self.method;
        let insn = method.insn_at(addr).ok_or(VmError::InvalidAddress(addr))?;
        trace!("{addr}: {}", insn.display(Some(method.locals())));

        let mut post = pre.clone();
        post.set_result(None);
        post.set_exception(None);

        let mut hazard = None;
        let flow = self.dispatch(addr, insn, pre, &mut post, &mut hazard)?;
        let mut successors = vec![];

        match flow {
            Flow::Next => successors.push((self.fallthrough(addr)?, post.clone())),

            Flow::Jump(targets) => {
                for target in targets {
                    if !successors.iter().any(|(succ, _)| *succ == target) {
                        successors.push((target, post.clone()));
                    }
                }
            }

            Flow::Return => {}
            Flow::Throw(exception) => self.route(addr, pre, &exception, &mut successors),
        }

        if let Some(exception) = hazard {
            self.route(addr, pre, &exception, &mut successors);
        }

        Ok(Step {
            state: post,
            successors,
        })
    }

    fn fallthrough(&self, addr: Addr) -> Result<Addr, VmError> {
        self.method
            .next_addr(addr)
            .ok_or(VmError::InvalidAddress(self.method.end()))
    }

    /// Adds an edge to every handler that may catch `exception`.
    fn route(
        &self,
        addr: Addr,
        pre: &MethodState,
        exception: &Value,
        successors: &mut Vec<(Addr, MethodState)>,
    ) {
        let thrown = exception.ty();

        for handler in self.method.handlers_at(addr) {
            let catches = self.vm.classes().catches(handler.ty.as_ref(), &thrown);

            if catches == Some(false) {
                continue;
            }

            if !successors.iter().any(|(succ, _)| *succ == handler.target) {
                let caught = match (exception, catches) {
                    (Value::Unknown(_), None) => {
                        Value::Unknown(handler.ty.clone().unwrap_or_else(|| thrown.clone()))
                    }
                    _ => exception.clone(),
                };

                let mut state = pre.clone();
                state.set_result(None);
                state.set_exception(Some(caught));
                successors.push((handler.target, state));
            }

            if catches == Some(true) {
                break;
            }
        }
    }

    fn dispatch(
        &mut self,
        addr: Addr,
        insn: &Insn,
        pre: &MethodState,
        post: &mut MethodState,
        hazard: &mut Option<Value>,
    ) -> Result<Flow, VmError> {
        let npe = || exception(ty::NULL_POINTER_EXCEPTION);

        Ok(match insn {
            Insn::Nop => Flow::Next,

            Insn::Const { dst, value } => {
                let value = self.heap.literal(value);
                post.assign(*dst, value)?;

                Flow::Next
            }

            Insn::Move { dst, src } => {
                post.assign(*dst, pre.read(*src)?)?;

                Flow::Next
            }

            Insn::MoveResult { dst } => {
                let result = pre
                    .result()
                    .cloned()
                    .unwrap_or_else(|| Value::unknown(ty::OBJECT));
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::MoveException { dst } => {
                let exception = pre
                    .exception()
                    .cloned()
                    .unwrap_or_else(|| Value::unknown(ty::THROWABLE));
                post.assign(*dst, exception)?;

                Flow::Next
            }

            Insn::ReturnVoid => Flow::Return,

            Insn::Return { src } => {
                pre.read(*src)?;

                Flow::Return
            }

            Insn::Throw { src } => match pre.read(*src)? {
                Value::Null(_) => Flow::Throw(npe()),
                value => Flow::Throw(value),
            },

            Insn::Goto { target } => Flow::Jump(vec![*target]),

            Insn::If {
                cmp,
                lhs,
                rhs,
                target,
            } => {
                let lhs = pre.read(*lhs)?;
                let rhs = match rhs {
                    Some(rhs) => pre.read(*rhs)?,
                    None => Value::Int(0),
                };
                let next = self.fallthrough(addr)?;

                match value::compare(*cmp, &lhs, &rhs) {
                    Some(true) => Flow::Jump(vec![*target]),
                    Some(false) => Flow::Jump(vec![next]),
                    None => Flow::Jump(vec![next, *target]),
                }
            }

            Insn::Switch { src, cases } => {
                let next = self.fallthrough(addr)?;

                match pre.read(*src)?.as_i32() {
                    Some(key) => Flow::Jump(vec![cases
                        .iter()
                        .find(|&&(case, _)| case == key)
                        .map_or(next, |&(_, target)| target)]),

                    None => Flow::Jump(
                        std::iter::once(next)
                            .chain(cases.iter().map(|&(_, target)| target))
                            .collect(),
                    ),
                }
            }

            Insn::Compare {
                kind,
                dst,
                lhs,
                rhs,
            } => {
                let ty = kind.operand_ty();
                let lhs = pre.read(*lhs)?.coerce(&ty);
                let rhs = pre.read(*rhs)?.coerce(&ty);
                let result = value::three_way(&lhs, &rhs, kind.nan_bias())
                    .map_or_else(|| Value::unknown(Ty::int()), Value::Int);
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::Unary { op, dst, src } => {
                let value = pre.read(*src)?.coerce(&op.src_ty());
                let result = unary(*op, &value).unwrap_or_else(|| Value::Unknown(op.dst_ty()));
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::Binary {
                op,
                ty,
                dst,
                lhs,
                rhs,
            } => {
                let value_ty = ty.ty();
                let lhs = pre.read(*lhs)?.coerce(&value_ty);
                let rhs = match rhs {
                    Operand::Lit(lit) => Value::Int(*lit),
                    Operand::Reg(reg) if matches!(op, BinOp::Shl | BinOp::Shr | BinOp::Ushr) => {
                        pre.read(*reg)?.coerce(&Ty::int())
                    }
                    Operand::Reg(reg) => pre.read(*reg)?.coerce(&value_ty),
                };

                if matches!(op, BinOp::Div | BinOp::Rem) && matches!(ty, NumTy::Int | NumTy::Long) {
                    match rhs.as_i32().map(i64::from).or(rhs.as_i64()) {
                        Some(0) => return Ok(Flow::Throw(exception(ty::ARITHMETIC_EXCEPTION))),
                        Some(_) => {}
                        None => *hazard = Some(exception(ty::ARITHMETIC_EXCEPTION)),
                    }
                }

                let result = binary(*op, *ty, &lhs, &rhs).unwrap_or(Value::Unknown(value_ty));
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::NewInstance { dst, ty } => {
                post.assign(*dst, Value::Uninit(ty.clone()))?;

                Flow::Next
            }

            Insn::CheckCast { reg, ty } => {
                match pre.read(*reg)? {
                    Value::Null(_) => {}
                    Value::Unknown(_) => {
                        post.assign(*reg, Value::Unknown(ty.clone()))?;
                        *hazard = Some(exception(ty::CLASS_CAST_EXCEPTION));
                    }
                    value if &value.ty() == ty || ty.as_str() == ty::OBJECT => {}
                    _ => *hazard = Some(exception(ty::CLASS_CAST_EXCEPTION)),
                }

                Flow::Next
            }

            Insn::InstanceOf { dst, src, ty } => {
                let result = match pre.read(*src)? {
                    Value::Null(_) => Value::Boolean(false),
                    Value::Unknown(_) | Value::Uninit(_) => Value::unknown("Z"),
                    value if &value.ty() == ty || ty.as_str() == ty::OBJECT => Value::Boolean(true),
                    _ => Value::unknown("Z"),
                };
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::NewArray { dst, size, ty } => {
                let elem_ty = ty.element().unwrap_or_else(Ty::object);

                let array = match pre.read(*size)?.coerce(&Ty::int()).as_i32() {
                    Some(size) if size < 0 => {
                        return Ok(Flow::Throw(exception(ty::NEGATIVE_SIZE_EXCEPTION)));
                    }

                    Some(size) => {
                        let size = size as usize;
                        let elements =
                            (size <= MAX_TRACKED_ELEMENTS).then(|| vec![Value::zero(&elem_ty); size]);

                        self.heap.array(ty.clone(), Some(size), elements)
                    }

                    None => {
                        *hazard = Some(exception(ty::NEGATIVE_SIZE_EXCEPTION));

                        self.heap.array(ty.clone(), None, None)
                    }
                };

                post.assign(*dst, array)?;

                Flow::Next
            }

            Insn::ArrayLength { dst, array } => {
                let result = match pre.read(*array)? {
                    Value::Null(_) => return Ok(Flow::Throw(npe())),
                    Value::Array(Array {
                        length: Some(length),
                        ..
                    }) => Value::Int(length as i32),
                    value => {
                        if !value.is_known() {
                            *hazard = Some(npe());
                        }

                        Value::unknown(Ty::int())
                    }
                };
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::ArrayGet { dst, array, index } => {
                let index = pre.read(*index)?.coerce(&Ty::int()).as_i32();

                let result = match pre.read(*array)? {
                    Value::Null(_) => return Ok(Flow::Throw(npe())),

                    Value::Array(array) => {
                        let elem_ty = array.ty.element().unwrap_or_else(Ty::object);

                        match (index, array.length, &array.elements) {
                            (Some(idx), Some(length), _) if idx < 0 || idx as usize >= length => {
                                return Ok(Flow::Throw(exception(ty::INDEX_EXCEPTION)));
                            }
                            (Some(idx), _, Some(elements)) => elements[idx as usize].clone(),
                            _ => {
                                *hazard = Some(exception(ty::INDEX_EXCEPTION));

                                Value::Unknown(elem_ty)
                            }
                        }
                    }

                    value => {
                        *hazard = Some(npe());

                        Value::Unknown(value.ty().element().unwrap_or_else(Ty::object))
                    }
                };
                post.assign(*dst, result)?;

                Flow::Next
            }

            Insn::ArrayPut { src, array, index } => {
                let value = pre.read(*src)?;
                let index = pre.read(*index)?.coerce(&Ty::int()).as_i32();

                match pre.read(*array)? {
                    Value::Null(_) => return Ok(Flow::Throw(npe())),

                    Value::Array(array) => {
                        let elem_ty = array.ty.element().unwrap_or_else(Ty::object);

                        let elements = match (index, array.length, &array.elements) {
                            (Some(idx), Some(length), _) if idx < 0 || idx as usize >= length => {
                                return Ok(Flow::Throw(exception(ty::INDEX_EXCEPTION)));
                            }
                            (Some(idx), _, Some(elements)) => {
                                let mut elements = elements.to_vec();
                                elements[idx as usize] = value.coerce(&elem_ty);

                                Some(elements.into())
                            }
                            _ => {
                                *hazard = Some(exception(ty::INDEX_EXCEPTION));

                                None
                            }
                        };

                        let id = array.id;
                        post.update_instance(id, &Value::Array(Array { elements, ..array }));
                    }

                    _ => *hazard = Some(npe()),
                }

                Flow::Next
            }

            Insn::FillArrayData { array, data } => {
                match pre.read(*array)? {
                    Value::Null(_) => return Ok(Flow::Throw(npe())),

                    Value::Array(array) => match array.length {
                        Some(length) if data.len() > length => {
                            return Ok(Flow::Throw(exception(ty::INDEX_EXCEPTION)));
                        }

                        Some(length) if length <= MAX_TRACKED_ELEMENTS => {
                            let elem_ty = array.ty.element().unwrap_or_else(Ty::object);
                            let mut elements = match &array.elements {
                                Some(elements) => elements.to_vec(),
                                None => vec![Value::zero(&elem_ty); length],
                            };

                            for (slot, literal) in elements.iter_mut().zip(data) {
                                *slot = self.heap.literal(literal).coerce(&elem_ty);
                            }

                            let id = array.id;
                            let updated = Value::Array(Array {
                                elements: Some(elements.into()),
                                ..array
                            });
                            post.update_instance(id, &updated);
                        }

                        _ => *hazard = Some(exception(ty::INDEX_EXCEPTION)),
                    },

                    _ => *hazard = Some(npe()),
                }

                Flow::Next
            }

            Insn::FieldGet { dst, object, field } => {
                if let Some(object) = object {
                    match pre.read(*object)? {
                        Value::Null(_) => return Ok(Flow::Throw(npe())),
                        Value::Unknown(_) => *hazard = Some(npe()),
                        _ => {}
                    }
                }

                post.assign(*dst, Value::Unknown(field.ty.clone()))?;

                Flow::Next
            }

            Insn::FieldPut { src, object, .. } => {
                pre.read(*src)?;

                if let Some(object) = object {
                    match pre.read(*object)? {
                        Value::Null(_) => return Ok(Flow::Throw(npe())),
                        Value::Unknown(_) => *hazard = Some(npe()),
                        _ => {}
                    }
                }

                Flow::Next
            }

            Insn::Invoke { kind, method, args } => self.invoke(*kind, method, args, pre, post, hazard)?,
        })
    }

    fn invoke(
        &mut self,
        kind: InvokeKind,
        method: &MethodRef,
        args: &[Reg],
        pre: &MethodState,
        post: &mut MethodState,
        hazard: &mut Option<Value>,
    ) -> Result<Flow, VmError> {
        let values = args
            .iter()
            .map(|&reg| pre.read(reg))
            .collect::<Result<Vec<_>, _>>()?;

        if kind != InvokeKind::Static && matches!(values.first(), Some(Value::Null(_))) {
            return Ok(Flow::Throw(exception(ty::NULL_POINTER_EXCEPTION)));
        }

        if let Some(emulated) = emulate::lookup(method) {
            let effect = (emulated.func)(&mut *self.heap, self.vm.classes(), &values);
            trace!("emulated {method} -> {effect:?}");

            match effect {
                Effect::Unknown => {}
                effect => return self.apply_effect(method, args, effect, post),
            }

            self.opaque_result(method, args, post)?;
            *hazard = Some(Value::unknown(ty::THROWABLE));

            return Ok(Flow::Next);
        }

        let vm = self.vm;
        let local = match kind {
            InvokeKind::Static | InvokeKind::Direct => vm.classes().method(method),
            _ => None,
        };

        let effect = match local {
            Some(callee) => self.call_local(callee, &values),
            None => None,
        };

        self.clobber(method, &values, post);

        match effect {
            Some(effect @ (Effect::Return(_) | Effect::Void)) if !method.is_constructor() => {
                self.apply_effect(method, args, effect, post)
            }

            _ => {
                self.opaque_result(method, args, post)?;

                if effect.is_none() {
                    *hazard = Some(Value::unknown(ty::THROWABLE));
                }

                Ok(Flow::Next)
            }
        }
    }

    fn apply_effect(
        &mut self,
        method: &MethodRef,
        args: &[Reg],
        effect: Effect,
        post: &mut MethodState,
    ) -> Result<Flow, VmError> {
        match effect {
            Effect::Return(value) if method.is_constructor() => {
                if let Some(&receiver) = args.first() {
                    post.assign(receiver, value)?;
                }
            }

            Effect::Return(value) => post.set_result(Some(value.coerce(&method.ret))),
            Effect::Void | Effect::Unknown => {}
            Effect::Throw(ty) => return Ok(Flow::Throw(Value::Unknown(ty))),
        }

        Ok(Flow::Next)
    }

    /// What an unmodeled call leaves behind: an unknown result, or an initialized but
    /// unknown receiver for constructors.
    fn opaque_result(&mut self, method: &MethodRef, args: &[Reg], post: &mut MethodState) -> Result<(), VmError> {
        if method.is_constructor() {
            if let Some(&receiver) = args.first() {
                post.assign(receiver, Value::Unknown(method.class.clone()))?;
            }
        } else if !method.ret.is_void() {
            post.set_result(Some(Value::Unknown(method.ret.clone())));
        }

        Ok(())
    }

    /// Any mutable instance passed to a callee may come back changed.
    fn clobber(&self, method: &MethodRef, values: &[Value], post: &mut MethodState) {
        for value in values {
            let Some(id) = value.instance_id() else {
                continue;
            };

            if value.is_mutable_ref() && !self.vm.classes().is_immutable(&value.ty()) {
                trace!("{method} may modify instance {}", id.0);
                post.update_instance(id, &Value::Unknown(value.ty()));
            }
        }
    }

    /// Executes a local method in a nested graph. The result is known only if every
    /// path returns the same known value.
    fn call_local(&mut self, callee: &Method, values: &[Value]) -> Option<Effect> {
        if self.depth >= self.vm.options().max_call_depth {
            debug!("call depth limit reached at {}", callee.reference);

            return None;
        }

        if self.budget.is_spent() {
            return None;
        }

        let mut state = MethodState::new(callee.locals(), callee.param_count());

        for (idx, value) in values.iter().enumerate() {
            state.assign_param(idx as u16, value.clone()).ok()?;
        }

        let graph = match self.vm.run(callee, state, self.depth + 1, &mut *self.heap, &mut *self.budget) {
            Ok(graph) => graph,
            Err(e) => {
                debug!("could not execute {}: {e}", callee.reference);

                return None;
            }
        };

        if !graph.is_complete() {
            return None;
        }

        let mut result: Option<Option<Value>> = None;

        for node in graph.terminal_nodes() {
            let value = match callee.insn_at(node.addr) {
                Some(Insn::ReturnVoid) => None,
                Some(Insn::Return { src }) => Some(node.state.read(*src).ok()?),
                _ => return None,
            };

            match &result {
                None => result = Some(value),
                Some(prev) if *prev == value => {}
                Some(_) => return None,
            }
        }

        match result? {
            Some(value) if value.is_known() => Some(Effect::Return(value)),
            Some(_) => None,
            None => Some(Effect::Void),
        }
    }
}

fn unary(op: UnOp, value: &Value) -> Option<Value> {
    use UnOp::*;

    Some(match op {
        NegInt => Value::Int(value.as_i32()?.wrapping_neg()),
        NotInt => Value::Int(!value.as_i32()?),
        NegLong => Value::Long(value.as_i64()?.wrapping_neg()),
        NotLong => Value::Long(!value.as_i64()?),
        NegFloat => Value::Float(-value.as_f32()?),
        NegDouble => Value::Double(-value.as_f64()?),
        IntToLong => Value::Long(value.as_i32()? as i64),
        IntToFloat => Value::Float((value.as_i32()? as f32).into()),
        IntToDouble => Value::Double((value.as_i32()? as f64).into()),
        LongToInt => Value::Int(value.as_i64()? as i32),
        LongToFloat => Value::Float((value.as_i64()? as f32).into()),
        LongToDouble => Value::Double((value.as_i64()? as f64).into()),
        FloatToInt => Value::Int(value.as_f32()?.to_int()),
        FloatToLong => Value::Long(value.as_f32()?.to_long()),
        FloatToDouble => Value::Double(value.as_f32()?.promote()),
        DoubleToInt => Value::Int(value.as_f64()?.to_int()),
        DoubleToLong => Value::Long(value.as_f64()?.to_long()),
        DoubleToFloat => Value::Float(value.as_f64()?.demote()),
        IntToByte => Value::Byte(value.as_i32()? as i8),
        IntToChar => Value::Char(value.as_i32()? as u16),
        IntToShort => Value::Short(value.as_i32()? as i16),
    })
}

fn binary(op: BinOp, ty: NumTy, lhs: &Value, rhs: &Value) -> Option<Value> {
    use BinOp::*;

    match ty {
        NumTy::Int => {
            let (a, b) = (lhs.as_i32()?, rhs.as_i32()?);

            if b == 0 && matches!(op, Div | Rem) {
                return None;
            }

            Some(Value::Int(match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div => a.wrapping_div(b),
                Rem => a.wrapping_rem(b),
                And => a & b,
                Or => a | b,
                Xor => a ^ b,
                Shl => a.wrapping_shl(b as u32),
                Shr => a.wrapping_shr(b as u32),
                Ushr => (a as u32).wrapping_shr(b as u32) as i32,
            }))
        }

        NumTy::Long => {
            let a = lhs.as_i64()?;

            if matches!(op, Shl | Shr | Ushr) {
                let b = rhs.as_i32()? as u32;

                return Some(Value::Long(match op {
                    Shl => a.wrapping_shl(b),
                    Shr => a.wrapping_shr(b),
                    _ => (a as u64).wrapping_shr(b) as i64,
                }));
            }

            let b = rhs.as_i64()?;

            if b == 0 && matches!(op, Div | Rem) {
                return None;
            }

            Some(Value::Long(match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div => a.wrapping_div(b),
                Rem => a.wrapping_rem(b),
                And => a & b,
                Or => a | b,
                Xor => a ^ b,
                Shl | Shr | Ushr => unreachable!(),
            }))
        }

        NumTy::Float => {
            let (a, b) = (lhs.as_f32()?, rhs.as_f32()?);

            Some(Value::Float(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return None,
            }))
        }

        NumTy::Double => {
            let (a, b) = (lhs.as_f64()?, rhs.as_f64()?);

            Some(Value::Double(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return None,
            }))
        }
    }
}
