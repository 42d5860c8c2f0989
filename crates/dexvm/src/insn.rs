//! The closed instruction set.

use std::cmp::Ordering;
use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::method::Addr;
use crate::state::Reg;
use crate::ty::{FieldRef, MethodRef, Ty};
use crate::value::Literal;

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cmp {
    pub fn is_ordering(self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Ge => ordering.is_ge(),
            Self::Gt => ordering.is_gt(),
            Self::Le => ordering.is_le(),
        }
    }
}

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum CmpKind {
    CmplFloat,
    CmpgFloat,
    CmplDouble,
    CmpgDouble,
    CmpLong,
}

impl CmpKind {
    /// What an unordered comparison produces.
    pub fn nan_bias(self) -> i32 {
        match self {
            Self::CmplFloat | Self::CmplDouble => -1,
            Self::CmpgFloat | Self::CmpgDouble => 1,
            Self::CmpLong => 0,
        }
    }

    pub fn operand_ty(self) -> Ty {
        Ty::new(match self {
            Self::CmplFloat | Self::CmpgFloat => "F",
            Self::CmplDouble | Self::CmpgDouble => "D",
            Self::CmpLong => "J",
        })
    }
}

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum UnOp {
    NegInt,
    NotInt,
    NegLong,
    NotLong,
    NegFloat,
    NegDouble,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    IntToByte,
    IntToChar,
    IntToShort,
}

impl UnOp {
    pub fn src_ty(self) -> Ty {
        use UnOp::*;

        Ty::new(match self {
            NegInt | NotInt | IntToLong | IntToFloat | IntToDouble | IntToByte | IntToChar
            | IntToShort => "I",
            NegLong | NotLong | LongToInt | LongToFloat | LongToDouble => "J",
            NegFloat | FloatToInt | FloatToLong | FloatToDouble => "F",
            NegDouble | DoubleToInt | DoubleToLong | DoubleToFloat => "D",
        })
    }

    pub fn dst_ty(self) -> Ty {
        use UnOp::*;

        Ty::new(match self {
            NegInt | NotInt | LongToInt | FloatToInt | DoubleToInt => "I",
            NegLong | NotLong | IntToLong | FloatToLong | DoubleToLong => "J",
            NegFloat | IntToFloat | LongToFloat | DoubleToFloat => "F",
            NegDouble | IntToDouble | LongToDouble | FloatToDouble => "D",
            IntToByte => "B",
            IntToChar => "C",
            IntToShort => "S",
        })
    }
}

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum NumTy {
    Int,
    Long,
    Float,
    Double,
}

impl NumTy {
    pub fn ty(self) -> Ty {
        Ty::new(match self {
            Self::Int => "I",
            Self::Long => "J",
            Self::Float => "F",
            Self::Double => "D",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Lit(i32),
}

#[derive(Display, EnumString, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Insn {
    Nop,
    Const {
        dst: Reg,
        value: Literal,
    },
    Move {
        dst: Reg,
        src: Reg,
    },
    MoveResult {
        dst: Reg,
    },
    MoveException {
        dst: Reg,
    },
    ReturnVoid,
    Return {
        src: Reg,
    },
    Throw {
        src: Reg,
    },
    Goto {
        target: Addr,
    },
    /// `rhs` is `None` for the compare-against-zero forms.
    If {
        cmp: Cmp,
        lhs: Reg,
        rhs: Option<Reg>,
        target: Addr,
    },
    Switch {
        src: Reg,
        cases: Vec<(i32, Addr)>,
    },
    Compare {
        kind: CmpKind,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    Unary {
        op: UnOp,
        dst: Reg,
        src: Reg,
    },
    Binary {
        op: BinOp,
        ty: NumTy,
        dst: Reg,
        lhs: Reg,
        rhs: Operand,
    },
    NewInstance {
        dst: Reg,
        ty: Ty,
    },
    CheckCast {
        reg: Reg,
        ty: Ty,
    },
    InstanceOf {
        dst: Reg,
        src: Reg,
        ty: Ty,
    },
    /// `ty` is the array type.
    NewArray {
        dst: Reg,
        size: Reg,
        ty: Ty,
    },
    ArrayLength {
        dst: Reg,
        array: Reg,
    },
    ArrayGet {
        dst: Reg,
        array: Reg,
        index: Reg,
    },
    ArrayPut {
        src: Reg,
        array: Reg,
        index: Reg,
    },
    FillArrayData {
        array: Reg,
        data: Vec<Literal>,
    },
    /// `object` is `None` for static fields.
    FieldGet {
        dst: Reg,
        object: Option<Reg>,
        field: FieldRef,
    },
    FieldPut {
        src: Reg,
        object: Option<Reg>,
        field: FieldRef,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        args: Vec<Reg>,
    },
}

impl Insn {
    /// The instruction's size in 16-bit code units.
    pub fn code_units(&self) -> u32 {
        match self {
            Self::Nop
            | Self::Move { .. }
            | Self::MoveResult { .. }
            | Self::MoveException { .. }
            | Self::ReturnVoid
            | Self::Return { .. }
            | Self::Throw { .. }
            | Self::Unary { .. }
            | Self::ArrayLength { .. } => 1,

            Self::Const { value, .. } if value.is_wide() => 5,
            Self::Const {
                value: Literal::String(_) | Literal::Class(_),
                ..
            } => 2,
            Self::Const { .. } => 3,

            Self::Goto { .. } | Self::Switch { .. } | Self::FillArrayData { .. } => 3,
            Self::Invoke { .. } => 3,

            Self::If { .. }
            | Self::Compare { .. }
            | Self::Binary { .. }
            | Self::NewInstance { .. }
            | Self::CheckCast { .. }
            | Self::InstanceOf { .. }
            | Self::NewArray { .. }
            | Self::ArrayGet { .. }
            | Self::ArrayPut { .. }
            | Self::FieldGet { .. }
            | Self::FieldPut { .. } => 2,
        }
    }

    /// Whether control may continue to the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Self::ReturnVoid | Self::Return { .. } | Self::Throw { .. } | Self::Goto { .. }
        )
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Goto { .. } | Self::If { .. } | Self::Switch { .. })
    }

    pub fn targets(&self) -> Vec<Addr> {
        match self {
            Self::Goto { target } | Self::If { target, .. } => vec![*target],
            Self::Switch { cases, .. } => cases.iter().map(|&(_, target)| target).collect(),
            _ => vec![],
        }
    }

    pub fn targets_mut(&mut self) -> Vec<&mut Addr> {
        match self {
            Self::Goto { target } | Self::If { target, .. } => vec![target],
            Self::Switch { cases, .. } => cases.iter_mut().map(|(_, target)| target).collect(),
            _ => vec![],
        }
    }

    /// Registers whose value the instruction consumes.
    pub fn reads(&self) -> Vec<Reg> {
        match *self {
            Self::Move { src, .. }
            | Self::Return { src }
            | Self::Throw { src }
            | Self::Switch { src, .. }
            | Self::Unary { src, .. }
            | Self::InstanceOf { src, .. } => vec![src],

            Self::If { lhs, rhs, .. } => [Some(lhs), rhs].into_iter().flatten().collect(),
            Self::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            Self::Binary { lhs, rhs, .. } => match rhs {
                Operand::Reg(rhs) => vec![lhs, rhs],
                Operand::Lit(_) => vec![lhs],
            },

            Self::CheckCast { reg, .. } => vec![reg],
            Self::NewArray { size, .. } => vec![size],
            Self::ArrayLength { array, .. } | Self::FillArrayData { array, .. } => vec![array],
            Self::ArrayGet { array, index, .. } => vec![array, index],
            Self::ArrayPut { src, array, index } => vec![src, array, index],
            Self::FieldGet { object, .. } => object.into_iter().collect(),
            Self::FieldPut { src, object, .. } => [Some(src), object].into_iter().flatten().collect(),
            Self::Invoke { ref args, .. } => args.clone(),

            Self::Nop
            | Self::Const { .. }
            | Self::MoveResult { .. }
            | Self::MoveException { .. }
            | Self::ReturnVoid
            | Self::Goto { .. }
            | Self::NewInstance { .. } => vec![],
        }
    }

    /// The register the instruction assigns, if any.
    pub fn writes(&self) -> Option<Reg> {
        match *self {
            Self::Const { dst, .. }
            | Self::Move { dst, .. }
            | Self::MoveResult { dst }
            | Self::MoveException { dst }
            | Self::Compare { dst, .. }
            | Self::Unary { dst, .. }
            | Self::Binary { dst, .. }
            | Self::NewInstance { dst, .. }
            | Self::InstanceOf { dst, .. }
            | Self::NewArray { dst, .. }
            | Self::ArrayLength { dst, .. }
            | Self::ArrayGet { dst, .. }
            | Self::FieldGet { dst, .. } => Some(dst),
            _ => None,
        }
    }

    pub fn regs_mut(&mut self) -> Vec<&mut Reg> {
        match self {
            Self::Const { dst, .. }
            | Self::MoveResult { dst }
            | Self::MoveException { dst }
            | Self::NewInstance { dst, .. } => vec![dst],

            Self::Return { src } | Self::Throw { src } | Self::Switch { src, .. } => vec![src],
            Self::CheckCast { reg, .. } => vec![reg],

            Self::Move { dst, src }
            | Self::Unary { dst, src, .. }
            | Self::InstanceOf { dst, src, .. } => vec![dst, src],

            Self::If { lhs, rhs, .. } => {
                let mut regs = vec![lhs];
                regs.extend(rhs.as_mut());
                regs
            }

            Self::Compare { dst, lhs, rhs, .. } => vec![dst, lhs, rhs],
            Self::Binary { dst, lhs, rhs, .. } => match rhs {
                Operand::Reg(rhs) => vec![dst, lhs, rhs],
                Operand::Lit(_) => vec![dst, lhs],
            },

            Self::NewArray { dst, size, .. } => vec![dst, size],
            Self::ArrayLength { dst, array } => vec![dst, array],
            Self::ArrayGet { dst, array, index } => vec![dst, array, index],
            Self::ArrayPut { src, array, index } => vec![src, array, index],
            Self::FillArrayData { array, .. } => vec![array],

            Self::FieldGet { dst: reg, object, .. } | Self::FieldPut { src: reg, object, .. } => {
                let mut regs = vec![reg];
                regs.extend(object.as_mut());
                regs
            }

            Self::Invoke { args, .. } => args.iter_mut().collect(),
            Self::Nop | Self::ReturnVoid | Self::Goto { .. } => vec![],
        }
    }

    /// Effects beyond assigning [`Insn::writes`]: control transfer, heap or static
    /// writes, calls, and class initialization.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Self::ReturnVoid
                | Self::Return { .. }
                | Self::Throw { .. }
                | Self::Goto { .. }
                | Self::If { .. }
                | Self::Switch { .. }
                | Self::MoveException { .. }
                | Self::NewInstance { .. }
                | Self::ArrayPut { .. }
                | Self::FillArrayData { .. }
                | Self::FieldGet { object: None, .. }
                | Self::FieldPut { .. }
                | Self::Invoke { .. }
        )
    }

    pub fn may_throw(&self) -> bool {
        match self {
            Self::Binary {
                op: BinOp::Div | BinOp::Rem,
                ty: NumTy::Int | NumTy::Long,
                rhs,
                ..
            } => !matches!(rhs, Operand::Lit(lit) if *lit != 0),

            Self::Throw { .. }
            | Self::NewInstance { .. }
            | Self::CheckCast { .. }
            | Self::NewArray { .. }
            | Self::ArrayLength { .. }
            | Self::ArrayGet { .. }
            | Self::ArrayPut { .. }
            | Self::FillArrayData { .. }
            | Self::FieldGet { .. }
            | Self::FieldPut { .. }
            | Self::Invoke { .. } => true,

            _ => false,
        }
    }

    pub fn opcode_name(&self) -> String {
        match self {
            Self::Nop => "nop".into(),
            Self::Const { value, .. } => value.opcode_name().into(),
            Self::Move { .. } => "move".into(),
            Self::MoveResult { .. } => "move-result".into(),
            Self::MoveException { .. } => "move-exception".into(),
            Self::ReturnVoid => "return-void".into(),
            Self::Return { .. } => "return".into(),
            Self::Throw { .. } => "throw".into(),
            Self::Goto { .. } => "goto/32".into(),
            Self::If { cmp, rhs: Some(_), .. } => format!("if-{cmp}"),
            Self::If { cmp, rhs: None, .. } => format!("if-{cmp}z"),
            Self::Switch { .. } => "switch".into(),
            Self::Compare { kind, .. } => kind.to_string(),
            Self::Unary { op, .. } => op.to_string(),
            Self::Binary { op, ty, rhs: Operand::Reg(_), .. } => format!("{op}-{ty}"),
            Self::Binary { op, ty, rhs: Operand::Lit(_), .. } => format!("{op}-{ty}/lit"),
            Self::NewInstance { .. } => "new-instance".into(),
            Self::CheckCast { .. } => "check-cast".into(),
            Self::InstanceOf { .. } => "instance-of".into(),
            Self::NewArray { .. } => "new-array".into(),
            Self::ArrayLength { .. } => "array-length".into(),
            Self::ArrayGet { .. } => "aget".into(),
            Self::ArrayPut { .. } => "aput".into(),
            Self::FillArrayData { .. } => "fill-array-data".into(),
            Self::FieldGet { object: Some(_), .. } => "iget".into(),
            Self::FieldGet { object: None, .. } => "sget".into(),
            Self::FieldPut { object: Some(_), .. } => "iput".into(),
            Self::FieldPut { object: None, .. } => "sput".into(),
            Self::Invoke { kind, .. } => format!("invoke-{kind}"),
        }
    }

    /// Renders the instruction with parameter registers named `pN` given the local count.
    pub fn display(&self, locals: Option<u16>) -> impl fmt::Display + '_ {
        InsnPrinter { insn: self, locals }
    }
}

pub fn label(addr: Addr) -> String {
    format!(":addr_{addr}")
}

struct InsnPrinter<'a> {
    insn: &'a Insn,
    locals: Option<u16>,
}

impl InsnPrinter<'_> {
    fn reg(&self, reg: Reg) -> String {
        match self.locals {
            Some(locals) if reg >= locals => format!("p{}", reg - locals),
            _ => format!("v{reg}"),
        }
    }
}

impl fmt::Display for InsnPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = |reg: Reg| self.reg(reg);

        write!(f, "{}", self.insn.opcode_name())?;

        match self.insn {
            Insn::Nop | Insn::ReturnVoid => Ok(()),

            Insn::Const { dst, value } => write!(f, " {}, {value}", r(*dst)),

            Insn::Move { dst, src } | Insn::Unary { dst, src, .. } => {
                write!(f, " {}, {}", r(*dst), r(*src))
            }

            Insn::MoveResult { dst } | Insn::MoveException { dst } => write!(f, " {}", r(*dst)),
            Insn::Return { src } | Insn::Throw { src } => write!(f, " {}", r(*src)),
            Insn::Goto { target } => write!(f, " {}", label(*target)),

            Insn::If { lhs, rhs, target, .. } => {
                write!(f, " {}", r(*lhs))?;

                if let Some(rhs) = rhs {
                    write!(f, ", {}", r(*rhs))?;
                }

                write!(f, ", {}", label(*target))
            }

            Insn::Switch { src, cases } => {
                write!(f, " {}, {{", r(*src))?;

                for (idx, (key, target)) in cases.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{key} -> {}", label(*target))?;
                }

                write!(f, "}}")
            }

            Insn::Compare { dst, lhs, rhs, .. } => {
                write!(f, " {}, {}, {}", r(*dst), r(*lhs), r(*rhs))
            }

            Insn::Binary { dst, lhs, rhs, .. } => match rhs {
                Operand::Reg(rhs) => write!(f, " {}, {}, {}", r(*dst), r(*lhs), r(*rhs)),
                Operand::Lit(lit) => write!(f, " {}, {}, {lit}", r(*dst), r(*lhs)),
            },

            Insn::NewInstance { dst, ty } => write!(f, " {}, {ty}", r(*dst)),
            Insn::CheckCast { reg, ty } => write!(f, " {}, {ty}", r(*reg)),
            Insn::InstanceOf { dst, src, ty } => write!(f, " {}, {}, {ty}", r(*dst), r(*src)),
            Insn::NewArray { dst, size, ty } => write!(f, " {}, {}, {ty}", r(*dst), r(*size)),
            Insn::ArrayLength { dst, array } => write!(f, " {}, {}", r(*dst), r(*array)),

            Insn::ArrayGet { dst: reg, array, index } | Insn::ArrayPut { src: reg, array, index } => {
                write!(f, " {}, {}, {}", r(*reg), r(*array), r(*index))
            }

            Insn::FillArrayData { array, data } => {
                write!(f, " {}, [", r(*array))?;

                for (idx, literal) in data.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{literal}")?;
                }

                write!(f, "]")
            }

            Insn::FieldGet { dst: reg, object, field } | Insn::FieldPut { src: reg, object, field } => {
                write!(f, " {}", r(*reg))?;

                if let Some(object) = object {
                    write!(f, ", {}", r(*object))?;
                }

                write!(f, ", {field}")
            }

            Insn::Invoke { method, args, .. } => {
                write!(f, " {{")?;

                for (idx, &arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{}", r(arg))?;
                }

                write!(f, "}}, {method}")
            }
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(None))
    }
}
