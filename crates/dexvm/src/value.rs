//! The abstract value domain.
//!
//! Every value carries a static type, including [`Value::Unknown`], which stands for
//! "some value of this type". Comparisons follow the bytecode's widening rules and
//! return `None` whenever the outcome is not statically determinable.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::rc::Rc;

use crate::insn::Cmp;
use crate::ty::{MethodRef, Ty};
use crate::util::float::{F32, F64};
use crate::util::try_match;

/// Identity of a heap instance within one execution graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectData {
    Opaque,
    String(Rc<str>),
    Boxed(Rc<Value>),
    Method(Rc<MethodRef>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Object {
    pub id: InstanceId,
    pub ty: Ty,
    pub data: ObjectData,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Array {
    pub id: InstanceId,
    pub ty: Ty,
    pub length: Option<usize>,
    // invariant: elements.len() == length when both are present
    pub elements: Option<Rc<[Value]>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(F32),
    Double(F64),
    Boolean(bool),
    Char(u16),
    Short(i16),
    Byte(i8),
    Null(Ty),
    Object(Object),
    Array(Array),
    Class(Ty),
    Uninit(Ty),
    Unknown(Ty),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Int(i32),
    Long(i64),
    Float(F32),
    Double(F64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference<'a> {
    Null,
    Instance(InstanceId),
    Class(&'a Ty),
    Uninit,
}

impl Value {
    pub fn unknown(ty: impl Into<Ty>) -> Self {
        Self::Unknown(ty.into())
    }

    /// The value a freshly allocated array slot or field of type `ty` holds.
    pub fn zero(ty: &Ty) -> Self {
        match ty.as_str() {
            "Z" => Self::Boolean(false),
            "B" => Self::Byte(0),
            "S" => Self::Short(0),
            "C" => Self::Char(0),
            "I" => Self::Int(0),
            "J" => Self::Long(0),
            "F" => Self::Float(F32::default()),
            "D" => Self::Double(F64::default()),
            _ => Self::Null(ty.clone()),
        }
    }

    pub fn ty(&self) -> Ty {
        match self {
            Self::Int(_) => Ty::new("I"),
            Self::Long(_) => Ty::new("J"),
            Self::Float(_) => Ty::new("F"),
            Self::Double(_) => Ty::new("D"),
            Self::Boolean(_) => Ty::new("Z"),
            Self::Char(_) => Ty::new("C"),
            Self::Short(_) => Ty::new("S"),
            Self::Byte(_) => Ty::new("B"),
            Self::Class(_) => Ty::class(),
            Self::Null(ty) | Self::Uninit(ty) | Self::Unknown(ty) => ty.clone(),
            Self::Object(object) => object.ty.clone(),
            Self::Array(array) => array.ty.clone(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Known, and for arrays, every element known as well.
    pub fn is_fully_known(&self) -> bool {
        match self {
            Self::Unknown(_) => false,
            Self::Array(array) => array
                .elements
                .as_ref()
                .is_some_and(|elements| elements.iter().all(Value::is_fully_known)),
            Self::Object(Object {
                data: ObjectData::Boxed(inner),
                ..
            }) => inner.is_known(),
            _ => true,
        }
    }

    /// Instances whose contents a callee could modify.
    pub fn is_mutable_ref(&self) -> bool {
        match self {
            Self::Array(_) => true,
            Self::Object(object) => matches!(object.data, ObjectData::Opaque),
            _ => false,
        }
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            Self::Object(object) => Some(object.id),
            Self::Array(array) => Some(array.id),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Int(value) => Some(value),
            Self::Boolean(value) => Some(value as i32),
            Self::Char(value) => Some(value as i32),
            Self::Short(value) => Some(value as i32),
            Self::Byte(value) => Some(value as i32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        try_match!(*self, Self::Long(value) => value)
    }

    pub fn as_f32(&self) -> Option<F32> {
        try_match!(*self, Self::Float(value) => value)
    }

    pub fn as_f64(&self) -> Option<F64> {
        try_match!(*self, Self::Double(value) => value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Object(Object {
                data: ObjectData::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodRef> {
        match self {
            Self::Object(Object {
                data: ObjectData::Method(method),
                ..
            }) => Some(method),
            _ => None,
        }
    }

    pub fn unboxed(&self) -> Option<&Value> {
        match self {
            Self::Object(Object {
                data: ObjectData::Boxed(inner),
                ..
            }) => Some(inner),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Self::Array(Array {
                elements: Some(elements),
                ..
            }) => Some(elements),
            _ => None,
        }
    }

    /// The contents of a fully known `byte[]`.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        self.elements()?
            .iter()
            .map(|element| try_match!(*element, Self::Byte(b) => b as u8))
            .collect()
    }

    /// The contents of a fully known `char[]`.
    pub fn as_chars(&self) -> Option<Vec<u16>> {
        self.elements()?
            .iter()
            .map(|element| try_match!(*element, Self::Char(c) => c))
            .collect()
    }

    /// The literal that reproduces this value, if it has one.
    pub fn to_literal(&self) -> Option<Literal> {
        Some(match self {
            Self::Int(value) => Literal::Int(*value),
            Self::Long(value) => Literal::Long(*value),
            Self::Float(value) => Literal::Float(*value),
            Self::Double(value) => Literal::Double(*value),
            Self::Boolean(value) => Literal::Boolean(*value),
            Self::Char(value) => Literal::Char(*value),
            Self::Short(value) => Literal::Short(*value),
            Self::Byte(value) => Literal::Byte(*value),
            Self::Null(_) => Literal::Null,
            Self::Class(ty) => Literal::Class(ty.clone()),
            Self::Object(Object {
                data: ObjectData::String(s),
                ..
            }) => Literal::String(Rc::clone(s)),
            Self::Object(_) | Self::Array(_) | Self::Uninit(_) | Self::Unknown(_) => return None,
        })
    }

    /// Reinterprets a value read from a register as `ty`, the way a typed instruction
    /// would see the same bits. Unknown values just adopt the type.
    pub fn coerce(&self, ty: &Ty) -> Value {
        let int = self.as_i32();

        match (ty.as_str(), self) {
            (_, Self::Unknown(_)) => Self::Unknown(ty.clone()),
            ("I", _) => int.map_or_else(|| self.clone(), Self::Int),
            ("Z", _) => int.map_or_else(|| self.clone(), |v| Self::Boolean(v != 0)),
            ("B", _) => int.map_or_else(|| self.clone(), |v| Self::Byte(v as i8)),
            ("S", _) => int.map_or_else(|| self.clone(), |v| Self::Short(v as i16)),
            ("C", _) => int.map_or_else(|| self.clone(), |v| Self::Char(v as u16)),
            ("F", _) => int.map_or_else(
                || self.clone(),
                |v| Self::Float(F32::from_bits(v as u32)),
            ),
            ("D", Self::Long(v)) => Self::Double(F64::from_bits(*v as u64)),
            ("J", Self::Double(v)) => Self::Long(v.to_bits() as i64),
            (_, Self::Int(0)) if ty.is_reference() => Self::Null(ty.clone()),
            _ => self.clone(),
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        match *self {
            Self::Long(value) => Some(Numeric::Long(value)),
            Self::Float(value) => Some(Numeric::Float(value)),
            Self::Double(value) => Some(Numeric::Double(value)),
            _ => self.as_i32().map(Numeric::Int),
        }
    }

    fn reference(&self) -> Option<Reference<'_>> {
        Some(match self {
            Self::Null(_) => Reference::Null,
            Self::Object(object) => Reference::Instance(object.id),
            Self::Array(array) => Reference::Instance(array.id),
            Self::Class(ty) => Reference::Class(ty),
            Self::Uninit(_) => Reference::Uninit,
            _ => return None,
        })
    }
}

impl Numeric {
    fn to_f32(self) -> F32 {
        match self {
            Self::Int(v) => (v as f32).into(),
            Self::Long(v) => (v as f32).into(),
            Self::Float(v) => v,
            Self::Double(v) => v.demote(),
        }
    }

    fn to_f64(self) -> F64 {
        match self {
            Self::Int(v) => (v as f64).into(),
            Self::Long(v) => (v as f64).into(),
            Self::Float(v) => v.promote(),
            Self::Double(v) => v,
        }
    }

    fn to_i64(self) -> i64 {
        match self {
            Self::Int(v) => v as i64,
            Self::Long(v) => v,
            Self::Float(v) => v.to_long(),
            Self::Double(v) => v.to_long(),
        }
    }
}

/// Compares numerics after promotion to the widest participating category.
/// A float paired with a double is compared in single precision.
/// Returns `None` when the comparison is unordered (NaN).
fn numeric_ordering(lhs: Numeric, rhs: Numeric) -> Option<Ordering> {
    use Numeric::*;

    let any = |f: fn(&Numeric) -> bool| f(&lhs) || f(&rhs);

    if any(|n| matches!(n, Float(_))) {
        lhs.to_f32().partial_cmp(&rhs.to_f32())
    } else if any(|n| matches!(n, Double(_))) {
        lhs.to_f64().partial_cmp(&rhs.to_f64())
    } else if any(|n| matches!(n, Long(_))) {
        Some(lhs.to_i64().cmp(&rhs.to_i64()))
    } else {
        match (lhs, rhs) {
            (Int(lhs), Int(rhs)) => Some(lhs.cmp(&rhs)),
            _ => unreachable!(),
        }
    }
}

fn reference_equality(lhs: Reference<'_>, rhs: Reference<'_>) -> Option<bool> {
    use Reference::*;

    match (lhs, rhs) {
        (Null, Null) => Some(true),
        (Null, _) | (_, Null) => Some(false),
        (Uninit, _) | (_, Uninit) => None,
        (Instance(lhs), Instance(rhs)) => Some(lhs == rhs),
        (Class(lhs), Class(rhs)) => Some(lhs == rhs),
        (Instance(_), Class(_)) | (Class(_), Instance(_)) => Some(false),
    }
}

/// Evaluates a branch condition. `None` means it could go either way.
pub fn compare(cmp: Cmp, lhs: &Value, rhs: &Value) -> Option<bool> {
    if !lhs.is_known() || !rhs.is_known() {
        return None;
    }

    let equal = match (lhs.reference(), rhs.reference()) {
        (Some(lhs), Some(rhs)) => reference_equality(lhs, rhs),

        (Some(reference), None) | (None, Some(reference)) => {
            let primitive = if lhs.reference().is_some() { rhs } else { lhs };

            match primitive.as_i32() {
                Some(0) => Some(reference == Reference::Null),
                Some(_) if reference == Reference::Null => Some(false),
                _ => None,
            }
        }

        (None, None) => {
            if cmp.is_ordering() && [lhs, rhs].iter().any(|v| matches!(v, Value::Boolean(_))) {
                return None;
            }

            let ordering = numeric_ordering(lhs.numeric()?, rhs.numeric()?);

            return Some(match ordering {
                None => cmp == Cmp::Ne,
                Some(ordering) => cmp.test(ordering),
            });
        }
    };

    if cmp.is_ordering() {
        return None;
    }

    equal.map(|equal| equal == (cmp == Cmp::Eq))
}

/// The `cmp*` instructions: -1, 0 or 1, with `nan_bias` produced for unordered operands.
pub fn three_way(lhs: &Value, rhs: &Value, nan_bias: i32) -> Option<i32> {
    let ordering = numeric_ordering(lhs.numeric()?, rhs.numeric()?);

    Some(match ordering {
        None => nan_bias,
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
    })
}

/// A constant that a single instruction can load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(F32),
    Double(F64),
    Boolean(bool),
    Char(u16),
    Short(i16),
    Byte(i8),
    Null,
    String(Rc<str>),
    Class(Ty),
}

impl Literal {
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    pub fn opcode_name(&self) -> &'static str {
        match self {
            Self::Long(_) | Self::Double(_) => "const-wide",
            Self::String(_) => "const-string",
            Self::Class(_) => "const-class",
            _ => "const",
        }
    }

    pub fn ty(&self) -> Ty {
        match self {
            Self::Int(_) => Ty::new("I"),
            Self::Long(_) => Ty::new("J"),
            Self::Float(_) => Ty::new("F"),
            Self::Double(_) => Ty::new("D"),
            Self::Boolean(_) => Ty::new("Z"),
            Self::Char(_) => Ty::new("C"),
            Self::Short(_) => Ty::new("S"),
            Self::Byte(_) => Ty::new("B"),
            Self::Null => Ty::object(),
            Self::String(_) => Ty::string(),
            Self::Class(_) => Ty::class(),
        }
    }
}

pub fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');

    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c => {
                let mut buf = [0u16; 2];

                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }

    out.push('"');
    out
}

fn format_char(c: u16) -> String {
    match char::from_u32(c as u32) {
        Some('\'') => "'\\''".into(),
        Some('\\') => "'\\\\'".into(),
        Some(ch) if ch.is_ascii_graphic() || ch == ' ' => format!("'{ch}'"),
        _ => format!("'\\u{c:04x}'"),
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}d"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{}", format_char(*c)),
            Self::Short(v) => write!(f, "{v}s"),
            Self::Byte(v) => write!(f, "{v}t"),
            Self::Null => write!(f, "null"),
            Self::String(s) => write!(f, "{}", escape_str(s)),
            Self::Class(ty) => write!(f, "{ty}"),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Char(c) => write!(f, "{}", format_char(*c)),
            Self::Short(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Null(_) => write!(f, "null"),
            Self::Class(ty) => write!(f, "class {ty}"),
            Self::Uninit(ty) => write!(f, "uninitialized {ty}"),
            Self::Unknown(_) => write!(f, "Unknown"),

            Self::Object(object) => match &object.data {
                ObjectData::String(s) => write!(f, "{}", escape_str(s)),
                ObjectData::Boxed(inner) => write!(f, "{}({inner})", object.ty.java_name()),
                ObjectData::Method(method) => write!(f, "method {method}"),
                ObjectData::Opaque => write!(f, "{}@{}", object.ty, object.id.0),
            },

            Self::Array(array) => match (&array.elements, array.length) {
                (Some(elements), _) => {
                    write!(f, "[")?;

                    for (idx, element) in elements.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ", ")?;
                        }

                        write!(f, "{element}")?;
                    }

                    write!(f, "]")
                }

                (None, Some(length)) => write!(f, "[?; {length}]"),
                (None, None) => write!(f, "[?]"),
            },
        }
    }
}

/// Builds an array value of `elem_ty` with the given elements.
pub fn array_of(id: InstanceId, elem_ty: &Ty, elements: Vec<Value>) -> Value {
    Value::Array(Array {
        id,
        ty: elem_ty.array_of(),
        length: Some(elements.len()),
        elements: Some(elements.into()),
    })
}
