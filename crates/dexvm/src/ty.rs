//! Type descriptors and member references.

use std::fmt::{self, Display};
use std::rc::Rc;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::VmError;

pub const OBJECT: &str = "Ljava/lang/Object;";
pub const STRING: &str = "Ljava/lang/String;";
pub const CLASS: &str = "Ljava/lang/Class;";
pub const THROWABLE: &str = "Ljava/lang/Throwable;";
pub const INTEGER: &str = "Ljava/lang/Integer;";
pub const REFLECT_METHOD: &str = "Ljava/lang/reflect/Method;";
pub const ARITHMETIC_EXCEPTION: &str = "Ljava/lang/ArithmeticException;";
pub const NULL_POINTER_EXCEPTION: &str = "Ljava/lang/NullPointerException;";
pub const INDEX_EXCEPTION: &str = "Ljava/lang/ArrayIndexOutOfBoundsException;";
pub const NEGATIVE_SIZE_EXCEPTION: &str = "Ljava/lang/NegativeArraySizeException;";
pub const CLASS_CAST_EXCEPTION: &str = "Ljava/lang/ClassCastException;";
pub const NUMBER_FORMAT_EXCEPTION: &str = "Ljava/lang/NumberFormatException;";
pub const CLASS_NOT_FOUND_EXCEPTION: &str = "Ljava/lang/ClassNotFoundException;";

/// A type descriptor such as `I`, `[B` or `Ljava/lang/String;`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ty(Rc<str>);

impl Ty {
    pub fn new(descriptor: &str) -> Self {
        Self(descriptor.into())
    }

    pub fn object() -> Self {
        Self::new(OBJECT)
    }

    pub fn string() -> Self {
        Self::new(STRING)
    }

    pub fn class() -> Self {
        Self::new(CLASS)
    }

    pub fn int() -> Self {
        Self::new("I")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts a binary name (`java.lang.String`, `[Ljava.lang.String;`) into a descriptor.
    pub fn from_java_name(name: &str) -> Self {
        if name.starts_with('[') {
            Self::new(&name.replace('.', "/"))
        } else {
            Self::new(&format!("L{};", name.replace('.', "/")))
        }
    }

    /// The inverse of [`Ty::from_java_name`]; primitive descriptors are returned as is.
    pub fn java_name(&self) -> String {
        match self.0.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
            Some(inner) if !self.is_array() => inner.replace('/', "."),
            _ => self.0.replace('/', "."),
        }
    }

    pub fn is_void(&self) -> bool {
        &*self.0 == "V"
    }

    pub fn is_primitive(&self) -> bool {
        matches!(&*self.0, "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D")
    }

    pub fn is_wide(&self) -> bool {
        matches!(&*self.0, "J" | "D")
    }

    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    pub fn is_reference(&self) -> bool {
        self.is_array() || self.0.starts_with('L')
    }

    pub fn element(&self) -> Option<Ty> {
        self.0.strip_prefix('[').map(Ty::new)
    }

    pub fn array_of(&self) -> Ty {
        Ty::new(&format!("[{}", self.0))
    }

    /// Checks the descriptor grammar.
    pub fn parse(descriptor: &str) -> Result<Self, VmError> {
        match parse_one(descriptor) {
            Some((ty, "")) => Ok(ty),
            _ => Err(VmError::InvalidDescriptor(descriptor.to_owned())),
        }
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Ty {
    fn from(descriptor: &str) -> Self {
        Self::new(descriptor)
    }
}

fn parse_one(s: &str) -> Option<(Ty, &str)> {
    let dims = s.bytes().take_while(|&b| b == b'[').count();

    let end = match s.as_bytes().get(dims)? {
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D' => dims + 1,
        b'V' if dims == 0 => 1,
        b'L' => dims + s[dims..].find(';')? + 1,
        _ => return None,
    };

    Some((Ty::new(&s[..end]), &s[end..]))
}

/// Splits `(IJ[B)V` into its parameter list and return type.
pub fn parse_proto(proto: &str) -> Result<(Vec<Ty>, Ty), VmError> {
    let err = || VmError::InvalidDescriptor(proto.to_owned());
    let mut rest = proto.strip_prefix('(').ok_or_else(err)?;
    let mut params = vec![];

    while !rest.starts_with(')') {
        let (ty, tail) = parse_one(rest).ok_or_else(err)?;

        if ty.is_void() {
            return Err(err());
        }

        params.push(ty);
        rest = tail;
    }

    let ret = Ty::parse(&rest[1..]).map_err(|_| err())?;

    Ok((params, ret))
}

/// A fully qualified method signature, `Lcls;->name(params)ret`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: Ty,
    pub name: Rc<str>,
    pub params: Vec<Ty>,
    pub ret: Ty,
}

impl MethodRef {
    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }

    /// The signature without the defining class, `name(params)ret`.
    pub fn signature(&self) -> String {
        format!(
            "{}({}){}",
            self.name,
            self.params.iter().map(Ty::as_str).collect::<String>(),
            self.ret
        )
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.class, self.signature())
    }
}

impl FromStr for MethodRef {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VmError::InvalidMethodRef(s.to_owned());
        let (class, member) = s.split_once("->").ok_or_else(err)?;
        let paren = member.find('(').ok_or_else(err)?;
        let (params, ret) = parse_proto(&member[paren..]).map_err(|_| err())?;
        let name = &member[..paren];

        if name.is_empty() {
            return Err(err());
        }

        Ok(Self {
            class: Ty::parse(class).map_err(|_| err())?,
            name: name.into(),
            params,
            ret,
        })
    }
}

/// A field reference, `Lcls;->name:Ty`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: Ty,
    pub name: Rc<str>,
    pub ty: Ty,
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.ty)
    }
}

impl FromStr for FieldRef {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VmError::InvalidFieldRef(s.to_owned());
        let (class, member) = s.split_once("->").ok_or_else(err)?;
        let (name, ty) = member.split_once(':').ok_or_else(err)?;

        Ok(Self {
            class: Ty::parse(class).map_err(|_| err())?,
            name: name.into(),
            ty: Ty::parse(ty).map_err(|_| err())?,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const NATIVE = 0x100;
        const ABSTRACT = 0x400;
        const CONSTRUCTOR = 0x10000;
    }
}

impl AccessFlags {
    const KEYWORDS: [(&'static str, AccessFlags); 9] = [
        ("public", Self::PUBLIC),
        ("private", Self::PRIVATE),
        ("protected", Self::PROTECTED),
        ("static", Self::STATIC),
        ("final", Self::FINAL),
        ("synchronized", Self::SYNCHRONIZED),
        ("native", Self::NATIVE),
        ("abstract", Self::ABSTRACT),
        ("constructor", Self::CONSTRUCTOR),
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(name, _)| *name == keyword)
            .map(|&(_, flag)| flag)
    }

    pub fn keywords(&self) -> impl Iterator<Item = &'static str> + '_ {
        Self::KEYWORDS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|&(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_names() {
        assert_eq!(Ty::from_java_name("java.lang.String").as_str(), STRING);
        assert_eq!(Ty::from_java_name("[Ljava.lang.String;").as_str(), "[Ljava/lang/String;");
        assert_eq!(Ty::new(STRING).java_name(), "java.lang.String");
        assert_eq!(Ty::new("[B").java_name(), "[B");
    }

    #[test]
    fn test_method_ref_round_trips() {
        let text = "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;";
        let method: MethodRef = text.parse().unwrap();

        assert_eq!(&*method.name, "forName");
        assert_eq!(method.params, vec![Ty::string()]);
        assert_eq!(method.ret, Ty::class());
        assert_eq!(method.to_string(), text);
    }

    #[test]
    fn test_proto_rejects_garbage() {
        assert!(parse_proto("(IQ)V").is_err());
        assert!(parse_proto("(V)V").is_err());
        assert_eq!(parse_proto("([[IJ)[B").unwrap().0.len(), 2);
    }
}
