//! A smali-like text form of classes and methods.
//!
//! ```text
//! .class Lexample;
//! .method public static max(II)I
//!     .locals 1
//!     if-ge p0, p1, :first
//!     move v0, p1
//!     goto :done
//!   :first
//!     move v0, p0
//!   :done
//!     return v0
//! .end method
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::OnceLock;

use hashbrown::{HashMap, HashSet};
use regex::Regex;

use crate::class::ClassDef;
use crate::error::VmError;
use crate::insn::{BinOp, Cmp, CmpKind, Insn, InvokeKind, NumTy, Operand, UnOp};
use crate::method::{Addr, Handler, Method, TryBlock};
use crate::state::Reg;
use crate::ty::{AccessFlags, FieldRef, MethodRef, Ty};
use crate::util::float::{F32, F64};
use crate::value::Literal;

struct Patterns {
    register: Regex,
    label: Regex,
    catch: Regex,
    int: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();

    PATTERNS.get_or_init(|| Patterns {
        register: Regex::new(r"^([vp])([0-9]+)$").unwrap(),
        label: Regex::new(r"^:([A-Za-z0-9_$]+)$").unwrap(),
        catch: Regex::new(
            r"^\.catch[ \t]+([^ \t]+)[ \t]*\{[ \t]*(:[A-Za-z0-9_$]+)[ \t]*\.\.[ \t]*(:[A-Za-z0-9_$]+)[ \t]*\}[ \t]*(:[A-Za-z0-9_$]+)$",
        )
        .unwrap(),
        int: Regex::new(r"^(-)?(0x[0-9a-fA-F]+|[0-9]+)$").unwrap(),
    })
}

/// Parses one `.class` with its methods.
pub fn parse_class(text: &str) -> Result<ClassDef, VmError> {
    let err = |line: usize, message: String| VmError::Asm {
        method: "<class>".into(),
        line,
        message,
    };

    let mut class: Option<Ty> = None;
    let mut methods = vec![];
    let mut current: Option<MethodParser> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();

        if line.is_empty() {
            continue;
        }

        if let Some(parser) = &mut current {
            if line == ".end method" {
                if let Some(parser) = current.take() {
                    methods.push(parser.finish()?);
                }
            } else {
                parser.line(line_no, line)?;
            }

            continue;
        }

        if let Some(rest) = line.strip_prefix(".class") {
            let name = rest
                .split_whitespace()
                .last()
                .ok_or_else(|| err(line_no, "missing class name".into()))?;
            class = Some(Ty::parse(name)?);
        } else if let Some(rest) = line.strip_prefix(".method") {
            let class = class
                .clone()
                .ok_or_else(|| err(line_no, "`.method` before `.class`".into()))?;
            current = Some(MethodParser::new(class, line_no, rest)?);
        } else if line.starts_with(".source") || line.starts_with(".super") {
            continue;
        } else {
            return Err(err(line_no, format!("unexpected `{line}`")));
        }
    }

    if let Some(parser) = current {
        return Err(parser.error(parser.header_line, "missing `.end method`"));
    }

    Ok(ClassDef {
        name: class.ok_or_else(|| err(0, "missing `.class`".into()))?,
        methods,
    })
}

fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    let mut escaped = false;

    for (idx, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return &line[..idx],
            None => {}
        }
    }

    line
}

/// Splits on top-level commas, leaving quoted text and bracketed lists intact.
fn split_operands(s: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut quote = None;
    let mut escaped = false;
    let mut depth = 0i32;
    let mut start = 0;

    for (idx, c) in s.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}

            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' | '[' => depth += 1,
                '}' | ']' => depth -= 1,
                ',' if depth == 0 => {
                    parts.push(s[start..idx].trim());
                    start = idx + 1;
                }
                _ => {}
            },
        }
    }

    let last = s[start..].trim();

    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }

    parts
}

fn unescape(body: &str) -> Result<Vec<u16>, String> {
    let mut units = vec![];
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }

        match chars.next() {
            Some('n') => units.push(b'\n' as u16),
            Some('t') => units.push(b'\t' as u16),
            Some('r') => units.push(b'\r' as u16),
            Some('0') => units.push(0),
            Some(c @ ('"' | '\'' | '\\')) => units.push(c as u16),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let unit = u16::from_str_radix(&hex, 16)
                    .map_err(|_| format!("bad unicode escape `\\u{hex}`"))?;
                units.push(unit);
            }
            other => return Err(format!("bad escape `\\{}`", other.unwrap_or(' '))),
        }
    }

    Ok(units)
}

fn parse_int(text: &str) -> Option<i64> {
    let caps = patterns().int.captures(text)?;
    let digits = caps.get(2)?.as_str();

    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as i64,
        None => digits.parse::<i64>().ok()?,
    };

    Some(if caps.get(1).is_some() {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

pub fn parse_literal(text: &str) -> Result<Literal, String> {
    let bad = || format!("bad literal `{text}`");

    match text {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    if let Some(body) = text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        let units = unescape(body)?;

        return String::from_utf16(&units)
            .map(|s| Literal::String(s.into()))
            .map_err(|_| bad());
    }

    if let Some(body) = text.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return match unescape(body)?.as_slice() {
            &[unit] => Ok(Literal::Char(unit)),
            _ => Err(bad()),
        };
    }

    if text.starts_with('L') || text.starts_with('[') {
        return Ty::parse(text)
            .map(Literal::Class)
            .map_err(|e| e.to_string());
    }

    if let Some(value) = parse_int(text) {
        return i32::try_from(value)
            .or_else(|_| u32::try_from(value).map(|v| v as i32))
            .map(Literal::Int)
            .map_err(|_| bad());
    }

    let (body, suffix) = text.split_at(text.len().saturating_sub(1));

    match suffix {
        "L" => parse_int(body).map(Literal::Long).ok_or_else(bad),
        "s" => parse_int(body)
            .and_then(|v| i16::try_from(v).ok())
            .map(Literal::Short)
            .ok_or_else(bad),
        "t" => parse_int(body)
            .and_then(|v| i8::try_from(v).ok())
            .map(Literal::Byte)
            .ok_or_else(bad),
        "f" => body
            .parse::<f32>()
            .map(|v| Literal::Float(F32::from(v)))
            .map_err(|_| bad()),
        "d" => body
            .parse::<f64>()
            .map(|v| Literal::Double(F64::from(v)))
            .map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// Folds smali's width and operand-size variants onto the canonical opcode.
fn normalize(opcode: &str) -> &str {
    let base = match opcode.split_once('/') {
        Some((base, _)) if ["const", "move", "goto", "invoke-"].iter().any(|p| base.starts_with(p)) => {
            base
        }
        _ => opcode,
    };

    const WIDTHS: [&str; 6] = ["-wide", "-object", "-boolean", "-byte", "-char", "-short"];

    let widened = ["move", "return", "aget", "aput", "iget", "iput", "sget", "sput"];

    if widened.iter().any(|prefix| base.starts_with(prefix)) {
        for width in WIDTHS {
            if let Some(stripped) = base.strip_suffix(width) {
                return stripped;
            }
        }
    }

    base
}

fn arity(opcode: &str, ops: &[&str], n: usize) -> Result<(), String> {
    if ops.len() == n {
        Ok(())
    } else {
        Err(format!("`{opcode}` takes {n} operands, got {}", ops.len()))
    }
}

struct MethodParser {
    reference: MethodRef,
    flags: AccessFlags,
    header_line: usize,
    locals: u16,
    insns: Vec<Insn>,
    labels: HashMap<String, usize>,
    // label id -> index of the instruction that follows it
    label_pos: Vec<Option<usize>>,
    catches: Vec<(usize, Option<Ty>, usize, usize, usize)>,
}

impl MethodParser {
    fn new(class: Ty, line: usize, header: &str) -> Result<Self, VmError> {
        let mut words = header.split_whitespace().collect::<Vec<_>>();
        let err = |message: String| VmError::Asm {
            method: header.trim().into(),
            line,
            message,
        };

        let signature = words.pop().ok_or_else(|| err("missing method name".into()))?;
        let mut flags = AccessFlags::empty();

        for word in words {
            flags |= AccessFlags::from_keyword(word)
                .ok_or_else(|| err(format!("unknown access flag `{word}`")))?;
        }

        let reference = MethodRef::from_str(&format!("{class}->{signature}"))?;

        if reference.is_constructor() {
            flags |= AccessFlags::CONSTRUCTOR;
        }

        Ok(Self {
            reference,
            flags,
            header_line: line,
            locals: 0,
            insns: vec![],
            labels: HashMap::new(),
            label_pos: vec![],
            catches: vec![],
        })
    }

    fn error(&self, line: usize, message: impl Into<String>) -> VmError {
        VmError::Asm {
            method: self.reference.to_string(),
            line,
            message: message.into(),
        }
    }

    fn label_id(&mut self, name: &str) -> usize {
        if let Some(&id) = self.labels.get(name) {
            return id;
        }

        let id = self.label_pos.len();
        self.labels.insert(name.to_owned(), id);
        self.label_pos.push(None);

        id
    }

    fn label_ref(&mut self, text: &str) -> Result<Addr, String> {
        let caps = patterns()
            .label
            .captures(text)
            .ok_or_else(|| format!("expected a label, got `{text}`"))?;

        // targets hold label ids until layout
        Ok(Addr(self.label_id(&caps[1]) as u32))
    }

    fn line(&mut self, line_no: usize, line: &str) -> Result<(), VmError> {
        if let Some(rest) = line.strip_prefix(".locals") {
            self.locals = rest
                .trim()
                .parse()
                .map_err(|_| self.error(line_no, "bad `.locals` count"))?;
        } else if line.starts_with(".registers") {
            return Err(self.error(line_no, "use `.locals`"));
        } else if line.starts_with(".catch") {
            let caps = patterns()
                .catch
                .captures(line)
                .ok_or_else(|| self.error(line_no, "malformed `.catch`"))?;

            let ty = match &caps[1] {
                "all" => None,
                ty => Some(Ty::parse(ty)?),
            };

            let (start, end, handler) = (
                self.label_id(&caps[2][1..]),
                self.label_id(&caps[3][1..]),
                self.label_id(&caps[4][1..]),
            );

            self.catches.push((line_no, ty, start, end, handler));
        } else if line.starts_with('.') {
            // .line, .param, .annotation and friends carry no semantics here
        } else if let Some(caps) = patterns().label.captures(line) {
            let id = self.label_id(&caps[1]);

            if self.label_pos[id].is_some() {
                return Err(self.error(line_no, format!("duplicate label `{line}`")));
            }

            self.label_pos[id] = Some(self.insns.len());
        } else {
            let (opcode, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let ops = split_operands(rest.trim());
            let insn = self
                .insn(opcode, &ops)
                .map_err(|message| self.error(line_no, message))?;
            self.insns.push(insn);
        }

        Ok(())
    }

    fn reg(&self, text: &str) -> Result<Reg, String> {
        let caps = patterns()
            .register
            .captures(text)
            .ok_or_else(|| format!("expected a register, got `{text}`"))?;
        let idx: Reg = caps[2]
            .parse()
            .map_err(|_| format!("register `{text}` out of range"))?;

        Ok(match &caps[1] {
            "p" => self.locals + idx,
            _ => idx,
        })
    }

    fn regs(&self, text: &str) -> Result<Vec<Reg>, String> {
        let inner = text
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| format!("expected a register list, got `{text}`"))?
            .trim();

        if let Some((first, last)) = inner.split_once("..") {
            let (first, last) = (self.reg(first.trim())?, self.reg(last.trim())?);

            return Ok((first..=last).collect());
        }

        split_operands(inner)
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| self.reg(s))
            .collect()
    }

    fn ty(text: &str) -> Result<Ty, String> {
        Ty::parse(text).map_err(|e| e.to_string())
    }

    fn insn(&mut self, opcode: &str, ops: &[&str]) -> Result<Insn, String> {
        let opcode = normalize(opcode);

        Ok(match opcode {
            "nop" => Insn::Nop,

            "const" | "const-wide" | "const-string" | "const-class" => {
                arity(opcode, ops, 2)?;

                Insn::Const {
                    dst: self.reg(ops[0])?,
                    value: parse_literal(ops[1])?,
                }
            }

            "move" => {
                arity(opcode, ops, 2)?;

                Insn::Move {
                    dst: self.reg(ops[0])?,
                    src: self.reg(ops[1])?,
                }
            }

            "move-result" | "move-exception" | "return" | "throw" => {
                arity(opcode, ops, 1)?;
                let reg = self.reg(ops[0])?;

                match opcode {
                    "move-result" => Insn::MoveResult { dst: reg },
                    "move-exception" => Insn::MoveException { dst: reg },
                    "return" => Insn::Return { src: reg },
                    _ => Insn::Throw { src: reg },
                }
            }

            "return-void" => Insn::ReturnVoid,

            "goto" => {
                arity(opcode, ops, 1)?;

                Insn::Goto {
                    target: self.label_ref(ops[0])?,
                }
            }

            "switch" | "packed-switch" | "sparse-switch" => {
                arity(opcode, ops, 2)?;
                let src = self.reg(ops[0])?;
                let inner = ops[1]
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .ok_or_else(|| format!("expected a case list, got `{}`", ops[1]))?;
                let mut cases = vec![];

                for case in split_operands(inner).into_iter().filter(|s| !s.is_empty()) {
                    let (key, target) = case
                        .split_once("->")
                        .ok_or_else(|| format!("malformed case `{case}`"))?;
                    let key = parse_int(key.trim())
                        .and_then(|key| i32::try_from(key).ok())
                        .ok_or_else(|| format!("bad case key in `{case}`"))?;
                    cases.push((key, self.label_ref(target.trim())?));
                }

                Insn::Switch { src, cases }
            }

            "new-instance" | "check-cast" => {
                arity(opcode, ops, 2)?;
                let reg = self.reg(ops[0])?;
                let ty = Self::ty(ops[1])?;

                match opcode {
                    "new-instance" => Insn::NewInstance { dst: reg, ty },
                    _ => Insn::CheckCast { reg, ty },
                }
            }

            "instance-of" | "new-array" => {
                arity(opcode, ops, 3)?;
                let dst = self.reg(ops[0])?;
                let src = self.reg(ops[1])?;
                let ty = Self::ty(ops[2])?;

                match opcode {
                    "instance-of" => Insn::InstanceOf { dst, src, ty },
                    _ => Insn::NewArray { dst, size: src, ty },
                }
            }

            "array-length" => {
                arity(opcode, ops, 2)?;

                Insn::ArrayLength {
                    dst: self.reg(ops[0])?,
                    array: self.reg(ops[1])?,
                }
            }

            "aget" | "aput" => {
                arity(opcode, ops, 3)?;
                let (reg, array, index) = (self.reg(ops[0])?, self.reg(ops[1])?, self.reg(ops[2])?);

                match opcode {
                    "aget" => Insn::ArrayGet { dst: reg, array, index },
                    _ => Insn::ArrayPut { src: reg, array, index },
                }
            }

            "fill-array-data" => {
                arity(opcode, ops, 2)?;
                let inner = ops[1]
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .ok_or_else(|| format!("expected an element list, got `{}`", ops[1]))?;

                Insn::FillArrayData {
                    array: self.reg(ops[0])?,
                    data: split_operands(inner)
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(parse_literal)
                        .collect::<Result<_, _>>()?,
                }
            }

            "iget" | "iput" | "sget" | "sput" => {
                let instance = opcode.starts_with('i');
                arity(opcode, ops, if instance { 3 } else { 2 })?;
                let reg = self.reg(ops[0])?;
                let object = instance.then(|| self.reg(ops[1])).transpose()?;
                let field = FieldRef::from_str(ops[ops.len() - 1]).map_err(|e| e.to_string())?;

                match opcode {
                    "iget" | "sget" => Insn::FieldGet { dst: reg, object, field },
                    _ => Insn::FieldPut { src: reg, object, field },
                }
            }

            _ if opcode.starts_with("invoke-") => {
                arity(opcode, ops, 2)?;
                let kind = InvokeKind::from_str(&opcode["invoke-".len()..])
                    .map_err(|_| format!("unknown opcode `{opcode}`"))?;

                Insn::Invoke {
                    kind,
                    args: self.regs(ops[0])?,
                    method: MethodRef::from_str(ops[1]).map_err(|e| e.to_string())?,
                }
            }

            _ if opcode.starts_with("if-") => {
                let cond = &opcode["if-".len()..];

                if let Ok(cmp) = Cmp::from_str(cond) {
                    arity(opcode, ops, 3)?;

                    Insn::If {
                        cmp,
                        lhs: self.reg(ops[0])?,
                        rhs: Some(self.reg(ops[1])?),
                        target: self.label_ref(ops[2])?,
                    }
                } else {
                    let cmp = cond
                        .strip_suffix('z')
                        .and_then(|cond| Cmp::from_str(cond).ok())
                        .ok_or_else(|| format!("unknown opcode `{opcode}`"))?;
                    arity(opcode, ops, 2)?;

                    Insn::If {
                        cmp,
                        lhs: self.reg(ops[0])?,
                        rhs: None,
                        target: self.label_ref(ops[1])?,
                    }
                }
            }

            _ => {
                if let Ok(kind) = CmpKind::from_str(opcode) {
                    arity(opcode, ops, 3)?;

                    return Ok(Insn::Compare {
                        kind,
                        dst: self.reg(ops[0])?,
                        lhs: self.reg(ops[1])?,
                        rhs: self.reg(ops[2])?,
                    });
                }

                if let Ok(op) = UnOp::from_str(opcode) {
                    arity(opcode, ops, 2)?;

                    return Ok(Insn::Unary {
                        op,
                        dst: self.reg(ops[0])?,
                        src: self.reg(ops[1])?,
                    });
                }

                self.binary(opcode, ops)?
            }
        })
    }

    fn binary(&self, opcode: &str, ops: &[&str]) -> Result<Insn, String> {
        let unknown = || format!("unknown opcode `{opcode}`");
        let (base, suffix) = opcode.split_once('/').unwrap_or((opcode, ""));
        let (op, ty) = base.split_once('-').ok_or_else(unknown)?;
        let op = BinOp::from_str(op).map_err(|_| unknown())?;
        let ty = NumTy::from_str(ty).map_err(|_| unknown())?;

        match suffix {
            "" => {
                arity(opcode, ops, 3)?;

                Ok(Insn::Binary {
                    op,
                    ty,
                    dst: self.reg(ops[0])?,
                    lhs: self.reg(ops[1])?,
                    rhs: Operand::Reg(self.reg(ops[2])?),
                })
            }

            "2addr" => {
                arity(opcode, ops, 2)?;
                let dst = self.reg(ops[0])?;

                Ok(Insn::Binary {
                    op,
                    ty,
                    dst,
                    lhs: dst,
                    rhs: Operand::Reg(self.reg(ops[1])?),
                })
            }

            "lit" | "lit8" | "lit16" if ty == NumTy::Int => {
                arity(opcode, ops, 3)?;
                let lit = parse_int(ops[2])
                    .and_then(|lit| i32::try_from(lit).ok())
                    .ok_or_else(|| format!("bad literal `{}`", ops[2]))?;

                Ok(Insn::Binary {
                    op,
                    ty,
                    dst: self.reg(ops[0])?,
                    lhs: self.reg(ops[1])?,
                    rhs: Operand::Lit(lit),
                })
            }

            _ => Err(unknown()),
        }
    }

    fn finish(mut self) -> Result<Method, VmError> {
        let mut addrs = Vec::with_capacity(self.insns.len());
        let mut addr = Addr(0);

        for insn in &self.insns {
            addrs.push(addr);
            addr = addr.offset(insn.code_units());
        }

        let end = addr;
        let names = self
            .labels
            .iter()
            .map(|(name, &id)| (id, name.clone()))
            .collect::<HashMap<_, _>>();

        let mut insns = std::mem::take(&mut self.insns);
        let resolve = |id: usize| -> Result<Addr, VmError> {
            let pos = self.label_pos[id].ok_or_else(|| {
                self.error(self.header_line, format!("undefined label `:{}`", names[&id]))
            })?;

            Ok(addrs.get(pos).copied().unwrap_or(end))
        };

        for insn in &mut insns {
            for target in insn.targets_mut() {
                *target = resolve(target.0 as usize)?;
            }
        }

        let mut tries: Vec<TryBlock> = vec![];

        for &(_, ref ty, start, end, handler) in &self.catches {
            let (start, end) = (resolve(start)?, resolve(end)?);
            let handler = Handler {
                ty: ty.clone(),
                target: resolve(handler)?,
            };

            match tries
                .iter_mut()
                .find(|block| block.start == start && block.end == end)
            {
                Some(block) => block.handlers.push(handler),
                None => tries.push(TryBlock {
                    start,
                    end,
                    handlers: vec![handler],
                }),
            }
        }

        let method = Method::new(self.reference, self.flags, self.locals, insns, tries);
        method.validate()?;

        Ok(method)
    }
}

/// Renders a method in the same text form [`parse_class`] reads.
pub fn print_method(method: &Method) -> impl Display + '_ {
    struct MethodPrinter<'a>(&'a Method);

    impl Display for MethodPrinter<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let method = self.0;
            let mut labels = HashSet::new();

            for insn in method.insns() {
                labels.extend(insn.targets());
            }

            for block in &method.tries {
                labels.extend([block.start, block.end]);
                labels.extend(block.handlers.iter().map(|handler| handler.target));
            }

            let flags = method
                .flags
                .difference(AccessFlags::CONSTRUCTOR)
                .keywords()
                .map(|keyword| format!("{keyword} "))
                .collect::<String>();

            writeln!(f, ".method {flags}{}", method.reference.signature())?;
            writeln!(f, "    .locals {}", method.locals())?;

            for block in &method.tries {
                for handler in &block.handlers {
                    let ty = handler
                        .ty
                        .as_ref()
                        .map_or_else(|| "all".to_owned(), Ty::to_string);

                    writeln!(
                        f,
                        "    .catch {ty} {{{} .. {}}} {}",
                        crate::insn::label(block.start),
                        crate::insn::label(block.end),
                        crate::insn::label(handler.target),
                    )?;
                }
            }

            for (addr, insn) in method.iter() {
                if labels.contains(&addr) {
                    writeln!(f, "  {}", crate::insn::label(addr))?;
                }

                writeln!(f, "    {}", insn.display(Some(method.locals())))?;
            }

            if labels.contains(&method.end()) {
                writeln!(f, "  {}", crate::insn::label(method.end()))?;
            }

            writeln!(f, ".end method")
        }
    }

    MethodPrinter(method)
}

pub fn print_class(class: &ClassDef) -> impl Display + '_ {
    struct ClassPrinter<'a>(&'a ClassDef);

    impl Display for ClassPrinter<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            writeln!(f, ".class {}", self.0.name)?;

            for method in &self.0.methods {
                writeln!(f)?;
                write!(f, "{}", print_method(method))?;
            }

            Ok(())
        }
    }

    ClassPrinter(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: &str = r#"
.class Lexample;

.method public static max(II)I
    .locals 1
    if-ge p0, p1, :first    # pick the larger one
    move v0, p1
    goto :done
  :first
    move v0, p0
  :done
    return v0
.end method
"#;

    #[test]
    fn test_parse_resolves_labels_and_params() {
        let class = parse_class(MAX).unwrap();
        let method = &class.methods[0];

        assert_eq!(method.register_count(), 3);
        assert_eq!(
            method.insns()[0],
            Insn::If {
                cmp: Cmp::Ge,
                lhs: 1,
                rhs: Some(2),
                target: Addr(6),
            }
        );
        assert_eq!(method.insns()[2], Insn::Goto { target: Addr(7) });
    }

    #[test]
    fn test_print_then_parse_is_stable() {
        let class = parse_class(MAX).unwrap();
        let printed = print_class(&class).to_string();
        let reparsed = parse_class(&printed).unwrap();

        assert_eq!(reparsed, class);
        assert!(printed.contains("    if-ge p0, p1, :addr_6\n"));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_literal("-0x10"), Ok(Literal::Int(-16)));
        assert_eq!(parse_literal("0xffffffff"), Ok(Literal::Int(-1)));
        assert_eq!(parse_literal("5L"), Ok(Literal::Long(5)));
        assert_eq!(parse_literal("-3t"), Ok(Literal::Byte(-3)));
        assert_eq!(parse_literal("'\\u0041'"), Ok(Literal::Char(0x41)));
        assert_eq!(
            parse_literal(r#""a, \"b\"""#),
            Ok(Literal::String("a, \"b\"".into()))
        );
        assert!(parse_literal("1.5f").is_ok());
        assert!(parse_literal("bogus").is_err());
    }

    #[test]
    fn test_catch_and_switch() {
        let text = r#"
.class Lt;
.method static m(I)V
    .locals 1
  :start
    div-int/lit v0, p0, 2
    switch p0, {1 -> :one, 5 -> :start}
  :end
    return-void
  :one
    return-void
  :handler
    move-exception v0
    return-void
    .catch Ljava/lang/ArithmeticException; {:start .. :end} :handler
.end method
"#;

        let class = parse_class(text).unwrap();
        let method = &class.methods[0];

        assert_eq!(method.tries.len(), 1);
        assert_eq!(method.tries[0].end, Addr(5));
        assert_eq!(method.tries[0].handlers[0].target, Addr(7));
        assert_eq!(method.insns()[1].targets(), vec![Addr(6), Addr(0)]);
    }

    #[test]
    fn test_errors_name_the_line() {
        let text = ".class Lt;\n.method static m()V\n    frobnicate v0\n.end method\n";

        match parse_class(text) {
            Err(VmError::Asm { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
