//! Framework methods whose effect is simulated instead of treated as opaque.

use std::rc::Rc;
use std::sync::OnceLock;

use hashbrown::HashMap;

use crate::class::ClassManager;
use crate::exec::Heap;
use crate::ty::{self, AccessFlags, MethodRef, Ty};
use crate::value::{ObjectData, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// For constructors, the value the receiver becomes.
    Return(Value),
    Void,
    Throw(Ty),
    /// Nothing is known; the call is treated like any opaque call.
    Unknown,
}

type EmulatedFn = fn(&mut Heap, &ClassManager, &[Value]) -> Effect;

pub struct Emulated {
    pub func: EmulatedFn,
    pub flags: AccessFlags,
    /// No effects beyond the result, and no exceptions for a non-null receiver.
    pub pure: bool,
}

fn table() -> &'static HashMap<&'static str, Emulated> {
    static TABLE: OnceLock<HashMap<&'static str, Emulated>> = OnceLock::new();

    TABLE.get_or_init(|| {
        let public = AccessFlags::PUBLIC;
        let statik = AccessFlags::PUBLIC | AccessFlags::STATIC;
        let ctor = AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR;

        let entries: [(&str, EmulatedFn, AccessFlags, bool); 14] = [
            ("Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;", class_for_name, statik, false),
            ("Ljava/lang/Class;->getName()Ljava/lang/String;", class_get_name, public, true),
            (
                "Ljava/lang/Class;->getMethod(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;",
                class_get_method,
                public,
                false,
            ),
            (
                "Ljava/lang/Class;->getDeclaredMethod(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;",
                class_get_method,
                public,
                false,
            ),
            ("Ljava/lang/String;-><init>([B)V", string_from_bytes, ctor, false),
            ("Ljava/lang/String;-><init>([C)V", string_from_chars, ctor, false),
            ("Ljava/lang/String;-><init>(Ljava/lang/String;)V", string_from_string, ctor, false),
            ("Ljava/lang/String;->length()I", string_length, public, true),
            ("Ljava/lang/String;->equals(Ljava/lang/Object;)Z", string_equals, public, true),
            ("Ljava/lang/String;->valueOf(I)Ljava/lang/String;", string_value_of_int, statik, true),
            ("Ljava/lang/String;->toString()Ljava/lang/String;", string_to_string, public, true),
            ("Ljava/lang/Integer;->valueOf(I)Ljava/lang/Integer;", integer_value_of, statik, true),
            ("Ljava/lang/Integer;->intValue()I", integer_int_value, public, true),
            ("Ljava/lang/Integer;->parseInt(Ljava/lang/String;)I", integer_parse_int, statik, false),
        ];

        entries
            .into_iter()
            .map(|(name, func, flags, pure)| (name, Emulated { func, flags, pure }))
            .collect()
    })
}

pub fn lookup(method: &MethodRef) -> Option<&'static Emulated> {
    table().get(method.to_string().as_str())
}

pub fn is_pure(method: &MethodRef) -> bool {
    lookup(method).is_some_and(|emulated| emulated.pure)
}

/// Resolves a reflective lookup against the emulated framework methods.
pub fn framework_method(class: &Ty, name: &str, params: &[Ty]) -> Option<(MethodRef, AccessFlags)> {
    table().iter().find_map(|(&text, emulated)| {
        let reference: MethodRef = text.parse().ok()?;

        (&reference.class == class && &*reference.name == name && reference.params == params)
            .then(|| (reference, emulated.flags))
    })
}

fn throw(name: &str) -> Effect {
    Effect::Throw(Ty::new(name))
}

fn class_for_name(_: &mut Heap, classes: &ClassManager, args: &[Value]) -> Effect {
    match &args[0] {
        Value::Null(_) => throw(ty::NULL_POINTER_EXCEPTION),

        name => match name.as_str().map(Ty::from_java_name) {
            Some(ty) if classes.is_known(&ty) => Effect::Return(Value::Class(ty)),
            _ => Effect::Unknown,
        },
    }
}

fn class_get_name(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match &args[0] {
        Value::Class(ty) => Effect::Return(heap.new_string(&ty.java_name())),
        _ => Effect::Unknown,
    }
}

fn class_get_method(heap: &mut Heap, classes: &ClassManager, args: &[Value]) -> Effect {
    let (Value::Class(class), Some(name)) = (&args[0], args[1].as_str()) else {
        return Effect::Unknown;
    };

    let params = match &args[2] {
        Value::Null(_) => vec![],
        params => match params.elements() {
            Some(elements) => {
                let tys = elements
                    .iter()
                    .map(|element| match element {
                        Value::Class(ty) => Some(ty.clone()),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>();

                match tys {
                    Some(tys) => tys,
                    None => return Effect::Unknown,
                }
            }
            None => return Effect::Unknown,
        },
    };

    match classes.find_method(class, name, &params) {
        Some((reference, _)) => Effect::Return(heap.object(
            Ty::new(ty::REFLECT_METHOD),
            ObjectData::Method(Rc::new(reference)),
        )),
        None => Effect::Unknown,
    }
}

fn string_from_bytes(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[1].as_bytes() {
        Some(bytes) => Effect::Return(heap.new_string(&String::from_utf8_lossy(&bytes))),
        None => Effect::Unknown,
    }
}

fn string_from_chars(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[1].as_chars() {
        Some(chars) => Effect::Return(heap.new_string(&String::from_utf16_lossy(&chars))),
        None => Effect::Unknown,
    }
}

fn string_from_string(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match (&args[1], args[1].as_str()) {
        (Value::Null(_), _) => throw(ty::NULL_POINTER_EXCEPTION),
        (_, Some(s)) => Effect::Return(heap.new_string(s)),
        _ => Effect::Unknown,
    }
}

fn string_length(_: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[0].as_str() {
        Some(s) => Effect::Return(Value::Int(s.encode_utf16().count() as i32)),
        None => Effect::Unknown,
    }
}

fn string_equals(_: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    let Some(lhs) = args[0].as_str() else {
        return Effect::Unknown;
    };

    match &args[1] {
        Value::Unknown(_) | Value::Uninit(_) => Effect::Unknown,
        rhs => Effect::Return(Value::Boolean(rhs.as_str() == Some(lhs))),
    }
}

fn string_value_of_int(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[0].as_i32() {
        Some(value) => Effect::Return(heap.new_string(&value.to_string())),
        None => Effect::Unknown,
    }
}

fn string_to_string(_: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[0].as_str() {
        Some(_) => Effect::Return(args[0].clone()),
        None => Effect::Unknown,
    }
}

fn integer_value_of(heap: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[0].as_i32() {
        Some(value) => Effect::Return(heap.object(
            Ty::new(ty::INTEGER),
            ObjectData::Boxed(Rc::new(Value::Int(value))),
        )),
        None => Effect::Unknown,
    }
}

fn integer_int_value(_: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match args[0].unboxed().and_then(Value::as_i32) {
        Some(value) => Effect::Return(Value::Int(value)),
        None => Effect::Unknown,
    }
}

fn integer_parse_int(_: &mut Heap, _: &ClassManager, args: &[Value]) -> Effect {
    match (&args[0], args[0].as_str()) {
        (Value::Null(_), _) => throw(ty::NUMBER_FORMAT_EXCEPTION),
        (_, Some(s)) => match s.parse::<i32>() {
            Ok(value) => Effect::Return(Value::Int(value)),
            Err(_) => throw(ty::NUMBER_FORMAT_EXCEPTION),
        },
        _ => Effect::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Effect {
        let method: MethodRef = name.parse().unwrap();
        let emulated = lookup(&method).unwrap();

        (emulated.func)(&mut Heap::default(), &ClassManager::new(), args)
    }

    #[test]
    fn test_for_name() {
        let mut heap = Heap::default();
        let name = heap.intern("java.lang.String");
        let method = "Ljava/lang/Class;->forName(Ljava/lang/String;)Ljava/lang/Class;";

        assert_eq!(call(method, &[name]), Effect::Return(Value::Class(Ty::string())));
        assert_eq!(call(method, &[Value::unknown(ty::STRING)]), Effect::Unknown);
    }

    #[test]
    fn test_parse_int_throws_on_garbage() {
        let mut heap = Heap::default();
        let method = "Ljava/lang/Integer;->parseInt(Ljava/lang/String;)I";

        assert_eq!(call(method, &[heap.intern("-42")]), Effect::Return(Value::Int(-42)));
        assert_eq!(
            call(method, &[heap.intern("4x")]),
            Effect::Throw(Ty::new(ty::NUMBER_FORMAT_EXCEPTION))
        );
    }

    #[test]
    fn test_framework_method_lookup() {
        let (reference, flags) =
            framework_method(&Ty::new(ty::INTEGER), "valueOf", &[Ty::int()]).unwrap();

        assert_eq!(reference.ret, Ty::new(ty::INTEGER));
        assert!(flags.contains(AccessFlags::STATIC));
        assert!(is_pure(&reference));
    }
}
