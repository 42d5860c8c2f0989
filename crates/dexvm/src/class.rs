use hashbrown::{HashMap, HashSet};
use log::debug;

use crate::method::Method;
use crate::ty::{self, AccessFlags, MethodRef, Ty};

/// A class read from text assembly, with the methods being optimized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: Ty,
    pub methods: Vec<Method>,
}

impl ClassDef {
    pub fn method(&self, reference: &MethodRef) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| &method.reference == reference)
    }
}

const FRAMEWORK_CLASSES: &[&str] = &[
    ty::OBJECT,
    ty::STRING,
    ty::CLASS,
    ty::INTEGER,
    ty::THROWABLE,
    ty::REFLECT_METHOD,
    ty::ARITHMETIC_EXCEPTION,
    ty::NULL_POINTER_EXCEPTION,
    ty::INDEX_EXCEPTION,
    ty::NEGATIVE_SIZE_EXCEPTION,
    ty::CLASS_CAST_EXCEPTION,
    ty::NUMBER_FORMAT_EXCEPTION,
    ty::CLASS_NOT_FOUND_EXCEPTION,
    "Ljava/lang/Boolean;",
    "Ljava/lang/Byte;",
    "Ljava/lang/Character;",
    "Ljava/lang/Short;",
    "Ljava/lang/Long;",
    "Ljava/lang/Float;",
    "Ljava/lang/Double;",
    "Ljava/lang/Math;",
    "Ljava/lang/System;",
    "Ljava/lang/StringBuilder;",
    "Ljava/lang/Exception;",
    "Ljava/lang/RuntimeException;",
    "Ljava/lang/Error;",
    "Ljava/io/PrintStream;",
];

/// Instances of these can't be modified through a reference.
const IMMUTABLE_CLASSES: &[&str] = &[
    ty::STRING,
    ty::CLASS,
    ty::INTEGER,
    "Ljava/lang/Boolean;",
    "Ljava/lang/Byte;",
    "Ljava/lang/Character;",
    "Ljava/lang/Short;",
    "Ljava/lang/Long;",
    "Ljava/lang/Float;",
    "Ljava/lang/Double;",
];

const RUNTIME_EXCEPTIONS: &[&str] = &[
    ty::ARITHMETIC_EXCEPTION,
    ty::NULL_POINTER_EXCEPTION,
    ty::INDEX_EXCEPTION,
    ty::NEGATIVE_SIZE_EXCEPTION,
    ty::CLASS_CAST_EXCEPTION,
    ty::NUMBER_FORMAT_EXCEPTION,
];

/// Resolves classes and methods against the framework table and the local classes.
#[derive(Debug, Clone, Default)]
pub struct ClassManager {
    framework: HashSet<Ty>,
    classes: HashMap<Ty, ClassDef>,
}

impl ClassManager {
    pub fn new() -> Self {
        Self {
            framework: FRAMEWORK_CLASSES.iter().map(|&name| Ty::new(name)).collect(),
            classes: HashMap::new(),
        }
    }

    pub fn add_class(&mut self, class: ClassDef) {
        debug!("loaded {} with {} methods", class.name, class.methods.len());
        self.classes.insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &Ty) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn is_local(&self, name: &Ty) -> bool {
        self.classes.contains_key(name)
    }

    pub fn is_framework(&self, name: &Ty) -> bool {
        self.framework.contains(name)
    }

    /// Whether `Class.forName` could find the class.
    pub fn is_known(&self, name: &Ty) -> bool {
        match name.element() {
            Some(element) if !element.is_reference() => true,
            Some(element) => self.is_known(&element),
            None => self.is_local(name) || self.is_framework(name),
        }
    }

    pub fn is_immutable(&self, name: &Ty) -> bool {
        name.is_primitive() || IMMUTABLE_CLASSES.contains(&name.as_str())
    }

    /// A local method with a body.
    pub fn method(&self, reference: &MethodRef) -> Option<&Method> {
        self.classes
            .get(&reference.class)?
            .method(reference)
            .filter(|method| !method.is_native_or_abstract())
    }

    /// Looks a method up by name and parameter types, as reflection does.
    pub fn find_method(&self, class: &Ty, name: &str, params: &[Ty]) -> Option<(MethodRef, AccessFlags)> {
        if let Some(class) = self.classes.get(class) {
            return class
                .methods
                .iter()
                .find(|method| &*method.reference.name == name && method.reference.params == params)
                .map(|method| (method.reference.clone(), method.flags));
        }

        crate::emulate::framework_method(class, name, params)
    }

    /// Replaces a local method's body after it has been optimized.
    pub fn update_method(&mut self, method: &Method) {
        let Some(class) = self.classes.get_mut(&method.reference.class) else {
            return;
        };

        if let Some(slot) = class
            .methods
            .iter_mut()
            .find(|m| m.reference == method.reference)
        {
            *slot = method.clone();
        }
    }

    /// Whether a handler declared for `handler` catches `thrown`.
    /// `None` means it depends on a hierarchy the manager can't see.
    pub fn catches(&self, handler: Option<&Ty>, thrown: &Ty) -> Option<bool> {
        let Some(handler) = handler else {
            return Some(true);
        };

        match handler.as_str() {
            _ if handler == thrown => Some(true),
            ty::THROWABLE => Some(true),
            "Ljava/lang/Exception;" | "Ljava/lang/RuntimeException;"
                if RUNTIME_EXCEPTIONS.contains(&thrown.as_str()) =>
            {
                Some(true)
            }
            _ if RUNTIME_EXCEPTIONS.contains(&thrown.as_str()) && self.is_framework(handler) => {
                Some(false)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catches() {
        let classes = ClassManager::new();
        let arith = Ty::new(ty::ARITHMETIC_EXCEPTION);

        assert_eq!(classes.catches(None, &arith), Some(true));
        assert_eq!(classes.catches(Some(&arith), &arith), Some(true));
        assert_eq!(classes.catches(Some(&Ty::new("Ljava/lang/Exception;")), &arith), Some(true));
        assert_eq!(classes.catches(Some(&Ty::new(ty::NULL_POINTER_EXCEPTION)), &arith), Some(false));
        assert_eq!(classes.catches(Some(&Ty::new("Lcustom/Error;")), &arith), None);
    }

    #[test]
    fn test_known_classes() {
        let classes = ClassManager::new();

        assert!(classes.is_known(&Ty::string()));
        assert!(classes.is_known(&Ty::new("[[I")));
        assert!(!classes.is_known(&Ty::new("Limaginary/Class;")));
        assert!(classes.is_immutable(&Ty::string()));
    }
}
