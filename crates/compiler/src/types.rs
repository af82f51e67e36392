//! Datatype representation and the interning context.
//!
//! Every type the compiler reasons about is a [`DataType`] handle owned by
//! the [`TypeContext`] for the duration of the compilation. Interning keeps
//! one canonical handle per structural type, so handle identity and
//! structural equality coincide.

use std::collections::HashMap;
use std::rc::Rc;

/// Canonical handle to an interned datatype.
pub type TypeHandle = Rc<DataType>;

/// A datatype. Compound types own their element type recursively; class
/// types are identified by the djb2 hash of the class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Float,
    Char,
    Void,
    Generic,
    Class(u64),
    Array(TypeHandle),
    Option(TypeHandle),
}

impl DataType {
    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(_))
    }

    /// Element type of an array or payload of an option.
    pub fn subtype(&self) -> Option<&TypeHandle> {
        match self {
            DataType::Array(sub) | DataType::Option(sub) => Some(sub),
            _ => None,
        }
    }

    /// Class id, 0 for non-class types.
    pub fn id(&self) -> u64 {
        match self {
            DataType::Class(id) => *id,
            _ => 0,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Char => write!(f, "char"),
            DataType::Void => write!(f, "void"),
            DataType::Generic => write!(f, "generic"),
            DataType::Class(_) => write!(f, "type"),
            DataType::Array(sub) => write!(f, "{}[]", sub),
            DataType::Option(sub) => write!(f, "option<{}>", sub),
        }
    }
}

/// Structural type equality: tags and class ids equal, subtypes recursively
/// equal. With interning this coincides with handle identity.
pub fn datatype_match(a: &DataType, b: &DataType) -> bool {
    a == b
}

/// djb2 string hash; produces the ids that identify class datatypes.
pub fn djb2(name: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in name.bytes() {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u64::from(byte));
    }
    hash
}

/// Canonicalising store for datatypes. Named types (primitives, `str`,
/// classes) live in the name table; structural compounds built during
/// parsing and lowering live in the side table.
pub struct TypeContext {
    types: HashMap<String, TypeHandle>,
    extra: Vec<TypeHandle>,
    null_type: TypeHandle,
}

impl TypeContext {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        types.insert("void".to_string(), Rc::new(DataType::Void));
        types.insert("bool".to_string(), Rc::new(DataType::Bool));
        types.insert("int".to_string(), Rc::new(DataType::Int));
        types.insert("float".to_string(), Rc::new(DataType::Float));
        types.insert("char".to_string(), Rc::new(DataType::Char));
        types.insert("generic".to_string(), Rc::new(DataType::Generic));

        let char_type = types["char"].clone();
        types.insert("str".to_string(), Rc::new(DataType::Array(char_type)));

        TypeContext {
            types,
            extra: Vec::new(),
            null_type: Rc::new(DataType::Null),
        }
    }

    /// Canonical datatype registered under `name`, creating a class type
    /// with id `djb2(name)` if the name is unknown.
    pub fn intern(&mut self, name: &str) -> TypeHandle {
        if let Some(existing) = self.types.get(name) {
            return existing.clone();
        }
        let class = Rc::new(DataType::Class(djb2(name)));
        self.types.insert(name.to_string(), class.clone());
        class
    }

    /// Canonical datatype registered under `name`, if any.
    pub fn get(&self, name: &str) -> Option<TypeHandle> {
        self.types.get(name).cloned()
    }

    /// Canonical handle for a structural type: an existing match from the
    /// name table or the side table, otherwise a fresh entry.
    pub fn find_or_create(&mut self, ty: DataType) -> TypeHandle {
        for existing in self.types.values() {
            if **existing == ty {
                return existing.clone();
            }
        }
        for existing in &self.extra {
            if **existing == ty {
                return existing.clone();
            }
        }
        let handle = Rc::new(ty);
        self.extra.push(handle.clone());
        handle
    }

    pub fn null_type(&self) -> TypeHandle {
        self.null_type.clone()
    }

    pub fn void_type(&self) -> TypeHandle {
        self.types["void"].clone()
    }

    pub fn bool_type(&self) -> TypeHandle {
        self.types["bool"].clone()
    }

    pub fn int_type(&self) -> TypeHandle {
        self.types["int"].clone()
    }

    pub fn float_type(&self) -> TypeHandle {
        self.types["float"].clone()
    }

    pub fn char_type(&self) -> TypeHandle {
        self.types["char"].clone()
    }

    pub fn generic_type(&self) -> TypeHandle {
        self.types["generic"].clone()
    }

    pub fn str_type(&self) -> TypeHandle {
        self.types["str"].clone()
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_is_array_of_char() {
        let ctx = TypeContext::new();
        let str_type = ctx.str_type();
        assert_eq!(*str_type, DataType::Array(ctx.char_type()));
    }

    #[test]
    fn test_intern_creates_class_with_djb2_id() {
        let mut ctx = TypeContext::new();
        let point = ctx.intern("Point");
        assert_eq!(*point, DataType::Class(djb2("Point")));
        // Second intern returns the same handle
        let again = ctx.intern("Point");
        assert!(Rc::ptr_eq(&point, &again));
    }

    #[test]
    fn test_intern_of_primitive_names_returns_primitives() {
        let mut ctx = TypeContext::new();
        assert_eq!(*ctx.intern("int"), DataType::Int);
        assert_eq!(*ctx.intern("str"), DataType::Array(ctx.char_type()));
    }

    #[test]
    fn test_find_or_create_is_canonical() {
        let mut ctx = TypeContext::new();
        let int_array = ctx.find_or_create(DataType::Array(ctx.int_type()));
        let again = ctx.find_or_create(DataType::Array(ctx.int_type()));
        assert!(Rc::ptr_eq(&int_array, &again));
    }

    #[test]
    fn test_find_or_create_reuses_named_types() {
        // array(char) must resolve to the canonical `str`, not a duplicate
        let mut ctx = TypeContext::new();
        let char_array = ctx.find_or_create(DataType::Array(ctx.char_type()));
        assert!(Rc::ptr_eq(&char_array, &ctx.str_type()));
    }

    #[test]
    fn test_handle_identity_iff_structural_equality() {
        let mut ctx = TypeContext::new();
        let a = ctx.find_or_create(DataType::Option(ctx.int_type()));
        let b = ctx.find_or_create(DataType::Option(ctx.int_type()));
        let c = ctx.find_or_create(DataType::Option(ctx.float_type()));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert!(!Rc::ptr_eq(&a, &c));
        assert_ne!(a, c);
    }

    #[test]
    fn test_datatype_match_is_recursive() {
        let mut ctx = TypeContext::new();
        let inner = ctx.find_or_create(DataType::Array(ctx.int_type()));
        let nested_a = ctx.find_or_create(DataType::Array(inner.clone()));
        let nested_b = ctx.find_or_create(DataType::Array(inner.clone()));
        assert!(datatype_match(&nested_a, &nested_b));
        assert!(!datatype_match(&nested_a, &inner));
    }

    #[test]
    fn test_distinct_class_names_distinct_ids() {
        let mut ctx = TypeContext::new();
        let a = ctx.intern("Alpha");
        let b = ctx.intern("Beta");
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), 0);
    }
}
