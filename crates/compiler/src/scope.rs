//! Lexical scopes and symbols.
//!
//! The symbol graph is cyclic (a field symbol points at its owning class
//! symbol, which lists its fields), so both scopes and symbols live in
//! handle-indexed arenas owned by the compiler; every link is an index.
//!
//! Virtual scopes back `if`/`while` bodies: they share the parent's slot
//! counter and do not count as closure boundaries when resolving names.

use std::collections::HashMap;

use enumflags2::BitFlags;

use crate::ast::Annotation;
use crate::lexer::Location;
use crate::types::TypeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId(usize);

/// What kind of declaration a symbol stands for, with the declaration data
/// the compiler needs to re-check uses later.
#[derive(Debug, Clone)]
pub enum SymbolKind {
    Var {
        mutable: bool,
    },
    Func {
        params: Vec<TypeHandle>,
        rettype: TypeHandle,
        /// 1-based host intrinsic index; 0 for bytecode functions.
        external: i32,
    },
    Class {
        params: Vec<TypeHandle>,
        /// Field name → symbol, filled while the class body compiles.
        fields: HashMap<String, SymbolId>,
    },
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Declaration site, reported on redefinition.
    pub location: Location,
    pub kind: SymbolKind,
    /// Storage slot: negative = parameter relative to the frame pointer,
    /// non-negative = local or global slot. Functions store their bytecode
    /// entry address here (-1 for externals).
    pub address: i32,
    pub ty: TypeHandle,
    pub global: bool,
    pub is_class_param: bool,
    /// Enclosing class symbol when this is a class field or method.
    pub owner: Option<SymbolId>,
    /// Statically known array length, -1 if unknown.
    pub array_size: i32,
}

impl Symbol {
    pub fn is_mutable(&self) -> bool {
        matches!(self.kind, SymbolKind::Var { mutable: true })
    }

    pub fn is_var(&self) -> bool {
        matches!(self.kind, SymbolKind::Var { .. })
    }

    pub fn is_func(&self) -> bool {
        matches!(self.kind, SymbolKind::Func { .. })
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, SymbolKind::Class { .. })
    }
}

/// Which construct opened a scope. Return statements and class-field access
/// rules look upward for the nearest function or class scope.
#[derive(Debug, Clone)]
pub enum ScopeKind {
    Toplevel,
    Function { rettype: TypeHandle },
    Class { name: String },
    /// Virtual block scope of an `if`/`while` body.
    Block,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    symbols: HashMap<String, SymbolId>,
    classes: HashMap<String, SymbolId>,
    /// Next free local slot.
    pub next_address: i32,
    /// Pending annotation flags, consumed by the next declaration.
    pub flags: BitFlags<Annotation>,
    pub is_virtual: bool,
}

/// Arena owning every scope and symbol of one compilation.
pub struct ScopeArena {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl ScopeArena {
    /// Create the arena with the root (toplevel, global) scope.
    pub fn new() -> Self {
        ScopeArena {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Toplevel,
                symbols: HashMap::new(),
                classes: HashMap::new(),
                next_address: 0,
                flags: BitFlags::empty(),
                is_virtual: false,
            }],
            symbols: Vec::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    /// Open a counting subscope with a fresh slot frame.
    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            symbols: HashMap::new(),
            classes: HashMap::new(),
            next_address: 0,
            flags: BitFlags::empty(),
            is_virtual: false,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Open a virtual subscope sharing the parent's slot counter. Names
    /// resolved through it cross no closure boundary.
    pub fn push_virtual(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let next_address = self.scopes[parent.0].next_address;
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            symbols: HashMap::new(),
            classes: HashMap::new(),
            next_address,
            flags: BitFlags::empty(),
            is_virtual: true,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Register a symbol in a scope. The caller has already checked for
    /// redefinition.
    pub fn define(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        let id = SymbolId(self.symbols.len() - 1);
        self.scopes[scope.0].symbols.insert(name, id);
        id
    }

    /// Register a symbol in a scope's class map as well.
    pub fn define_class(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let name = symbol.name.clone();
        let id = self.define(scope, symbol);
        self.scopes[scope.0].classes.insert(name, id);
        id
    }

    pub fn class_in_scope(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0].classes.get(name).copied()
    }

    /// Walk the scope chain for a name.
    pub fn lookup(&self, from: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(symbol) = scope.symbols.get(name) {
                return Some(*symbol);
            }
            current = scope.parent;
        }
        None
    }

    /// Walk the scope chain for a name, counting the non-virtual boundaries
    /// crossed (the closure depth of the use site).
    pub fn lookup_with_depth(&self, from: ScopeId, name: &str) -> Option<(SymbolId, usize)> {
        let mut current = Some(from);
        let mut depth = 0;
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(symbol) = scope.symbols.get(name) {
                return Some((*symbol, depth));
            }
            if !scope.is_virtual {
                depth += 1;
            }
            current = scope.parent;
        }
        None
    }

    /// Find a class symbol by datatype id anywhere up the chain. Iterates
    /// each scope's class map with a local accumulator.
    pub fn find_class_by_id(&self, from: ScopeId, id: u64) -> Option<SymbolId> {
        let mut current = Some(from);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            let mut found = None;
            for symbol_id in scope.classes.values() {
                if self.symbols[symbol_id.0].ty.id() == id {
                    found = Some(*symbol_id);
                    break;
                }
            }
            if found.is_some() {
                return found;
            }
            current = scope.parent;
        }
        None
    }

    /// Nearest enclosing function scope, if any.
    pub fn enclosing_function(&self, from: ScopeId) -> Option<(ScopeId, TypeHandle)> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let ScopeKind::Function { rettype } = &scope.kind {
                return Some((id, rettype.clone()));
            }
            current = scope.parent;
        }
        None
    }

    /// Nearest enclosing class scope, if any.
    pub fn enclosing_class(&self, from: ScopeId) -> Option<(ScopeId, String)> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let ScopeKind::Class { name } = &scope.kind {
                return Some((id, name.clone()));
            }
            current = scope.parent;
        }
        None
    }

    /// True while the given annotation flag is pending on the scope.
    pub fn requests(&self, scope: ScopeId, annotation: Annotation) -> bool {
        self.scopes[scope.0].flags.contains(annotation)
    }

    pub fn set_flag(&mut self, scope: ScopeId, annotation: Annotation) {
        self.scopes[scope.0].flags |= annotation;
    }

    /// Consume all pending annotation flags.
    pub fn clear_flags(&mut self, scope: ScopeId) {
        self.scopes[scope.0].flags = BitFlags::empty();
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeContext;

    fn var(name: &str, ty: TypeHandle, address: i32) -> Symbol {
        Symbol {
            name: name.to_string(),
            location: Location::default(),
            kind: SymbolKind::Var { mutable: false },
            address,
            ty,
            global: false,
            is_class_param: false,
            owner: None,
            array_size: -1,
        }
    }

    #[test]
    fn test_lookup_walks_chain() {
        let ctx = TypeContext::new();
        let mut arena = ScopeArena::new();
        let root = arena.root();
        let x = arena.define(root, var("x", ctx.int_type(), 0));

        let inner = arena.push(root, ScopeKind::Function { rettype: ctx.void_type() });
        assert_eq!(arena.lookup(inner, "x"), Some(x));
        assert_eq!(arena.lookup(inner, "y"), None);
    }

    #[test]
    fn test_depth_counts_only_non_virtual_boundaries() {
        let ctx = TypeContext::new();
        let mut arena = ScopeArena::new();
        let root = arena.root();
        arena.define(root, var("x", ctx.int_type(), 0));

        let func = arena.push(root, ScopeKind::Function { rettype: ctx.void_type() });
        let block = arena.push_virtual(func, ScopeKind::Block);

        // From the virtual block: the block adds no depth, the function does
        let (_, depth) = arena.lookup_with_depth(block, "x").unwrap();
        assert_eq!(depth, 1);

        // A symbol in the block itself is at depth 0
        arena.define(block, var("y", ctx.int_type(), 0));
        let (_, depth) = arena.lookup_with_depth(block, "y").unwrap();
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_virtual_scope_shares_slot_counter() {
        let ctx = TypeContext::new();
        let mut arena = ScopeArena::new();
        let root = arena.root();
        let func = arena.push(root, ScopeKind::Function { rettype: ctx.void_type() });
        arena.scope_mut(func).next_address = 3;

        let block = arena.push_virtual(func, ScopeKind::Block);
        assert_eq!(arena.scope(block).next_address, 3);

        let counting = arena.push(func, ScopeKind::Function { rettype: ctx.void_type() });
        assert_eq!(arena.scope(counting).next_address, 0);
    }

    #[test]
    fn test_find_class_by_id() {
        let mut ctx = TypeContext::new();
        let mut arena = ScopeArena::new();
        let root = arena.root();
        let point = ctx.intern("Point");
        let class_id = point.id();
        let symbol = arena.define_class(
            root,
            Symbol {
                name: "Point".to_string(),
                location: Location::default(),
                kind: SymbolKind::Class { params: vec![], fields: HashMap::new() },
                address: 2,
                ty: point,
                global: true,
                is_class_param: false,
                owner: None,
                array_size: -1,
            },
        );

        let inner = arena.push(root, ScopeKind::Function { rettype: ctx.void_type() });
        assert_eq!(arena.find_class_by_id(inner, class_id), Some(symbol));
        assert_eq!(arena.find_class_by_id(inner, 0xdead), None);
    }

    #[test]
    fn test_annotation_flags_consume() {
        let mut arena = ScopeArena::new();
        let root = arena.root();
        assert!(!arena.requests(root, Annotation::Getter));
        arena.set_flag(root, Annotation::Getter);
        arena.set_flag(root, Annotation::Setter);
        assert!(arena.requests(root, Annotation::Getter));
        assert!(arena.requests(root, Annotation::Setter));
        arena.clear_flags(root);
        assert!(!arena.requests(root, Annotation::Getter));
    }

    #[test]
    fn test_enclosing_scopes() {
        let ctx = TypeContext::new();
        let mut arena = ScopeArena::new();
        let root = arena.root();
        let class = arena.push(root, ScopeKind::Class { name: "Pt".to_string() });
        let method = arena.push(class, ScopeKind::Function { rettype: ctx.int_type() });
        let block = arena.push_virtual(method, ScopeKind::Block);

        let (_, rettype) = arena.enclosing_function(block).unwrap();
        assert_eq!(*rettype, crate::types::DataType::Int);
        let (_, name) = arena.enclosing_class(block).unwrap();
        assert_eq!(name, "Pt");
        assert!(arena.enclosing_class(root).is_none());
    }
}
