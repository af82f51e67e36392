//! Abstract syntax tree for Opal.
//!
//! One sum type with a variant per node class. Every node carries its
//! source location; binary and unary operators reuse the token kind that
//! produced them.

use enumflags2::bitflags;

use crate::lexer::{Location, TokenKind};
use crate::types::TypeHandle;

/// Annotations attach compiler behaviour to the following declaration.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Synthesise a `getX()` accessor for the next class field.
    Getter = 0b001,
    /// Synthesise a `setX(v)` mutator for the next class field.
    Setter = 0b010,
    /// Suppress the next declaration entirely.
    Unused = 0b100,
}

/// A variable declaration; also used for function and class formals.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub mutable: bool,
    /// Absent for formals, present for `let` declarations.
    pub initializer: Option<Box<Node>>,
    /// Declared type. Formals carry their parsed type; `let` declarations
    /// get theirs inferred from the initializer during lowering.
    pub ty: TypeHandle,
}

/// A function declaration.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    /// Formal parameters, each a `DeclVar` node without initializer.
    pub formals: Vec<Node>,
    pub body: Vec<Node>,
    pub rettype: TypeHandle,
    /// Host intrinsic index, 1-based; 0 for ordinary functions.
    pub external: i32,
}

/// A class declaration. The constructor formals double as the class's
/// parameter list; fields and methods live in the body.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub formals: Vec<Node>,
    pub body: Vec<Node>,
}

/// One arm of an `if` chain; `cond` is `None` for the trailing `else`.
#[derive(Debug, Clone)]
pub struct IfClause {
    pub cond: Option<Box<Node>>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    /// `None<T>` literal; carries the declared payload type.
    NoneLit(TypeHandle),
    /// Array literal. `ty` is the element type: declared for the empty
    /// `[::T]` form, inferred from the first element otherwise.
    Array { elements: Vec<Node>, ty: TypeHandle },
    Binary { op: TokenKind, lhs: Box<Node>, rhs: Box<Node> },
    Unary { op: TokenKind, expr: Box<Node> },
    Subscript { expr: Box<Node>, key: Box<Node> },
    Call { callee: Box<Node>, args: Vec<Node> },
    DeclVar(VarDecl),
    DeclFunc(FuncDecl),
    If(Vec<Node>),
    IfClause(IfClause),
    While { cond: Box<Node>, body: Vec<Node> },
    Return(Option<Box<Node>>),
    Class(ClassDecl),
    Import(String),
    Annotation(Annotation),
    Block(Vec<Node>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub location: Location,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(location: Location, kind: NodeKind) -> Node {
        Node { location, kind }
    }

    pub fn is_literal_int(&self) -> bool {
        matches!(self.kind, NodeKind::Int(_))
    }

    pub fn is_literal_float(&self) -> bool {
        matches!(self.kind, NodeKind::Float(_))
    }

    /// Name of this node's class, for dumps and diagnostics.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Ident(_) => "ident",
            NodeKind::Int(_) => "int",
            NodeKind::Float(_) => "float",
            NodeKind::Bool(_) => "bool",
            NodeKind::Char(_) => "char",
            NodeKind::Str(_) => "string",
            NodeKind::NoneLit(_) => "none",
            NodeKind::Array { .. } => "array",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Subscript { .. } => "subscript",
            NodeKind::Call { .. } => "call",
            NodeKind::DeclVar(_) => "declvar",
            NodeKind::DeclFunc(_) => "declfunc",
            NodeKind::If(_) => "if",
            NodeKind::IfClause(_) => "ifclause",
            NodeKind::While { .. } => "while",
            NodeKind::Return(_) => "return",
            NodeKind::Class(_) => "class",
            NodeKind::Import(_) => "import",
            NodeKind::Annotation(_) => "annotation",
            NodeKind::Block(_) => "block",
        }
    }

    /// Short label for graph dumps: class name plus the salient payload.
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Ident(name) => format!("ident: {}", name),
            NodeKind::Int(n) => format!("int: {}", n),
            NodeKind::Float(f) => format!("float: {}", f),
            NodeKind::Bool(b) => format!("bool: {}", b),
            NodeKind::Char(c) => format!("char: {:?}", c),
            NodeKind::Str(s) => format!("string: {:?}", s),
            NodeKind::Binary { op, .. } => format!("binary: {}", op.as_str()),
            NodeKind::Unary { op, .. } => format!("unary: {}", op.as_str()),
            NodeKind::DeclVar(decl) => format!("declvar: {}", decl.name),
            NodeKind::DeclFunc(decl) => format!("declfunc: {}", decl.name),
            NodeKind::Class(decl) => format!("class: {}", decl.name),
            NodeKind::Import(path) => format!("import: {}", path),
            NodeKind::Annotation(ann) => format!("annotation: {:?}", ann),
            _ => self.class_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location { line: 1, column: 1 }
    }

    #[test]
    fn test_literal_predicates() {
        let int = Node::new(loc(), NodeKind::Int(3));
        let float = Node::new(loc(), NodeKind::Float(3.0));
        assert!(int.is_literal_int() && !int.is_literal_float());
        assert!(float.is_literal_float() && !float.is_literal_int());
    }

    #[test]
    fn test_labels() {
        let node = Node::new(loc(), NodeKind::Ident("x".to_string()));
        assert_eq!(node.label(), "ident: x");
        let node = Node::new(
            loc(),
            NodeKind::Binary {
                op: TokenKind::Add,
                lhs: Box::new(Node::new(loc(), NodeKind::Int(1))),
                rhs: Box::new(Node::new(loc(), NodeKind::Int(2))),
            },
        );
        assert_eq!(node.label(), "binary: +");
    }
}
