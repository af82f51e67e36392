//! Host intrinsic signatures.
//!
//! `using core|math|io` registers external function declarations whose
//! bodies live in the runtime's syscall table. Indices are 1-based and
//! assigned in registration order; the compiler emits `SYSCALL index-1`.
//! The io library also ships a small `File` class built directly as AST.

use crate::ast::{Annotation, ClassDecl, FuncDecl, Node, NodeKind, VarDecl};
use crate::lexer::Location;
use crate::types::{TypeContext, TypeHandle};

/// Number of `core` intrinsics; `math` indices start after these.
pub const CORELIB_FN_COUNT: i32 = 7;
/// Number of `math` intrinsics; `io` indices start after core + math.
pub const MATHLIB_FN_COUNT: i32 = 19;

fn loc() -> Location {
    Location::default()
}

fn formal(name: &str, ty: TypeHandle) -> Node {
    Node::new(
        loc(),
        NodeKind::DeclVar(VarDecl { name: name.to_string(), mutable: false, initializer: None, ty }),
    )
}

fn external(name: &str, params: &[TypeHandle], rettype: TypeHandle, index: i32) -> Node {
    let formals = params
        .iter()
        .enumerate()
        .map(|(i, ty)| formal(&format!("arg{}", i), ty.clone()))
        .collect();
    Node::new(
        loc(),
        NodeKind::DeclFunc(FuncDecl {
            name: name.to_string(),
            formals,
            body: vec![],
            rettype,
            external: index,
        }),
    )
}

fn ident(name: &str) -> Node {
    Node::new(loc(), NodeKind::Ident(name.to_string()))
}

fn call(callee: &str, args: Vec<Node>) -> Node {
    Node::new(
        loc(),
        NodeKind::Call { callee: Box::new(ident(callee)), args },
    )
}

/// `using core`: console and process primitives.
pub fn core_signatures(context: &mut TypeContext) -> Vec<Node> {
    let void = context.void_type();
    let float = context.float_type();
    let int = context.int_type();
    let generic = context.generic_type();
    let string = context.str_type();

    vec![
        external("print", &[generic.clone()], void.clone(), 1),
        external("println", &[generic], void.clone(), 2),
        external("getline", &[], string.clone(), 3),
        external("parseFloat", &[string.clone()], float.clone(), 4),
        external("break", &[], void, 5),
        external("clock", &[], float, 6),
        external("sysarg", &[int], string, 7),
    ]
}

/// `using math`: float functions over the host's libm.
pub fn math_signatures(context: &mut TypeContext) -> Vec<Node> {
    let float = context.float_type();
    let index = |i: i32| CORELIB_FN_COUNT + i;

    let unary = [
        "sin", "cos", "tan", "asin", "acos", "atan",
    ];
    let mut nodes: Vec<Node> = unary
        .iter()
        .enumerate()
        .map(|(i, name)| external(name, &[float.clone()], float.clone(), index(i as i32 + 1)))
        .collect();

    nodes.push(external("atan2", &[float.clone(), float.clone()], float.clone(), index(7)));

    let unary_tail = [
        "sinh", "cosh", "tanh", "exp", "ln", "log",
    ];
    for (i, name) in unary_tail.iter().enumerate() {
        nodes.push(external(name, &[float.clone()], float.clone(), index(i as i32 + 8)));
    }

    nodes.push(external("pow", &[float.clone(), float.clone()], float.clone(), index(14)));
    for (i, name) in ["sqrt", "ceil", "floor", "abs"].iter().enumerate() {
        nodes.push(external(name, &[float.clone()], float.clone(), index(i as i32 + 15)));
    }
    nodes.push(external("prng", &[], float, index(19)));

    nodes
}

/// `using io`: file primitives plus the `File` convenience class.
pub fn io_signatures(context: &mut TypeContext) -> Vec<Node> {
    let void = context.void_type();
    let string = context.str_type();
    let null = context.null_type();
    let index = |i: i32| CORELIB_FN_COUNT + MATHLIB_FN_COUNT + i;

    let read_file = external("readFile", &[string.clone()], string.clone(), index(1));
    let write_file = external(
        "writeFile",
        &[string.clone(), string.clone(), string.clone()],
        void.clone(),
        index(2),
    );

    // type File(name: str) {
    //     @Getter
    //     let filename = name
    //     func read() -> str { return readFile(filename) }
    //     func write(str: str) { writeFile(filename, str, "wb") }
    // }
    let filename_field = Node::new(
        loc(),
        NodeKind::DeclVar(VarDecl {
            name: "filename".to_string(),
            mutable: false,
            initializer: Some(Box::new(ident("name"))),
            ty: null,
        }),
    );

    let read_method = Node::new(
        loc(),
        NodeKind::DeclFunc(FuncDecl {
            name: "read".to_string(),
            formals: vec![],
            body: vec![Node::new(
                loc(),
                NodeKind::Return(Some(Box::new(call("readFile", vec![ident("filename")])))),
            )],
            rettype: string.clone(),
            external: 0,
        }),
    );

    let write_method = Node::new(
        loc(),
        NodeKind::DeclFunc(FuncDecl {
            name: "write".to_string(),
            formals: vec![formal("str", string.clone())],
            body: vec![call(
                "writeFile",
                vec![
                    ident("filename"),
                    ident("str"),
                    Node::new(loc(), NodeKind::Str("wb".to_string())),
                ],
            )],
            rettype: void,
            external: 0,
        }),
    );

    let file_class = Node::new(
        loc(),
        NodeKind::Class(ClassDecl {
            name: "File".to_string(),
            formals: vec![formal("name", string)],
            body: vec![
                Node::new(loc(), NodeKind::Annotation(Annotation::Getter)),
                filename_field,
                read_method,
                write_method,
            ],
        }),
    );

    vec![read_file, write_file, file_class]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_core_indices_are_one_based_and_ordered() {
        let mut ctx = TypeContext::new();
        let nodes = core_signatures(&mut ctx);
        assert_eq!(nodes.len(), 7);
        for (i, node) in nodes.iter().enumerate() {
            let NodeKind::DeclFunc(decl) = &node.kind else { panic!("expected declfunc") };
            assert_eq!(decl.external, i as i32 + 1);
            assert!(decl.body.is_empty());
        }
    }

    #[test]
    fn test_math_indices_follow_core() {
        let mut ctx = TypeContext::new();
        let nodes = math_signatures(&mut ctx);
        assert_eq!(nodes.len(), MATHLIB_FN_COUNT as usize);
        let NodeKind::DeclFunc(first) = &nodes[0].kind else { panic!() };
        assert_eq!(first.name, "sin");
        assert_eq!(first.external, CORELIB_FN_COUNT + 1);
        let NodeKind::DeclFunc(last) = &nodes.last().unwrap().kind else { panic!() };
        assert_eq!(last.name, "prng");
        assert_eq!(last.external, CORELIB_FN_COUNT + MATHLIB_FN_COUNT);
    }

    #[test]
    fn test_binary_math_functions_take_two_params() {
        let mut ctx = TypeContext::new();
        for node in math_signatures(&mut ctx) {
            let NodeKind::DeclFunc(decl) = &node.kind else { panic!() };
            let expected = match decl.name.as_str() {
                "atan2" | "pow" => 2,
                "prng" => 0,
                _ => 1,
            };
            assert_eq!(decl.formals.len(), expected, "{}", decl.name);
        }
    }

    #[test]
    fn test_io_ships_file_class() {
        let mut ctx = TypeContext::new();
        let nodes = io_signatures(&mut ctx);
        assert_eq!(nodes.len(), 3);
        let NodeKind::Class(class) = &nodes[2].kind else { panic!("expected class") };
        assert_eq!(class.name, "File");
        assert_eq!(class.formals.len(), 1);
        // Annotation + field + two methods
        assert_eq!(class.body.len(), 4);
        assert!(matches!(class.body[0].kind, NodeKind::Annotation(Annotation::Getter)));
    }

    #[test]
    fn test_print_takes_generic() {
        let mut ctx = TypeContext::new();
        let nodes = core_signatures(&mut ctx);
        let NodeKind::DeclFunc(print) = &nodes[0].kind else { panic!() };
        let NodeKind::DeclVar(param) = &print.formals[0].kind else { panic!() };
        assert_eq!(*param.ty, DataType::Generic);
    }
}
