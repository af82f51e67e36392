//! AST rendering for graphviz.
//!
//! `opal --ast <file>` parses the source and writes `ast.dot`, one graph
//! node per AST vertex with edges to its children. Render with
//! `dot -Tpng ast.dot`.

use std::fmt::Write as _;

use crate::ast::{Node, NodeKind};

struct DotWriter {
    out: String,
    next_id: usize,
}

impl DotWriter {
    fn new() -> Self {
        DotWriter { out: String::new(), next_id: 0 }
    }

    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node(&mut self, id: usize, label: &str) {
        let escaped = label.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(self.out, "    node{} [label=\"{}\"]", id, escaped);
    }

    fn edge(&mut self, from: usize, to: usize) {
        let _ = writeln!(self.out, "    node{} -> node{}", from, to);
    }

    fn eval(&mut self, node: &Node) -> usize {
        let id = self.fresh_id();
        self.node(id, &node.label());
        for child in children(node) {
            let child_id = self.eval(child);
            self.edge(id, child_id);
        }
        id
    }
}

fn children(node: &Node) -> Vec<&Node> {
    match &node.kind {
        NodeKind::Array { elements, .. } => elements.iter().collect(),
        NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
        NodeKind::Unary { expr, .. } => vec![expr],
        NodeKind::Subscript { expr, key } => vec![expr, key],
        NodeKind::Call { callee, args } => {
            let mut all: Vec<&Node> = vec![callee];
            all.extend(args.iter());
            all
        }
        NodeKind::DeclVar(decl) => decl.initializer.iter().map(|b| &**b).collect(),
        NodeKind::DeclFunc(decl) => decl.formals.iter().chain(&decl.body).collect(),
        NodeKind::If(clauses) => clauses.iter().collect(),
        NodeKind::IfClause(clause) => {
            let mut all: Vec<&Node> = clause.cond.iter().map(|b| &**b).collect();
            all.extend(&clause.body);
            all
        }
        NodeKind::While { cond, body } => {
            let mut all: Vec<&Node> = vec![cond];
            all.extend(body.iter());
            all
        }
        NodeKind::Return(expr) => expr.iter().map(|b| &**b).collect(),
        NodeKind::Class(decl) => decl.formals.iter().chain(&decl.body).collect(),
        NodeKind::Block(stmts) => stmts.iter().collect(),
        _ => vec![],
    }
}

/// Render a parsed tree as a dot digraph.
pub fn render(root: &Node) -> String {
    let mut writer = DotWriter::new();
    writer.out.push_str("digraph astgraph {\n");
    writer.out.push_str("    node [fontsize=12, fontname=\"Courier\"]\n");
    writer.eval(root);
    writer.out.push_str("}\n");
    writer.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::types::TypeContext;

    fn parse(source: &str) -> Node {
        let mut context = TypeContext::new();
        Parser::new("test", &mut context).run(source).unwrap()
    }

    #[test]
    fn test_renders_nodes_and_edges() {
        let dot = render(&parse("let x = 1 + y"));
        assert!(dot.starts_with("digraph astgraph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("declvar: x"));
        assert!(dot.contains("binary: +"));
        assert!(dot.contains("ident: y"));
        // The block points at the declaration, which points at the binary
        assert!(dot.contains("node0 -> node1"));
    }

    #[test]
    fn test_escapes_string_literals() {
        let dot = render(&parse("let s = \"say \\\"hi\\\"\""));
        assert!(!dot.contains("label=\"string: \"say"));
    }

    #[test]
    fn test_every_statement_reachable_from_root() {
        let dot = render(&parse("let a = 1\nlet b = 2\nlet c = 3"));
        assert!(dot.contains("node0 -> node1"));
        assert!(dot.contains("declvar: a"));
        assert!(dot.contains("declvar: b"));
        assert!(dot.contains("declvar: c"));
    }
}
