//! Class lowering.
//!
//! A class compiles to a constructor function: the body allocates the
//! instance, fills its fields in declaration order and returns it. Methods
//! compile like free functions with the instance as implicit first
//! argument; `@Getter`/`@Setter` annotations synthesise accessor methods
//! from the field declaration.

use super::Compiler;
use crate::ast::{Annotation, FuncDecl, Node, NodeKind, VarDecl};
use crate::lexer::TokenKind;
use crate::scope::{ScopeKind, SymbolId, SymbolKind};
use crate::types::{DataType, TypeHandle, djb2};

/// `x` becomes `getX`/`setX`.
fn accessor_name(prefix: &str, field: &str) -> String {
    let mut name = String::from(prefix);
    let mut chars = field.chars();
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

impl Compiler {
    fn add_class_field(&mut self, class_id: SymbolId, name: &str, field_id: SymbolId) {
        if let SymbolKind::Class { fields, .. } = &mut self.arena.symbol_mut(class_id).kind {
            fields.insert(name.to_string(), field_id);
        }
    }

    pub(super) fn eval_class(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Class(decl) = &node.kind else {
            return self.context.null_type();
        };

        let class_type = self
            .context
            .find_or_create(DataType::Class(djb2(&decl.name)));

        // Jump over the constructor body in the main stream
        let skip = self.emit_jmp(0);
        let entry_address = self.current_address() as i32;

        if self.arena.class_in_scope(self.scope, &decl.name).is_some() {
            self.throw(node.location, "Class already exists");
            return self.context.null_type();
        }

        let params: Vec<TypeHandle> = decl
            .formals
            .iter()
            .filter_map(|formal| match &formal.kind {
                NodeKind::DeclVar(var) => Some(var.ty.clone()),
                _ => None,
            })
            .collect();
        let symbol = self.new_symbol(
            &decl.name,
            node.location,
            SymbolKind::Class { params, fields: Default::default() },
            entry_address,
            class_type.clone(),
        );
        let class_symbol = self.arena.define_class(self.scope, symbol);

        // Instance allocation; the field count is patched once known
        let class_instr = self.emit_class(0);
        let mut field_count = 0;

        self.push_scope(ScopeKind::Class { name: decl.name.clone() });

        // Constructor parameters are ordinary negative-offset parameters,
        // only visible at depth zero
        let mut offset = -(decl.formals.len() as i32 + 3);
        for formal in &decl.formals {
            let NodeKind::DeclVar(var) = &formal.kind else { continue };
            if self.symbol_exists(formal.location, &var.name) {
                self.pop_scope();
                return self.context.null_type();
            }
            let mut param = self.new_symbol(
                &var.name,
                formal.location,
                SymbolKind::Var { mutable: var.mutable },
                offset,
                var.ty.clone(),
            );
            param.is_class_param = true;
            self.arena.define(self.scope, param);
            offset += 1;
        }

        for sub in &decl.body {
            if self.error {
                break;
            }
            match &sub.kind {
                NodeKind::Annotation(_) => {
                    self.eval(sub);
                }
                NodeKind::DeclVar(var) => {
                    self.eval_declvar(sub, false);
                    let Some(field_id) = self.arena.lookup(self.scope, &var.name) else {
                        continue;
                    };
                    // Suppressed by @Unused or rejected: the lookup then
                    // finds the constructor parameter, not a field
                    if self.arena.symbol(field_id).is_class_param {
                        continue;
                    }
                    field_count += 1;
                    self.arena.symbol_mut(field_id).owner = Some(class_symbol);
                    self.add_class_field(class_symbol, &var.name, field_id);
                    let field_address = self.arena.scope(self.scope).next_address - 1;
                    self.emit_setfield(field_address);

                    if self.arena.requests(self.scope, Annotation::Getter) {
                        self.synthesize_getter(sub, class_symbol, var);
                    }
                    if self.arena.requests(self.scope, Annotation::Setter) {
                        if !var.mutable {
                            self.throw(sub.location, "Setters are only valid for mutable variables");
                            break;
                        }
                        self.synthesize_setter(sub, class_symbol, var);
                    }
                    self.arena.clear_flags(self.scope);
                }
                NodeKind::DeclFunc(func) => {
                    self.eval_declfunc(sub, false);
                    if let Some(method_id) = self.arena.lookup(self.scope, &func.name) {
                        self.arena.symbol_mut(method_id).owner = Some(class_symbol);
                        self.add_class_field(class_symbol, &func.name, method_id);
                    }
                    self.eval_func_body(sub, func);
                }
                _ => {
                    self.throw(
                        sub.location,
                        "Statements are not allowed as a direct field of a class",
                    );
                    break;
                }
            }
        }

        self.pop_scope();

        // The instance is on top of the stack and becomes the return value
        self.emit_return();

        let end = self.current_address() as i32;
        self.patch(skip, end);
        self.patch(class_instr, field_count);
        self.context.null_type()
    }

    /// `@Getter` on a field produces `func getX() -> T { return x }`,
    /// compiled and registered like a hand-written method.
    fn synthesize_getter(&mut self, node: &Node, class_symbol: SymbolId, field: &VarDecl) {
        let field_type = self
            .arena
            .lookup(self.scope, &field.name)
            .map(|id| self.arena.symbol(id).ty.clone())
            .unwrap_or_else(|| self.context.null_type());

        let name = accessor_name("get", &field.name);
        let body = vec![Node::new(
            node.location,
            NodeKind::Return(Some(Box::new(Node::new(
                node.location,
                NodeKind::Ident(field.name.clone()),
            )))),
        )];
        let getter = FuncDecl {
            name: name.clone(),
            formals: vec![],
            body,
            rettype: field_type,
            external: 0,
        };
        let getter_node = Node::new(node.location, NodeKind::DeclFunc(getter));

        self.eval_declfunc(&getter_node, true);
        if let Some(method_id) = self.arena.lookup(self.scope, &name) {
            self.arena.symbol_mut(method_id).owner = Some(class_symbol);
            self.add_class_field(class_symbol, &name, method_id);
        }
    }

    /// `@Setter` on a mutable field produces `func setX(p0: T) { x := p0 }`.
    fn synthesize_setter(&mut self, node: &Node, class_symbol: SymbolId, field: &VarDecl) {
        let field_type = self
            .arena
            .lookup(self.scope, &field.name)
            .map(|id| self.arena.symbol(id).ty.clone())
            .unwrap_or_else(|| self.context.null_type());

        let name = accessor_name("set", &field.name);
        let param = Node::new(
            node.location,
            NodeKind::DeclVar(VarDecl {
                name: "p0".to_string(),
                mutable: false,
                initializer: None,
                ty: field_type,
            }),
        );
        let assignment = Node::new(
            node.location,
            NodeKind::Binary {
                op: TokenKind::Assign,
                lhs: Box::new(Node::new(node.location, NodeKind::Ident(field.name.clone()))),
                rhs: Box::new(Node::new(node.location, NodeKind::Ident("p0".to_string()))),
            },
        );
        let setter = FuncDecl {
            name: name.clone(),
            formals: vec![param],
            body: vec![assignment],
            rettype: self.context.void_type(),
            external: 0,
        };
        let setter_node = Node::new(node.location, NodeKind::DeclFunc(setter));

        self.eval_declfunc(&setter_node, true);
        if let Some(method_id) = self.arena.lookup(self.scope, &name) {
            self.arena.symbol_mut(method_id).owner = Some(class_symbol);
            self.add_class_field(class_symbol, &name, method_id);
        }
    }
}
