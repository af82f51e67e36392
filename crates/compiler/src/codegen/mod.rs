//! AST to bytecode lowering.
//!
//! A single pass over the tree: symbols are resolved and type-checked while
//! instructions are appended to a linear buffer. Errors accumulate through a
//! sticky flag; once it is set every visitor returns the null type without
//! emitting, so one broken declaration does not cascade into a wall of
//! follow-on diagnostics.

mod call;
mod classes;
mod emit;
mod expr;

use std::collections::HashSet;

use opal_core::bytecode::{Instruction, Opcode};
use tracing::debug;

use crate::ast::{Annotation, FuncDecl, Node, NodeKind};
use crate::builtins;
use crate::error::CompileError;
use crate::lexer::Location;
use crate::parser::Parser;
use crate::scope::{ScopeArena, ScopeId, ScopeKind, Symbol, SymbolId, SymbolKind};
use crate::types::{DataType, TypeContext, TypeHandle, datatype_match};

/// Compile a source string to an instruction buffer. Diagnostics print to
/// stdout; the returned error tells which phase failed.
pub fn compile_source(name: &str, source: &str) -> Result<Vec<Instruction>, CompileError> {
    let mut compiler = Compiler::new(name);

    let root = {
        let mut parser = Parser::new(name, &mut compiler.context);
        parser.run(source)?
    };
    debug!(source = name, "parsed");

    compiler.eval(&root);
    compiler.emit_op(Opcode::Hlt);
    debug!(instructions = compiler.buffer.len(), "lowered");

    if compiler.error {
        Err(CompileError::Semantic)
    } else {
        Ok(compiler.buffer)
    }
}

/// Compile a file to an instruction buffer.
pub fn compile_file(path: &str) -> Result<Vec<Instruction>, CompileError> {
    let source = std::fs::read_to_string(path)
        .map_err(|_| CompileError::File(format!("File '{}' does not exist", path)))?;
    compile_source(path, &source)
}

pub struct Compiler {
    name: String,
    pub buffer: Vec<Instruction>,
    pub context: TypeContext,
    pub(crate) arena: ScopeArena,
    pub(crate) scope: ScopeId,
    depth: i32,
    error: bool,
    imports: HashSet<String>,
}

impl Compiler {
    pub fn new(name: &str) -> Self {
        let arena = ScopeArena::new();
        let scope = arena.root();
        Compiler {
            name: name.to_string(),
            buffer: Vec::new(),
            context: TypeContext::new(),
            arena,
            scope,
            depth: 0,
            error: false,
            imports: HashSet::from([name.to_string()]),
        }
    }

    pub fn had_error(&self) -> bool {
        self.error
    }

    /// Report a semantic error at the node's location and set the sticky
    /// flag; compilation continues as a no-op from here on.
    pub(crate) fn throw(&mut self, location: Location, msg: &str) {
        self.error = true;
        println!(
            "{}:{}:{} (Semantic): {}",
            self.name, location.line, location.column, msg
        );
    }

    fn null_type(&self) -> TypeHandle {
        self.context.null_type()
    }

    // =========================================================================
    // Scope plumbing
    // =========================================================================

    fn push_scope(&mut self, kind: ScopeKind) {
        self.scope = self.arena.push(self.scope, kind);
        self.depth += 1;
    }

    fn pop_scope(&mut self) {
        self.scope = self.arena.scope(self.scope).parent.expect("scope underflow");
        self.depth -= 1;
    }

    fn push_scope_virtual(&mut self) {
        self.scope = self.arena.push_virtual(self.scope, ScopeKind::Block);
    }

    fn pop_scope_virtual(&mut self) {
        self.scope = self.arena.scope(self.scope).parent.expect("scope underflow");
    }

    pub(crate) fn new_symbol(
        &self,
        name: &str,
        location: Location,
        kind: SymbolKind,
        address: i32,
        ty: TypeHandle,
    ) -> Symbol {
        Symbol {
            name: name.to_string(),
            location,
            kind,
            address,
            ty,
            global: self.depth == 0,
            is_class_param: false,
            owner: None,
            array_size: -1,
        }
    }

    /// True (and reported) when the identifier is already visible from the
    /// current scope.
    pub(crate) fn symbol_exists(&mut self, location: Location, name: &str) -> bool {
        if let Some(existing) = self.arena.lookup(self.scope, name) {
            let previous = self.arena.symbol(existing).location;
            self.throw(
                location,
                &format!(
                    "Redefinition of symbol '{}'.\nPrevious definition: [line {} column {}]",
                    name, previous.line, previous.column
                ),
            );
            return true;
        }
        false
    }

    /// Emit the store matching a symbol's storage: plain store for locals
    /// and globals, upvalue store across closure boundaries.
    pub(crate) fn symbol_replace(&mut self, symbol_id: SymbolId) {
        let (address, global, name) = {
            let symbol = self.arena.symbol(symbol_id);
            (symbol.address, symbol.global, symbol.name.clone())
        };
        let depth = self
            .arena
            .lookup_with_depth(self.scope, &name)
            .map_or(0, |(_, depth)| depth);

        if depth == 0 || global {
            self.emit_store(address, global);
        } else {
            self.emit_store_upval(depth as i32, address);
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub(crate) fn eval(&mut self, node: &Node) -> TypeHandle {
        if self.error {
            return self.null_type();
        }

        match &node.kind {
            NodeKind::Block(stmts) => self.eval_block(stmts),
            NodeKind::DeclVar(_) => self.eval_declvar(node, true),
            NodeKind::DeclFunc(_) => self.eval_declfunc(node, true),
            NodeKind::Return(expr) => self.eval_return(node, expr.as_deref()),
            NodeKind::Int(_) | NodeKind::Float(_) => self.eval_number(node),
            NodeKind::Bool(value) => self.eval_bool(*value),
            NodeKind::Str(text) => self.eval_string(node, text),
            NodeKind::Char(c) => self.eval_char(*c),
            NodeKind::Array { .. } => self.eval_array(node),
            NodeKind::Binary { .. } => self.eval_binary(node),
            NodeKind::Ident(name) => self.eval_ident(node, name),
            NodeKind::Call { .. } => self.eval_call(node),
            NodeKind::If(clauses) => self.eval_if(clauses),
            NodeKind::While { cond, body } => self.eval_while(cond, body),
            NodeKind::Unary { .. } => self.eval_unary(node),
            NodeKind::Subscript { .. } => self.eval_subscript(node),
            NodeKind::Class(_) => self.eval_class(node),
            NodeKind::Import(path) => self.eval_import(node, path),
            NodeKind::Annotation(annotation) => self.eval_annotation(node, *annotation),
            NodeKind::NoneLit(ty) => self.eval_none(ty),
            NodeKind::IfClause(_) => self.null_type(),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Lower a statement list. Space for the block's locals is reserved up
    /// front and released on exit, unless a return already unwound the
    /// frame. The block's type is the type of its last statement.
    fn eval_block(&mut self, stmts: &[Node]) -> TypeHandle {
        let space = stmts
            .iter()
            .filter(|stmt| matches!(stmt.kind, NodeKind::DeclVar(_)))
            .count() as i32;
        if space > 0 {
            self.emit_reserve(space);
        }

        let mut ret = self.null_type();
        for stmt in stmts {
            ret = self.eval(stmt);
        }

        if space > 0 && !matches!(self.last_op(), Some(Opcode::Ret | Opcode::Retvirtual)) {
            self.emit_reserve(-space);
        }
        ret
    }

    /// Lower a variable declaration: infer the type from the initializer,
    /// register the symbol at the next free slot, emit the store.
    pub(crate) fn eval_declvar(&mut self, node: &Node, emit: bool) -> TypeHandle {
        let NodeKind::DeclVar(decl) = &node.kind else {
            return self.null_type();
        };

        // A pending @Unused suppresses the declaration entirely
        if self.arena.requests(self.scope, Annotation::Unused) {
            self.arena.clear_flags(self.scope);
            return self.null_type();
        }

        // A class field may take over its constructor parameter's name
        // (`let x = x`); any other visible binding is a redefinition
        if let Some(existing) = self.arena.lookup(self.scope, &decl.name)
            && !self.arena.symbol(existing).is_class_param
        {
            let previous = self.arena.symbol(existing).location;
            self.throw(
                node.location,
                &format!(
                    "Redefinition of symbol '{}'.\nPrevious definition: [line {} column {}]",
                    decl.name, previous.line, previous.column
                ),
            );
            return self.null_type();
        }

        let Some(initializer) = &decl.initializer else {
            self.throw(node.location, "Invalid or missing variable initializer");
            return self.null_type();
        };
        let vartype = self.eval(initializer);

        match &*vartype {
            DataType::Void => {
                self.throw(node.location, "Variable initializer is of type VOID");
                return self.null_type();
            }
            DataType::Null => {
                self.throw(node.location, "Variable initializer is NULL");
                return self.null_type();
            }
            _ => {}
        }

        // A class field must not embed its own class
        if let ScopeKind::Class { name } = self.arena.scope(self.scope).kind.clone()
            && let Some(class_id) = self.arena.lookup(self.scope, &name)
        {
            let class_type_id = self.arena.symbol(class_id).ty.id();
            if vartype.id() == class_type_id {
                self.throw(node.location, "Circular reference");
                return self.null_type();
            }
        }

        let address = {
            let scope = self.arena.scope_mut(self.scope);
            let address = scope.next_address;
            scope.next_address += 1;
            address
        };
        let mut symbol = self.new_symbol(
            &decl.name,
            node.location,
            SymbolKind::Var { mutable: decl.mutable },
            address,
            vartype.clone(),
        );

        // Statically known length of a literal array, for the compile-time
        // bounds check on subscripts
        if vartype.is_array()
            && let Some(last) = self.buffer.last()
            && matches!(last.op, Opcode::Arr | Opcode::Str)
        {
            symbol.array_size = last.v1.as_ref().map_or(-1, |v| v.as_int());
        }

        let global = symbol.global;
        self.arena.define(self.scope, symbol);

        if emit {
            self.emit_store(address, global);
        }
        self.null_type()
    }

    /// Register a function symbol; external functions get no body, ordinary
    /// ones get theirs compiled behind a skip jump.
    pub(crate) fn eval_declfunc(&mut self, node: &Node, compile_body: bool) -> TypeHandle {
        let NodeKind::DeclFunc(decl) = &node.kind else {
            return self.null_type();
        };

        if self.symbol_exists(node.location, &decl.name) {
            return self.null_type();
        }

        let params: Vec<TypeHandle> = decl
            .formals
            .iter()
            .filter_map(|formal| match &formal.kind {
                NodeKind::DeclVar(var) => Some(var.ty.clone()),
                _ => None,
            })
            .collect();

        if decl.external > 0 {
            let symbol = self.new_symbol(
                &decl.name,
                node.location,
                SymbolKind::Func {
                    params,
                    rettype: decl.rettype.clone(),
                    external: decl.external,
                },
                -1,
                self.null_type(),
            );
            self.arena.define(self.scope, symbol);
            return self.null_type();
        }

        // Entry address is one past the skip jump emitted by the body
        let address = self.current_address() as i32 + 1;
        let symbol = self.new_symbol(
            &decl.name,
            node.location,
            SymbolKind::Func {
                params,
                rettype: decl.rettype.clone(),
                external: 0,
            },
            address,
            self.null_type(),
        );
        self.arena.define(self.scope, symbol);

        if compile_body {
            self.eval_func_body(node, decl);
        }
        self.null_type()
    }

    /// Compile a function body: skip jump, parameter symbols at negative
    /// offsets, return analysis, implicit void return, jump patch.
    pub(crate) fn eval_func_body(&mut self, node: &Node, decl: &FuncDecl) {
        let jmp = self.emit_jmp(0);

        self.push_scope(ScopeKind::Function { rettype: decl.rettype.clone() });
        let mut offset = -(decl.formals.len() as i32 + 3);
        for formal in &decl.formals {
            let NodeKind::DeclVar(var) = &formal.kind else { continue };
            if self.symbol_exists(formal.location, &var.name) {
                self.pop_scope();
                return;
            }
            let symbol = self.new_symbol(
                &var.name,
                formal.location,
                SymbolKind::Var { mutable: var.mutable },
                offset,
                var.ty.clone(),
            );
            self.arena.define(self.scope, symbol);
            offset += 1;
        }

        // Return statements may only close the body, and must agree with
        // the declared return type on whether they carry a value
        let mut has_return = false;
        for (index, sub) in decl.body.iter().enumerate() {
            let NodeKind::Return(value) = &sub.kind else { continue };
            if index + 1 != decl.body.len() {
                self.throw(node.location, "Return statement declared before end was reached");
                break;
            }
            has_return = true;
            if value.is_some() && *decl.rettype == DataType::Void {
                self.throw(node.location, "Functions with type void do not return a value");
                break;
            }
            if value.is_none() && *decl.rettype != DataType::Void {
                self.throw(node.location, "Return statement without a value");
                break;
            }
        }

        self.eval_block(&decl.body);
        self.pop_scope();

        if *decl.rettype == DataType::Void {
            // Callees always leave one value; void functions return zero
            self.emit_int(0);
            if self.arena.enclosing_class(self.scope).is_some() {
                self.emit_op(Opcode::Retvirtual);
            } else {
                self.emit_return();
            }
        } else if !has_return {
            self.throw(node.location, "Function without return statement");
        }

        let end = self.current_address() as i32;
        self.patch(jmp, end);
    }

    fn eval_return(&mut self, node: &Node, expr: Option<&Node>) -> TypeHandle {
        let value_type = match expr {
            Some(expr) => self.eval(expr),
            None => self.context.void_type(),
        };

        let Some((_, rettype)) = self.arena.enclosing_function(self.scope) else {
            self.throw(node.location, "Return statement is not within a function");
            return self.null_type();
        };

        if !datatype_match(&rettype, &value_type) {
            self.throw(node.location, "Return value doesn't match the return type");
            return self.null_type();
        }

        if self.arena.enclosing_class(self.scope).is_some() {
            self.emit_op(Opcode::Retvirtual);
        } else {
            self.emit_return();
        }
        self.null_type()
    }

    /// Lower an if-chain: each conditional clause jumps over its body when
    /// false; bodies of earlier clauses jump to the end.
    fn eval_if(&mut self, clauses: &[Node]) -> TypeHandle {
        let mut end_jumps = Vec::new();

        for clause_node in clauses {
            let NodeKind::IfClause(clause) = &clause_node.kind else { continue };

            let skip = match &clause.cond {
                Some(cond) => {
                    let cond_type = self.eval(cond);
                    if *cond_type != DataType::Bool {
                        self.throw(clause_node.location, "Conditions must be of type boolean");
                        return self.null_type();
                    }
                    Some(self.emit_jmpf(0))
                }
                None => None,
            };

            self.push_scope_virtual();
            self.eval_block(&clause.body);
            self.pop_scope_virtual();

            if clauses.len() > 1 && clause.cond.is_some() {
                end_jumps.push(self.emit_jmp(0));
            }
            if let Some(skip) = skip {
                let next = self.current_address() as i32;
                self.patch(skip, next);
            }
        }

        let end = self.current_address() as i32;
        for jump in end_jumps {
            self.patch(jump, end);
        }
        self.null_type()
    }

    fn eval_while(&mut self, cond: &Node, body: &[Node]) -> TypeHandle {
        let head = self.current_address() as i32;
        let cond_type = self.eval(cond);
        if *cond_type != DataType::Bool {
            self.throw(cond.location, "Conditions must be of type boolean");
            return self.null_type();
        }
        let exit = self.emit_jmpf(0);

        self.push_scope_virtual();
        self.eval_block(body);
        self.pop_scope_virtual();

        self.emit_jmp(head);
        let end = self.current_address() as i32;
        self.patch(exit, end);
        self.null_type()
    }

    /// Lower an import: the named intrinsic libraries register their
    /// signatures, any other path is compiled as a source file. Imports are
    /// deduplicated by path.
    fn eval_import(&mut self, node: &Node, path: &str) -> TypeHandle {
        if self.imports.contains(path) {
            return self.null_type();
        }
        self.imports.insert(path.to_string());

        let nodes = match path {
            "core" => Some(builtins::core_signatures(&mut self.context)),
            "math" => Some(builtins::math_signatures(&mut self.context)),
            "io" => Some(builtins::io_signatures(&mut self.context)),
            _ => None,
        };

        if let Some(nodes) = nodes {
            let block = Node::new(node.location, NodeKind::Block(nodes));
            self.eval(&block);
            return self.null_type();
        }

        // Fall back on a source file
        let Ok(source) = std::fs::read_to_string(path) else {
            self.throw(node.location, &format!("Could not read file named '{}'", path));
            return self.null_type();
        };

        let root = {
            let mut parser = Parser::new(path, &mut self.context);
            parser.run(&source)
        };
        match root {
            Ok(root) => {
                self.eval(&root);
            }
            Err(_) => {
                self.throw(node.location, &format!("Could not compile file '{}'", path));
            }
        }
        self.null_type()
    }

    fn eval_annotation(&mut self, node: &Node, annotation: Annotation) -> TypeHandle {
        if self.arena.requests(self.scope, annotation) {
            self.throw(node.location, "Annotation flag is already set");
            return self.null_type();
        }

        if annotation != Annotation::Unused
            && !matches!(self.arena.scope(self.scope).kind, ScopeKind::Class { .. })
        {
            self.throw(node.location, "Annotations can only be used within classes");
            return self.null_type();
        }

        self.arena.set_flag(self.scope, annotation);
        self.null_type()
    }

    /// `None<T>` is the integer zero; `Some` wraps non-zero payloads, so no
    /// dedicated representation is needed.
    fn eval_none(&mut self, ty: &TypeHandle) -> TypeHandle {
        self.emit_int(0);
        self.context.find_or_create(DataType::Option(ty.clone()))
    }
}
