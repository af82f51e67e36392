//! Expression lowering.
//!
//! Every expression visitor emits the instructions that leave exactly one
//! value on the stack and returns the expression's datatype.

use opal_core::bytecode::Opcode;

use super::Compiler;
use crate::ast::{Node, NodeKind};
use crate::lexer::TokenKind;
use crate::scope::ScopeKind;
use crate::types::{DataType, TypeHandle, datatype_match};

impl Compiler {
    pub(super) fn eval_number(&mut self, node: &Node) -> TypeHandle {
        match node.kind {
            NodeKind::Float(value) => {
                self.emit_float(value);
                self.context.float_type()
            }
            NodeKind::Int(value) => {
                self.emit_int(value);
                self.context.int_type()
            }
            _ => self.context.null_type(),
        }
    }

    pub(super) fn eval_bool(&mut self, value: bool) -> TypeHandle {
        self.emit_bool(value);
        self.context.bool_type()
    }

    pub(super) fn eval_char(&mut self, value: char) -> TypeHandle {
        self.emit_char(value);
        self.context.char_type()
    }

    /// Strings containing `$` are interpolated: literal pieces and
    /// identifier loads are pushed separately and appended pairwise.
    pub(super) fn eval_string(&mut self, node: &Node, text: &str) -> TypeHandle {
        if text.contains('$') {
            self.interpolate_string(node, text);
        } else {
            self.emit_string(text);
        }
        self.context.str_type()
    }

    fn interpolate_string(&mut self, node: &Node, text: &str) {
        let mut on_stack = false;
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }

            if !literal.is_empty() {
                self.emit_string(&literal);
                if on_stack {
                    self.emit_op(Opcode::Append);
                }
                on_stack = true;
                literal.clear();
            }

            let mut ident = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    ident.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            self.append_interpolated(node, &ident, on_stack);
            on_stack = true;
        }

        if !literal.is_empty() {
            self.emit_string(&literal);
            if on_stack {
                self.emit_op(Opcode::Append);
            }
        }
    }

    /// Load one `$ident` splice and append it to the string under
    /// construction, stringifying non-string values first.
    fn append_interpolated(&mut self, node: &Node, ident: &str, on_stack: bool) {
        let starts_like_ident = ident
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_');
        if !starts_like_ident {
            self.throw(node.location, &format!("Expected an identifier at '${}'", ident));
            return;
        }

        if self.arena.lookup(self.scope, ident).is_none() {
            self.throw(node.location, &format!("Symbol '{}' does not exist", ident));
            return;
        }

        let ident_node = Node::new(node.location, NodeKind::Ident(ident.to_string()));
        let ty = self.eval_ident(&ident_node, ident);
        if !datatype_match(&ty, &self.context.str_type()) {
            self.emit_op(Opcode::Tostr);
        }
        if on_stack {
            self.emit_op(Opcode::Append);
        }
    }

    /// Array literals compile every element, require one uniform element
    /// type and merge either into a string (char elements) or an array.
    pub(super) fn eval_array(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Array { elements, ty } = &node.kind else {
            return self.context.null_type();
        };

        let mut element_type = ty.clone();
        let mut iter = elements.iter();
        if let Some(first) = iter.next() {
            element_type = self.eval(first);
        }

        if matches!(*element_type, DataType::Void | DataType::Null) {
            self.throw(node.location, "Invalid: Array is composed of NULL elements");
            return self.context.null_type();
        }

        // First element sets the type; position is reported 1-based
        let mut index = 2;
        for element in iter {
            let ty = self.eval(element);
            if !datatype_match(&ty, &element_type) {
                self.throw(
                    node.location,
                    &format!("An array can only hold one type of elements (@element {})", index),
                );
                return self.context.null_type();
            }
            index += 1;
        }

        if *element_type == DataType::Char {
            // A char array is a merged string literal
            self.emit_string_merge(elements.len() as i32);
            return self.context.str_type();
        }

        self.emit_array_merge(elements.len() as i32);
        self.context.find_or_create(DataType::Array(element_type))
    }

    /// Resolve an identifier use and emit its load: class fields read
    /// through the receiver, locals and globals load directly, everything
    /// else goes through the closure chain.
    pub(super) fn eval_ident(&mut self, node: &Node, name: &str) -> TypeHandle {
        let Some((symbol_id, depth)) = self.arena.lookup_with_depth(self.scope, name) else {
            self.throw(
                node.location,
                &format!("Implicit declaration of field '{}'", name),
            );
            return self.context.null_type();
        };

        let symbol = self.arena.symbol(symbol_id).clone();
        if symbol.is_var() {
            if symbol.owner.is_some() {
                if matches!(self.arena.scope(self.scope).kind, ScopeKind::Class { .. }) {
                    self.throw(
                        node.location,
                        "Accessing class fields within the constructor is not permitted",
                    );
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Ldarg0);
                self.emit_getfield(symbol.address);
                return symbol.ty;
            }

            // Constructor parameters are only visible inside their class body
            if symbol.is_class_param && depth != 0 {
                self.throw(node.location, "Trying to access a constructor parameter");
                return self.context.null_type();
            }

            if depth == 0 || symbol.global {
                self.emit_load(symbol.address, symbol.global);
            } else {
                self.emit_load_upval(depth as i32, symbol.address);
            }
        }
        symbol.ty
    }

    /// Binary expressions: literal pairs fold at compile time, `:=` lowers
    /// to the matching store, everything else becomes a typed opcode.
    pub(super) fn eval_binary(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Binary { op, lhs, rhs } = &node.kind else {
            return self.context.null_type();
        };

        if let Some(folded) = self.fold_constants(node, *op, lhs, rhs) {
            return self.eval(&folded);
        }
        if self.error {
            return self.context.null_type();
        }

        if matches!(op, TokenKind::Assign | TokenKind::Equal) {
            return self.eval_assignment(node, lhs, rhs);
        }

        let lhs_type = self.eval(lhs);
        let rhs_type = self.eval(rhs);

        // Concatenation and element append share `+` on arrays and strings
        if *op == TokenKind::Add && lhs_type.is_array() {
            if datatype_match(&lhs_type, &rhs_type) {
                self.emit_op(Opcode::Append);
                return lhs_type;
            }
            if lhs_type.subtype().is_some_and(|e| datatype_match(e, &rhs_type)) {
                self.emit_op(Opcode::Cons);
                return lhs_type;
            }
        }

        if !datatype_match(&lhs_type, &rhs_type) {
            self.throw(
                node.location,
                &format!(
                    "Cannot perform operation '{}' on the types '{}' and '{}'",
                    op.as_str(),
                    lhs_type,
                    rhs_type
                ),
            );
            return self.context.null_type();
        }

        match Self::tok2op(*op, &lhs_type) {
            Some(opcode) => {
                self.emit_op(opcode);
            }
            None => {
                self.throw(
                    node.location,
                    &format!(
                        "Cannot perform operation '{}' on the types '{}' and '{}'",
                        op.as_str(),
                        lhs_type,
                        rhs_type
                    ),
                );
                return self.context.null_type();
            }
        }

        match op {
            TokenKind::EqualEqual
            | TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::Greater
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual
            | TokenKind::AndAnd
            | TokenKind::OrOr => self.context.bool_type(),
            _ => lhs_type,
        }
    }

    /// Fold a binary over two literals of the same kind into one literal
    /// node. Integer arithmetic wraps two's-complement; a literal zero
    /// divisor is left unfolded so the division traps at runtime.
    fn fold_constants(
        &mut self,
        node: &Node,
        op: TokenKind,
        lhs: &Node,
        rhs: &Node,
    ) -> Option<Node> {
        if let (NodeKind::Int(a), NodeKind::Int(b)) = (&lhs.kind, &rhs.kind) {
            let (a, b) = (*a, *b);
            let int = |v: i64| Some(Node::new(node.location, NodeKind::Int(v)));
            let boolean = |v: bool| Some(Node::new(node.location, NodeKind::Bool(v)));
            return match op {
                TokenKind::Add => int(a.wrapping_add(b)),
                TokenKind::Sub => int(a.wrapping_sub(b)),
                TokenKind::Mul => int(a.wrapping_mul(b)),
                TokenKind::Div if b != 0 => int(a.wrapping_div(b)),
                TokenKind::Mod if b != 0 => int(a.wrapping_rem(b)),
                TokenKind::Div | TokenKind::Mod => None,
                TokenKind::ShiftLeft => int(a.wrapping_shl(b as u32)),
                TokenKind::ShiftRight => int(a.wrapping_shr(b as u32)),
                TokenKind::BitAnd => int(a & b),
                TokenKind::BitOr => int(a | b),
                TokenKind::BitXor => int(a ^ b),
                TokenKind::EqualEqual => boolean(a == b),
                TokenKind::NotEqual => boolean(a != b),
                TokenKind::LessEqual => boolean(a <= b),
                TokenKind::GreaterEqual => boolean(a >= b),
                TokenKind::Less => boolean(a < b),
                TokenKind::Greater => boolean(a > b),
                _ => {
                    self.throw(
                        node.location,
                        "Invalid operator. Operator might not be available for integers",
                    );
                    None
                }
            };
        }

        if let (NodeKind::Float(a), NodeKind::Float(b)) = (&lhs.kind, &rhs.kind) {
            let (a, b) = (*a, *b);
            let float = |v: f64| Some(Node::new(node.location, NodeKind::Float(v)));
            let boolean = |v: bool| Some(Node::new(node.location, NodeKind::Bool(v)));
            return match op {
                TokenKind::Add => float(a + b),
                TokenKind::Sub => float(a - b),
                TokenKind::Mul => float(a * b),
                TokenKind::Div => float(a / b),
                TokenKind::EqualEqual => boolean(a == b),
                TokenKind::NotEqual => boolean(a != b),
                TokenKind::LessEqual => boolean(a <= b),
                TokenKind::GreaterEqual => boolean(a >= b),
                TokenKind::Less => boolean(a < b),
                TokenKind::Greater => boolean(a > b),
                _ => {
                    self.throw(
                        node.location,
                        "Invalid operator. Operator might not be available for floats",
                    );
                    None
                }
            };
        }

        None
    }

    /// Assignment targets are identifiers or identifier subscripts; class
    /// fields rebind the receiver, plain variables store by depth.
    fn eval_assignment(&mut self, node: &Node, lhs: &Node, rhs: &Node) -> TypeHandle {
        match &lhs.kind {
            NodeKind::Ident(name) => {
                let Some(symbol_id) = self.arena.lookup(self.scope, name) else {
                    self.throw(
                        node.location,
                        &format!("Implicit declaration of field '{}'", name),
                    );
                    return self.context.null_type();
                };
                let symbol = self.arena.symbol(symbol_id).clone();

                if !symbol.is_var() {
                    self.throw(node.location, "Left hand side value must be a variable");
                    return self.context.null_type();
                }
                if !symbol.is_mutable() {
                    self.throw(
                        node.location,
                        "Invalid statement, trying to modify an immutable variable",
                    );
                    return self.context.null_type();
                }

                if symbol.owner.is_some() {
                    // ldarg0; <rhs>; setfield; setarg0
                    self.emit_op(Opcode::Ldarg0);
                }

                let rhs_type = self.eval(rhs);
                if !datatype_match(&rhs_type, &symbol.ty) {
                    self.throw(node.location, "Change of types is not permitted");
                    return self.context.null_type();
                }

                if symbol.owner.is_some() {
                    self.emit_setfield(symbol.address);
                    self.emit_op(Opcode::Setarg0);
                    return self.context.null_type();
                }

                self.symbol_replace(symbol_id);
                self.context.null_type()
            }
            NodeKind::Subscript { expr, key } => self.eval_subscript_assignment(node, expr, key, rhs),
            _ => {
                self.throw(node.location, "Unknown assignment operation");
                self.context.null_type()
            }
        }
    }

    /// `target[key] := value` — the element is replaced in place and the
    /// updated object stored back into the variable (or field).
    fn eval_subscript_assignment(
        &mut self,
        node: &Node,
        expr: &Node,
        key: &Node,
        rhs: &Node,
    ) -> TypeHandle {
        let NodeKind::Ident(name) = &expr.kind else {
            self.throw(node.location, "Identifier for index access expected");
            return self.context.null_type();
        };

        let Some(symbol_id) = self.arena.lookup(self.scope, name) else {
            self.throw(
                node.location,
                &format!("Implicit declaration of field '{}'", name),
            );
            return self.context.null_type();
        };
        let symbol = self.arena.symbol(symbol_id).clone();

        if !symbol.is_var() {
            self.throw(node.location, "Subscripts are only allowed for variables");
            return self.context.null_type();
        }
        if !symbol.is_mutable() {
            self.throw(node.location, &format!("The field '{}' is immutable", name));
            return self.context.null_type();
        }

        if symbol.owner.is_some() {
            self.emit_op(Opcode::Ldarg0);
        }

        let rhs_type = self.eval(rhs);
        let lhs_type = self.eval(expr);
        let Some(element_type) = lhs_type.subtype().cloned() else {
            self.throw(node.location, "Invalid subscript operation");
            return self.context.null_type();
        };
        if !datatype_match(&element_type, &rhs_type) {
            self.throw(node.location, "Assignment value has the wrong type");
            return self.context.null_type();
        }

        self.eval(key);
        self.emit_op(Opcode::Setsub);

        if symbol.owner.is_some() {
            self.emit_setfield(symbol.address);
            self.emit_op(Opcode::Setarg0);
        } else {
            self.symbol_replace(symbol_id);
        }
        self.context.null_type()
    }

    pub(super) fn eval_unary(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Unary { op, expr } = &node.kind else {
            return self.context.null_type();
        };

        let ty = self.eval(expr);
        if *op == TokenKind::Add {
            // Unary plus is the identity
            return ty;
        }

        match &*ty {
            DataType::Int => {
                if *op == TokenKind::Not {
                    self.throw(
                        node.location,
                        "Logical negation can only be used with objects of type boolean",
                    );
                } else {
                    let opcode = if *op == TokenKind::Sub { Opcode::Iminus } else { Opcode::Bitnot };
                    self.emit_op(opcode);
                }
            }
            DataType::Float => {
                if *op == TokenKind::BitNot || *op == TokenKind::Not {
                    self.throw(
                        node.location,
                        "Bit operations / logical negation can only be used with objects of type int",
                    );
                } else {
                    self.emit_op(Opcode::Fminus);
                }
            }
            DataType::Bool => {
                if *op != TokenKind::Not {
                    self.throw(
                        node.location,
                        "Arithmetic operations cannot be applied on objects of type boolean",
                    );
                } else {
                    self.emit_op(Opcode::Not);
                }
            }
            _ => {
                self.throw(
                    node.location,
                    "Invalid unary instruction, only applicable to numbers or booleans",
                );
            }
        }
        ty
    }

    /// Array subscripts check the key type and, where the array length is
    /// statically known, the bounds.
    pub(super) fn eval_subscript(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Subscript { expr, key } = &node.kind else {
            return self.context.null_type();
        };

        let expr_type = self.eval(expr);
        if matches!(*expr_type, DataType::Class(_)) {
            self.throw(node.location, "Field access of classes is not permitted");
            return self.context.null_type();
        }

        let key_type = self.eval(key);
        if *key_type != DataType::Int {
            self.throw(node.location, "Key must be of type integer");
            return self.context.null_type();
        }

        let DataType::Array(element_type) = &*expr_type else {
            self.throw(node.location, "Invalid subscript operation");
            return self.context.null_type();
        };

        // Compile-time bounds check where the size is statically known:
        // an immutable variable holding a literal array, or a literal array
        if let (NodeKind::Ident(name), NodeKind::Int(index)) = (&expr.kind, &key.kind)
            && let Some(symbol_id) = self.arena.lookup(self.scope, name)
        {
            let symbol = self.arena.symbol(symbol_id);
            let out_of_range = *index < 0 || *index >= i64::from(symbol.array_size);
            let size_known = symbol.array_size != -1;
            if out_of_range && !symbol.is_mutable() && size_known {
                self.throw(node.location, "Array index out of bounds");
                return self.context.null_type();
            }
        } else if let (NodeKind::Array { elements, .. }, NodeKind::Int(index)) =
            (&expr.kind, &key.kind)
            && (*index < 0 || *index >= elements.len() as i64)
        {
            self.throw(node.location, "Array index out of bounds");
            return self.context.null_type();
        }

        self.emit_op(Opcode::Getsub);
        element_type.clone()
    }
}
