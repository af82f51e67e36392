//! Call lowering.
//!
//! Free function calls, constructor calls, method calls through a receiver,
//! and the built-in methods that attach to the primitive datatypes
//! (conversions, array operations, option queries).

use opal_core::bytecode::Opcode;

use super::Compiler;
use crate::ast::{Node, NodeKind};
use crate::scope::SymbolKind;
use crate::types::{DataType, TypeHandle, datatype_match};

impl Compiler {
    pub(super) fn eval_call(&mut self, node: &Node) -> TypeHandle {
        let NodeKind::Call { callee, args } = &node.kind else {
            return self.context.null_type();
        };

        match &callee.kind {
            NodeKind::Ident(name) => self.eval_named_call(node, name, args),
            NodeKind::Subscript { expr, key } => {
                // Method call: the receiver's type picks the dispatcher
                let receiver_type = self.eval(expr);
                self.eval_datatype_call(node, expr, key, args, &receiver_type)
            }
            _ => {
                self.throw(node.location, "Callee has to be an identifier or a subscript");
                self.context.null_type()
            }
        }
    }

    fn eval_named_call(&mut self, node: &Node, name: &str, args: &[Node]) -> TypeHandle {
        let Some(symbol_id) = self.arena.lookup(self.scope, name) else {
            // The option constructor is a pseudo-function: the payload is
            // its own representation, so nothing is emitted around it
            if name == "Some" {
                let Some(expr) = args.first() else {
                    self.throw(node.location, "Expected one argument");
                    return self.context.null_type();
                };
                let sub = self.eval(expr);
                return self.context.find_or_create(DataType::Option(sub));
            }

            self.throw(
                node.location,
                &format!("Implicit declaration of function '{}'", name),
            );
            return self.context.null_type();
        };

        let symbol = self.arena.symbol(symbol_id).clone();
        match &symbol.kind {
            SymbolKind::Func { params, rettype, external } => {
                let is_method = symbol.owner.is_some();
                if is_method {
                    // Calling a sibling method: the receiver goes below the
                    // arguments and is written back after the call
                    self.emit_op(Opcode::Ldarg0);
                }

                let called =
                    self.compare_and_call(node, name, args, params, *external, symbol.address);
                if !called {
                    return self.context.null_type();
                }

                if is_method {
                    self.emit_op(Opcode::Setarg0);
                }
                self.finish_call(rettype.clone())
            }
            SymbolKind::Class { params, .. } => {
                // Constructor call: run the class body
                let called = self.compare_and_call(node, name, args, params, 0, symbol.address);
                if !called {
                    return self.context.null_type();
                }
                symbol.ty.clone()
            }
            SymbolKind::Var { .. } => {
                self.throw(node.location, &format!("Identifier '{}' is not a function", name));
                self.context.null_type()
            }
        }
    }

    /// Check arity and argument types against the parameter list, then emit
    /// the invocation (syscall for externals). `generic` parameters accept
    /// any argument type.
    pub(super) fn compare_and_call(
        &mut self,
        node: &Node,
        name: &str,
        args: &[Node],
        params: &[TypeHandle],
        external: i32,
        address: i32,
    ) -> bool {
        if args.len() > params.len() {
            self.throw(
                node.location,
                &format!(
                    "Too many arguments for function '{}'. Expected: {}",
                    name,
                    params.len()
                ),
            );
            return false;
        }
        if args.len() < params.len() {
            self.throw(
                node.location,
                &format!(
                    "Too few arguments for function '{}'. Expected: {}",
                    name,
                    params.len()
                ),
            );
            return false;
        }

        for (index, (param, arg)) in params.iter().zip(args).enumerate() {
            let arg_type = self.eval(arg);
            if **param == DataType::Generic {
                continue;
            }
            if !datatype_match(&arg_type, param) {
                self.throw(
                    node.location,
                    &format!(
                        "Parameter {} has the wrong type.\nFound: {}, expected: {}",
                        index + 1,
                        arg_type,
                        param
                    ),
                );
                break;
            }
        }

        if external > 0 {
            self.emit_syscall(external - 1);
        } else {
            self.emit_invoke(address, args.len() as i32);
        }
        true
    }

    /// Calls always leave one value; a void call's placeholder result is
    /// dropped immediately.
    fn finish_call(&mut self, rettype: TypeHandle) -> TypeHandle {
        if *rettype == DataType::Void {
            self.emit_pop();
        }
        rettype
    }

    fn eval_datatype_call(
        &mut self,
        node: &Node,
        expr: &Node,
        key: &Node,
        args: &[Node],
        receiver: &TypeHandle,
    ) -> TypeHandle {
        match &**receiver {
            DataType::Option(sub) => self.eval_option_method(node, key, args, &sub.clone()),
            DataType::Class(id) => self.eval_class_method(node, expr, key, args, *id),
            DataType::Array(sub) => {
                self.eval_array_method(node, key, args, &receiver.clone(), &sub.clone())
            }
            // int and char share the 32-bit integer representation
            DataType::Int | DataType::Char => self.eval_int32_method(node, key, args, receiver),
            DataType::Bool => self.eval_bool_method(node, key, args),
            DataType::Float => self.eval_float_method(node, key, args),
            _ => {
                self.throw(node.location, "Unsupported operation");
                self.context.null_type()
            }
        }
    }

    fn method_name<'n>(&mut self, node: &Node, key: &'n Node) -> Option<&'n str> {
        match &key.kind {
            NodeKind::Ident(name) => Some(name),
            _ => {
                self.throw(node.location, "Unknown method");
                None
            }
        }
    }

    fn expect_zero_args(&mut self, node: &Node, args: &[Node]) -> bool {
        if args.is_empty() {
            return true;
        }
        self.throw(node.location, "Expected zero arguments");
        false
    }

    fn eval_option_method(
        &mut self,
        node: &Node,
        key: &Node,
        args: &[Node],
        sub: &TypeHandle,
    ) -> TypeHandle {
        let Some(name) = self.method_name(node, key) else {
            return self.context.null_type();
        };
        let name = name.to_string();
        if !self.expect_zero_args(node, args) {
            return self.context.null_type();
        }

        match name.as_str() {
            // None is the integer zero, so presence tests are compares
            "unwrap" => sub.clone(),
            "isSome" => {
                self.emit_int(0);
                self.emit_op(Opcode::Ine);
                self.context.bool_type()
            }
            "isNone" => {
                self.emit_int(0);
                self.emit_op(Opcode::Ieq);
                self.context.bool_type()
            }
            _ => {
                self.throw(node.location, "Invalid option type function");
                self.context.null_type()
            }
        }
    }

    fn eval_array_method(
        &mut self,
        node: &Node,
        key: &Node,
        args: &[Node],
        receiver: &TypeHandle,
        element: &TypeHandle,
    ) -> TypeHandle {
        let Some(name) = self.method_name(node, key) else {
            return self.context.null_type();
        };

        match name.to_string().as_str() {
            "length" => {
                if !self.expect_zero_args(node, args) {
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Len);
                self.context.int_type()
            }
            "empty" => {
                if !self.expect_zero_args(node, args) {
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Len);
                self.emit_int(0);
                self.emit_op(Opcode::Ile);
                self.context.bool_type()
            }
            "append" => {
                // Concatenation with another array of the same type
                if args.len() != 1 {
                    self.throw(node.location, "Expected one argument of type array");
                    return self.context.null_type();
                }
                let arg_type = self.eval(&args[0]);
                if !datatype_match(receiver, &arg_type) {
                    self.throw(node.location, "Argument has the wrong type");
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Append);
                receiver.clone()
            }
            "add" => {
                // Push one element
                if args.len() != 1 {
                    self.throw(node.location, "Expected one argument");
                    return self.context.null_type();
                }
                let arg_type = self.eval(&args[0]);
                if !datatype_match(element, &arg_type) {
                    self.throw(node.location, "Argument has the wrong type");
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Cons);
                receiver.clone()
            }
            "at" => {
                if args.len() != 1 {
                    self.throw(node.location, "Expected one argument of type int");
                    return self.context.null_type();
                }
                let arg_type = self.eval(&args[0]);
                if !datatype_match(&arg_type, &self.context.int_type()) {
                    self.throw(node.location, "Argument has the wrong type");
                    return self.context.null_type();
                }
                self.emit_op(Opcode::Getsub);
                element.clone()
            }
            _ => {
                self.throw(node.location, "Invalid array operation");
                self.context.null_type()
            }
        }
    }

    fn eval_int32_method(
        &mut self,
        node: &Node,
        key: &Node,
        args: &[Node],
        receiver: &TypeHandle,
    ) -> TypeHandle {
        let Some(name) = self.method_name(node, key) else {
            return self.context.null_type();
        };
        let name = name.to_string();
        if !self.expect_zero_args(node, args) {
            return self.context.null_type();
        }

        let is_char = **receiver == DataType::Char;
        match name.as_str() {
            "to_f" => {
                self.emit_op(Opcode::I2f);
                self.context.float_type()
            }
            // int and char share storage; the conversions are retags
            "to_c" if !is_char => self.context.char_type(),
            "to_i" if is_char => self.context.int_type(),
            "to_str" => {
                self.emit_op(Opcode::Tostr);
                self.context.str_type()
            }
            _ => {
                self.throw(node.location, "No such function");
                self.context.null_type()
            }
        }
    }

    fn eval_bool_method(&mut self, node: &Node, key: &Node, args: &[Node]) -> TypeHandle {
        let Some(name) = self.method_name(node, key) else {
            return self.context.null_type();
        };
        let name = name.to_string();
        if !self.expect_zero_args(node, args) {
            return self.context.null_type();
        }

        match name.as_str() {
            "to_i" => {
                self.emit_op(Opcode::B2i);
                self.context.int_type()
            }
            "to_str" => {
                self.emit_op(Opcode::Tostr);
                self.context.str_type()
            }
            _ => {
                self.throw(node.location, "No such function");
                self.context.null_type()
            }
        }
    }

    fn eval_float_method(&mut self, node: &Node, key: &Node, args: &[Node]) -> TypeHandle {
        let Some(name) = self.method_name(node, key) else {
            return self.context.null_type();
        };
        let name = name.to_string();
        if !self.expect_zero_args(node, args) {
            return self.context.null_type();
        }

        match name.as_str() {
            "to_i" => {
                self.emit_op(Opcode::F2i);
                self.context.int_type()
            }
            "to_c" => {
                self.emit_op(Opcode::F2i);
                self.context.char_type()
            }
            "to_str" => {
                self.emit_op(Opcode::Tostr);
                self.context.str_type()
            }
            _ => {
                self.throw(node.location, "No such function");
                self.context.null_type()
            }
        }
    }

    /// Method call on a class instance. The receiver is already on the
    /// stack below the arguments; after the call the updated receiver is
    /// stored back into its variable (or dropped for temporaries).
    fn eval_class_method(
        &mut self,
        node: &Node,
        expr: &Node,
        key: &Node,
        args: &[Node],
        class_id: u64,
    ) -> TypeHandle {
        let Some(class_symbol_id) = self.arena.find_class_by_id(self.scope, class_id) else {
            self.throw(node.location, "Class does not exist");
            return self.context.null_type();
        };

        let Some(method_name) = self.method_name(node, key) else {
            return self.context.null_type();
        };
        let method_name = method_name.to_string();

        let class_symbol = self.arena.symbol(class_symbol_id);
        let (class_name, method_id) = match &class_symbol.kind {
            SymbolKind::Class { fields, .. } => (
                class_symbol.name.clone(),
                fields.get(&method_name).copied(),
            ),
            _ => (class_symbol.name.clone(), None),
        };

        let Some(method_id) = method_id else {
            self.throw(
                node.location,
                &format!(
                    "Class field '{}' does not exist in class '{}'",
                    method_name, class_name
                ),
            );
            return self.context.null_type();
        };

        let method = self.arena.symbol(method_id).clone();
        let SymbolKind::Func { params, rettype, external } = &method.kind else {
            self.throw(
                node.location,
                &format!("Class field '{}' is not a function", method_name),
            );
            return self.context.null_type();
        };

        let called =
            self.compare_and_call(node, &method_name, args, params, *external, method.address);
        if !called {
            return self.context.null_type();
        }

        // The callee's RETVIRTUAL left the updated receiver on top
        if let NodeKind::Ident(receiver_name) = &expr.kind
            && let Some(receiver_id) = self.arena.lookup(self.scope, receiver_name)
        {
            self.symbol_replace(receiver_id);
        } else {
            self.emit_pop();
        }

        self.finish_call(rettype.clone())
    }
}
