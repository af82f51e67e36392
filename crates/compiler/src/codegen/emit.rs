//! Instruction emission helpers.
//!
//! Thin wrappers that append to the compiler's instruction buffer. Emitters
//! for jumps and class headers return the buffer index so the caller can
//! patch the operand once the target address is known.

use opal_core::bytecode::{Instruction, Opcode, Operand};

use super::Compiler;
use crate::lexer::TokenKind;
use crate::types::DataType;

impl Compiler {
    pub(super) fn emit(&mut self, instruction: Instruction) -> usize {
        self.buffer.push(instruction);
        self.buffer.len() - 1
    }

    pub(super) fn emit_op(&mut self, op: Opcode) -> usize {
        self.emit(Instruction::new(op))
    }

    pub(super) fn emit_int(&mut self, value: i64) -> usize {
        self.emit(Instruction::with1(Opcode::Push, Operand::int(value as i32)))
    }

    pub(super) fn emit_float(&mut self, value: f64) -> usize {
        self.emit(Instruction::with1(Opcode::Push, Operand::float(value)))
    }

    pub(super) fn emit_bool(&mut self, value: bool) -> usize {
        self.emit(Instruction::with1(Opcode::Push, Operand::bool(value)))
    }

    pub(super) fn emit_char(&mut self, value: char) -> usize {
        self.emit(Instruction::with1(Opcode::Push, Operand::int(value as i32)))
    }

    pub(super) fn emit_string(&mut self, value: &str) -> usize {
        self.emit(Instruction::with1(Opcode::Push, Operand::Str(value.to_string())))
    }

    pub(super) fn emit_pop(&mut self) {
        self.emit_op(Opcode::Pop);
    }

    pub(super) fn emit_store(&mut self, address: i32, global: bool) {
        let op = if global { Opcode::Gstore } else { Opcode::Store };
        self.emit(Instruction::with1(op, Operand::int(address)));
    }

    pub(super) fn emit_load(&mut self, address: i32, global: bool) {
        let op = if global { Opcode::Gload } else { Opcode::Load };
        self.emit(Instruction::with1(op, Operand::int(address)));
    }

    pub(super) fn emit_load_upval(&mut self, depth: i32, address: i32) {
        self.emit(Instruction::with2(
            Opcode::Upval,
            Operand::int(depth),
            Operand::int(address),
        ));
    }

    pub(super) fn emit_store_upval(&mut self, depth: i32, address: i32) {
        self.emit(Instruction::with2(
            Opcode::Upstore,
            Operand::int(depth),
            Operand::int(address),
        ));
    }

    pub(super) fn emit_syscall(&mut self, index: i32) {
        self.emit(Instruction::with1(Opcode::Syscall, Operand::int(index)));
    }

    pub(super) fn emit_invoke(&mut self, address: i32, argc: i32) {
        self.emit(Instruction::with2(
            Opcode::Invoke,
            Operand::int(address),
            Operand::int(argc),
        ));
    }

    pub(super) fn emit_return(&mut self) {
        self.emit_op(Opcode::Ret);
    }

    pub(super) fn emit_reserve(&mut self, slots: i32) {
        self.emit(Instruction::with1(Opcode::Reserve, Operand::int(slots)));
    }

    pub(super) fn emit_string_merge(&mut self, count: i32) {
        self.emit(Instruction::with1(Opcode::Str, Operand::int(count)));
    }

    pub(super) fn emit_array_merge(&mut self, count: i32) {
        self.emit(Instruction::with1(Opcode::Arr, Operand::int(count)));
    }

    pub(super) fn emit_setfield(&mut self, address: i32) {
        self.emit(Instruction::with1(Opcode::Setfield, Operand::int(address)));
    }

    pub(super) fn emit_getfield(&mut self, address: i32) {
        self.emit(Instruction::with1(Opcode::Getfield, Operand::int(address)));
    }

    /// Emit a jump with a placeholder target; returns the index to patch.
    pub(super) fn emit_jmp(&mut self, address: i32) -> usize {
        self.emit(Instruction::with1(Opcode::Jmp, Operand::int(address)))
    }

    pub(super) fn emit_jmpf(&mut self, address: i32) -> usize {
        self.emit(Instruction::with1(Opcode::Jmpf, Operand::int(address)))
    }

    /// Emit a class allocation with a placeholder field count.
    pub(super) fn emit_class(&mut self, fields: i32) -> usize {
        self.emit(Instruction::with1(Opcode::Class, Operand::int(fields)))
    }

    /// Patch the first operand of a previously emitted instruction.
    pub(super) fn patch(&mut self, index: usize, value: i32) {
        self.buffer[index].v1 = Some(Operand::int(value));
    }

    pub(super) fn current_address(&self) -> usize {
        self.buffer.len()
    }

    pub(super) fn last_op(&self) -> Option<Opcode> {
        self.buffer.last().map(|ins| ins.op)
    }

    /// Map a binary operator token and operand type to an opcode. `None`
    /// means the operator is not defined for the type.
    pub(super) fn tok2op(op: TokenKind, ty: &DataType) -> Option<Opcode> {
        match op {
            TokenKind::Add => match ty {
                DataType::Int => Some(Opcode::Iadd),
                DataType::Float => Some(Opcode::Fadd),
                _ => None,
            },
            TokenKind::Sub => match ty {
                DataType::Int => Some(Opcode::Isub),
                DataType::Float => Some(Opcode::Fsub),
                _ => None,
            },
            TokenKind::Mul => match ty {
                DataType::Int => Some(Opcode::Imul),
                DataType::Float => Some(Opcode::Fmul),
                _ => None,
            },
            TokenKind::Div => match ty {
                DataType::Int => Some(Opcode::Idiv),
                DataType::Float => Some(Opcode::Fdiv),
                _ => None,
            },
            TokenKind::Mod => matches!(ty, DataType::Int).then_some(Opcode::Mod),
            TokenKind::ShiftLeft => matches!(ty, DataType::Int).then_some(Opcode::Bitl),
            TokenKind::ShiftRight => matches!(ty, DataType::Int).then_some(Opcode::Bitr),
            TokenKind::BitAnd => matches!(ty, DataType::Int).then_some(Opcode::Bitand),
            TokenKind::BitOr => matches!(ty, DataType::Int).then_some(Opcode::Bitor),
            TokenKind::BitXor => matches!(ty, DataType::Int).then_some(Opcode::Bitxor),
            TokenKind::EqualEqual => match ty {
                DataType::Bool => Some(Opcode::Beq),
                // char shares the int32 encoding at runtime
                DataType::Int | DataType::Char => Some(Opcode::Ieq),
                DataType::Float => Some(Opcode::Feq),
                _ => None,
            },
            TokenKind::NotEqual => match ty {
                DataType::Bool => Some(Opcode::Bne),
                DataType::Int | DataType::Char => Some(Opcode::Ine),
                DataType::Float => Some(Opcode::Fne),
                _ => None,
            },
            TokenKind::Less => match ty {
                DataType::Int | DataType::Char => Some(Opcode::Ilt),
                DataType::Float => Some(Opcode::Flt),
                _ => None,
            },
            TokenKind::Greater => match ty {
                DataType::Int | DataType::Char => Some(Opcode::Igt),
                DataType::Float => Some(Opcode::Fgt),
                _ => None,
            },
            TokenKind::LessEqual => match ty {
                DataType::Int | DataType::Char => Some(Opcode::Ile),
                DataType::Float => Some(Opcode::Fle),
                _ => None,
            },
            TokenKind::GreaterEqual => match ty {
                DataType::Int | DataType::Char => Some(Opcode::Ige),
                DataType::Float => Some(Opcode::Fge),
                _ => None,
            },
            TokenKind::AndAnd => matches!(ty, DataType::Bool).then_some(Opcode::Band),
            TokenKind::OrOr => matches!(ty, DataType::Bool).then_some(Opcode::Bor),
            _ => None,
        }
    }
}
