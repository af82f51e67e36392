//! Machine-level property tests over hand-assembled instruction buffers.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use opal_core::bytecode::{Instruction, Opcode, Operand};
use opal_runtime::Vm;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture() -> (Vm, SharedBuf) {
    let buf = SharedBuf::default();
    let vm = Vm::with_output(Box::new(buf.clone()));
    (vm, buf)
}

fn output(buf: &SharedBuf) -> String {
    String::from_utf8(buf.0.borrow().clone()).unwrap()
}

fn ins(op: Opcode) -> Instruction {
    Instruction::new(op)
}

fn ins1(op: Opcode, v: i32) -> Instruction {
    Instruction::with1(op, Operand::int(v))
}

fn ins2(op: Opcode, a: i32, b: i32) -> Instruction {
    Instruction::with2(op, Operand::int(a), Operand::int(b))
}

#[test]
fn test_upvalue_reads_cross_one_frame() {
    // outer: reserve a local, store 11, call inner, return its result
    // inner: load outer's local through the saved frame chain
    let program = vec![
        ins1(Opcode::Jmp, 8),
        ins1(Opcode::Reserve, 1), // outer @1
        ins1(Opcode::Push, 11),
        ins1(Opcode::Store, 0),
        ins2(Opcode::Invoke, 6, 0),
        ins(Opcode::Ret),
        ins2(Opcode::Upval, 1, 0), // inner @6
        ins(Opcode::Ret),
        ins2(Opcode::Invoke, 1, 0), // main @8
        ins1(Opcode::Syscall, 1),   // println
        ins(Opcode::Pop),
        ins(Opcode::Hlt),
    ];

    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "11\n");
    assert_eq!(vm.stats.final_sp, 0);
}

#[test]
fn test_upstore_writes_into_the_outer_frame() {
    let program = vec![
        ins1(Opcode::Jmp, 12),
        ins1(Opcode::Reserve, 1), // outer @1
        ins1(Opcode::Push, 1),
        ins1(Opcode::Store, 0),
        ins2(Opcode::Invoke, 8, 0), // call inner, which rewrites the local
        ins(Opcode::Pop),           // drop inner's dummy return
        ins1(Opcode::Load, 0),
        ins(Opcode::Ret),
        ins1(Opcode::Push, 99), // inner @8
        ins2(Opcode::Upstore, 1, 0),
        ins1(Opcode::Push, 0),
        ins(Opcode::Ret),
        ins2(Opcode::Invoke, 1, 0), // main @12
        ins1(Opcode::Syscall, 1),
        ins(Opcode::Pop),
        ins(Opcode::Hlt),
    ];

    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "99\n");
    assert_eq!(vm.stats.final_sp, 0);
}

#[test]
fn test_stack_discipline_across_nested_calls() {
    // A chain of calls three deep; every frame unwinds completely
    let program = vec![
        ins1(Opcode::Jmp, 7),
        ins1(Opcode::Push, 5), // level1 @1: returns 5
        ins(Opcode::Ret),
        ins2(Opcode::Invoke, 1, 0), // level2 @3: returns level1()
        ins(Opcode::Ret),
        ins2(Opcode::Invoke, 3, 0), // level3 @5: returns level2()
        ins(Opcode::Ret),
        ins2(Opcode::Invoke, 5, 0), // main @7
        ins1(Opcode::Syscall, 1),
        ins(Opcode::Pop),
        ins(Opcode::Hlt),
    ];

    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "5\n");
    assert_eq!(vm.stats.final_sp, 0);
}

#[test]
fn test_gc_survives_append_churn() {
    // Repeatedly concatenate strings, leaving garbage behind each time;
    // the final value must still be intact
    let mut program = vec![Instruction::with1(Opcode::Push, Operand::Str("a".into()))];
    for _ in 0..24 {
        program.push(Instruction::with1(Opcode::Push, Operand::Str("b".into())));
        program.push(ins(Opcode::Append));
    }
    program.push(ins(Opcode::Len));
    program.push(ins1(Opcode::Syscall, 1));
    program.push(ins(Opcode::Pop));
    program.push(ins(Opcode::Hlt));

    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "25\n");
    assert!(vm.stats.collections >= 1);
    assert_eq!(vm.num_objects(), 0);
}

#[test]
fn test_cons_extends_arrays() {
    let program = vec![
        ins1(Opcode::Push, 1),
        ins1(Opcode::Arr, 1),
        ins1(Opcode::Push, 2),
        ins(Opcode::Cons),
        ins1(Opcode::Push, 3),
        ins(Opcode::Cons),
        ins1(Opcode::Syscall, 1),
        ins(Opcode::Pop),
        ins(Opcode::Hlt),
    ];
    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "[1, 2, 3]\n");
}

#[test]
fn test_setsub_mutates_in_place() {
    let program = vec![
        ins1(Opcode::Push, 7), // value to store
        ins1(Opcode::Push, 1),
        ins1(Opcode::Push, 2),
        ins1(Opcode::Arr, 2), // target [1, 2]
        ins1(Opcode::Push, 0), // key
        ins(Opcode::Setsub),
        ins1(Opcode::Syscall, 1),
        ins(Opcode::Pop),
        ins(Opcode::Hlt),
    ];
    let (mut vm, buf) = capture();
    vm.run(&program).unwrap();
    assert_eq!(output(&buf), "[7, 2]\n");
}
