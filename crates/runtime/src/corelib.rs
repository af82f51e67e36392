//! `core` intrinsics: console I/O and process plumbing.

use std::io::{Read, Write};

use opal_core::value::Value;

use crate::vm::Vm;

pub fn print(vm: &mut Vm) {
    let value = vm.pop();
    let text = vm.stringify(value);
    let _ = write!(vm.out, "{}", text);
    vm.push(Value::NULL);
}

pub fn println(vm: &mut Vm) {
    let value = vm.pop();
    let text = vm.stringify(value);
    let _ = writeln!(vm.out, "{}", text);
    vm.push(Value::NULL);
}

/// Read one line from stdin, trailing newline included.
pub fn getline(vm: &mut Vm) {
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    vm.register_string(line);
}

pub fn parse_float(vm: &mut Vm) {
    let text = vm.pop_string();
    let value: f64 = text.trim().parse().unwrap_or(0.0);
    vm.push(Value::float(value));
}

/// Block until a key is pressed.
pub fn brk(vm: &mut Vm) {
    let mut byte = [0u8; 1];
    let _ = std::io::stdin().read(&mut byte);
    vm.push(Value::NULL);
}

/// Seconds of wall-clock time since the machine started.
pub fn clock(vm: &mut Vm) {
    vm.push(Value::float(vm.start.elapsed().as_secs_f64()));
}

/// `sysarg(i)` returns `argv[i]`, or `""` when out of range.
pub fn sysarg(vm: &mut Vm) {
    let index = vm.pop().as_int32();
    let arg = if index >= 0 {
        vm.argv.get(index as usize).cloned().unwrap_or_default()
    } else {
        String::new()
    };
    vm.register_string(arg);
}
