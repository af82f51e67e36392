//! `io` intrinsics: whole-file reads and writes.

use std::fs::OpenOptions;
use std::io::Write;

use opal_core::value::Value;

use crate::vm::Vm;

/// `readFile(path)` returns the file contents, or `""` if unreadable.
pub fn read_file(vm: &mut Vm) {
    let path = vm.pop_string();
    let contents = std::fs::read_to_string(&path).unwrap_or_default();
    vm.register_string(contents);
}

/// `writeFile(name, content, mode)` — a mode containing `a` appends,
/// anything else truncates.
pub fn write_file(vm: &mut Vm) {
    let mode = vm.pop_string();
    let content = vm.pop_string();
    let filename = vm.pop_string();

    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if mode.contains('a') {
        options.append(true);
    } else {
        options.truncate(true);
    }

    if let Ok(mut file) = options.open(&filename) {
        let _ = file.write_all(content.as_bytes());
    }
    vm.push(Value::NULL);
}
