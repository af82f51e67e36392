//! Host intrinsic dispatch.
//!
//! The syscall table mirrors the compiler's signature registration order:
//! `core` (1-7), `math` (8-26), `io` (27-28), addressed zero-based by the
//! `SYSCALL` operand. Every intrinsic pops its own arguments (rightmost
//! first) and pushes exactly one result.

use crate::vm::Vm;
use crate::{corelib, iolib, mathlib};

pub type Intrinsic = fn(&mut Vm);

pub const TABLE: &[(&str, Intrinsic)] = &[
    // core
    ("print", corelib::print),
    ("println", corelib::println),
    ("getline", corelib::getline),
    ("parseFloat", corelib::parse_float),
    ("break", corelib::brk),
    ("clock", corelib::clock),
    ("sysarg", corelib::sysarg),
    // math
    ("sin", mathlib::sin),
    ("cos", mathlib::cos),
    ("tan", mathlib::tan),
    ("asin", mathlib::asin),
    ("acos", mathlib::acos),
    ("atan", mathlib::atan),
    ("atan2", mathlib::atan2),
    ("sinh", mathlib::sinh),
    ("cosh", mathlib::cosh),
    ("tanh", mathlib::tanh),
    ("exp", mathlib::exp),
    ("ln", mathlib::ln),
    ("log", mathlib::log),
    ("pow", mathlib::pow),
    ("sqrt", mathlib::sqrt),
    ("ceil", mathlib::ceil),
    ("floor", mathlib::floor),
    ("abs", mathlib::abs),
    ("prng", mathlib::prng),
    // io
    ("readFile", iolib::read_file),
    ("writeFile", iolib::write_file),
];

/// Invoke the intrinsic at the (zero-based) syscall index.
pub fn call(vm: &mut Vm, index: usize) {
    match TABLE.get(index) {
        Some((_, intrinsic)) => intrinsic(vm),
        None => vm.throw(&format!("Unknown syscall index {}", index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout_matches_signature_order() {
        assert_eq!(TABLE.len(), 28);
        assert_eq!(TABLE[0].0, "print");
        assert_eq!(TABLE[1].0, "println");
        assert_eq!(TABLE[6].0, "sysarg");
        // math starts right after core
        assert_eq!(TABLE[7].0, "sin");
        assert_eq!(TABLE[21].0, "sqrt");
        assert_eq!(TABLE[25].0, "prng");
        // io closes the table
        assert_eq!(TABLE[26].0, "readFile");
        assert_eq!(TABLE[27].0, "writeFile");
    }
}
