//! End-to-end tests: compile source, execute on the VM, compare stdout.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

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

fn run(source: &str) -> String {
    let buffer = opalc::compile_source("test", source).expect("compilation failure");
    let sink = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(sink.clone()));
    vm.run(&buffer).expect("runtime failure");
    let out = String::from_utf8(sink.0.borrow().clone()).unwrap();
    out
}

// =============================================================================
// Language scenarios
// =============================================================================

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run("using core; println(1 + 2 * 3)"), "7\n");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(run("using core; let mut s = \"hi\"; s = s + \"!\"; println(s)"), "hi!\n");
}

#[test]
fn test_recursive_fibonacci() {
    let source = "using core; \
        func fib(n:int)->int { if n<2 {return n}; return fib(n-1)+fib(n-2) }; \
        println(fib(10))";
    assert_eq!(run(source), "55\n");
}

#[test]
fn test_array_length() {
    assert_eq!(run("using core; let a = [1,2,3]; println(a.length())"), "3\n");
}

#[test]
fn test_class_with_getters() {
    let source = "using core; \
        type Pt(x:int,y:int){ @Getter let x = x; @Getter let y = y }; \
        let p = Pt(3,4); \
        println(p.getX() + p.getY())";
    assert_eq!(run(source), "7\n");
}

#[test]
fn test_option_unwrap() {
    let source = "using core; let mut opt = Some(5); \
        if opt.isSome() { println(opt.unwrap()) }";
    assert_eq!(run(source), "5\n");
}

// =============================================================================
// Further behaviour
// =============================================================================

#[test]
fn test_while_loop_accumulates() {
    let source = "using core\n\
        let mut i = 0\n\
        let mut total = 0\n\
        while i < 5 { total = total + i\ni = i + 1 }\n\
        println(total)";
    assert_eq!(run(source), "10\n");
}

#[test]
fn test_if_else_chain() {
    let source = "using core\n\
        let x = 4\n\
        if x == 5 { println(5) } else if x == 4 { println(4) } else { println(0) }";
    assert_eq!(run(source), "4\n");
}

#[test]
fn test_string_interpolation() {
    let source = "using core\nlet x = 5\nprintln(\"x is $x!\")";
    assert_eq!(run(source), "x is 5!\n");
}

#[test]
fn test_interpolation_of_string_variable() {
    let source = "using core\nlet who = \"world\"\nprintln(\"hello $who\")";
    assert_eq!(run(source), "hello world\n");
}

#[test]
fn test_setter_and_getter() {
    let source = "using core\n\
        type P(v:int){ @Getter\n@Setter\nlet mut x = v }\n\
        let mut p = P(1)\n\
        p.setX(9)\n\
        println(p.getX())";
    assert_eq!(run(source), "9\n");
}

#[test]
fn test_plain_methods_mutate_their_receiver() {
    let source = "using core\n\
        type Counter(start:int){\n\
            let mut n = start\n\
            func bump() { n = n + 1 }\n\
            func value() -> int { return n }\n\
        }\n\
        let mut c = Counter(40)\n\
        c.bump()\n\
        c.bump()\n\
        println(c.value())";
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_char_comparison() {
    let source = "using core\nlet c = \"x\"\nif c == \"x\" { println(1) }";
    assert_eq!(run(source), "1\n");
}

#[test]
fn test_subscripts_and_element_assignment() {
    let source = "using core\n\
        let mut a = [10,20,30]\n\
        a[1] = 99\n\
        println(a[1])\n\
        println(a.at(2))";
    assert_eq!(run(source), "99\n30\n");
}

#[test]
fn test_array_add_and_append() {
    let source = "using core\n\
        let mut a = [1]\n\
        a = a.add(2)\n\
        a = a.append([3,4])\n\
        println(a.length())\n\
        println(a)";
    assert_eq!(run(source), "4\n[1, 2, 3, 4]\n");
}

#[test]
fn test_conversions_chain() {
    let source = "using core\n\
        let f = 3.9\n\
        println(f.to_i())\n\
        println(5.to_f())\n\
        println(true.to_i())";
    assert_eq!(run(source), "3\n5\n1\n");
}

#[test]
fn test_closures_read_and_write_outer_locals() {
    let source = "using core\n\
        func outer() -> int {\n\
            let mut a = 1\n\
            func bump() { a = a + 10 }\n\
            bump()\n\
            bump()\n\
            return a\n\
        }\n\
        println(outer())";
    assert_eq!(run(source), "21\n");
}

#[test]
fn test_nested_virtual_scopes_share_the_frame() {
    let source = "using core\n\
        func f(n:int) -> int {\n\
            let mut result = 0\n\
            if n > 0 {\n\
                let doubled = n * 2\n\
                result = doubled\n\
            }\n\
            return result\n\
        }\n\
        println(f(21))";
    assert_eq!(run(source), "42\n");
}

#[test]
fn test_float_arithmetic() {
    let source = "using core\nprintln(1.5 + 2.25)\nprintln(10.0 / 4.0)";
    assert_eq!(run(source), "3.75\n2.5\n");
}

#[test]
fn test_math_intrinsics() {
    let source = "using core\nusing math\nprintln(sqrt(16.0))\nprintln(floor(3.7))";
    assert_eq!(run(source), "4\n3\n");
}

#[test]
fn test_sysarg_returns_arguments_or_empty() {
    let buffer = opalc::compile_source(
        "test",
        "using core\nprintln(sysarg(1))\nprintln(sysarg(9))",
    )
    .unwrap();
    let sink = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(sink.clone()));
    vm.set_argv(vec!["opal".to_string(), "hello".to_string()]);
    vm.run(&buffer).unwrap();
    assert_eq!(String::from_utf8(sink.0.borrow().clone()).unwrap(), "hello\n\n");
}

#[test]
fn test_gc_heavy_string_building() {
    let source = "using core\n\
        let mut s = \"\"\n\
        let mut i = 0\n\
        while i < 50 { s = s + \"ab\"\ni = i + 1 }\n\
        println(s.length())";
    assert_eq!(run(source), "100\n");
}

#[test]
fn test_empty_typed_array_grows() {
    let source = "using core\n\
        let mut a = [::int]\n\
        a = a.add(7)\n\
        println(a.length())\n\
        println(a[0])";
    assert_eq!(run(source), "1\n7\n");
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_constant_folding_preserves_observable_output() {
    // Literal expressions fold at compile time; routing the operands
    // through variables defeats folding. Outputs must agree.
    let cases = [
        ("1 + 2 * 3 - 4", ("let a = 1\nlet b = 2\nlet c = 3\nlet d = 4", "a + b * c - d")),
        ("(5 * 7) % 3", ("let a = 5\nlet b = 7\nlet c = 3", "(a * b) % c")),
        ("255 & 15 | 16 ^ 1", ("let a = 255\nlet b = 15\nlet c = 16\nlet d = 1", "a & b | c ^ d")),
        ("1 << 10", ("let a = 1\nlet b = 10", "a << b")),
        ("100 / 7", ("let a = 100\nlet b = 7", "a / b")),
    ];

    for (folded, (decls, unfolded)) in cases {
        let folded_out = run(&format!("using core\nprintln({})", folded));
        let unfolded_out = run(&format!("using core\n{}\nprintln({})", decls, unfolded));
        assert_eq!(folded_out, unfolded_out, "mismatch for '{}'", folded);
    }
}

#[test]
fn test_bytecode_round_trip_runs_identically() {
    let source = "using core; \
        func fib(n:int)->int { if n<2 {return n}; return fib(n-1)+fib(n-2) }; \
        println(fib(12))";
    let buffer = opalc::compile_source("test", source).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fib.gvm");
    opalc::serializer::serialize(&path, &buffer).unwrap();
    let restored = opalc::serializer::deserialize(&path).unwrap();
    assert_eq!(buffer, restored);

    let sink = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(sink.clone()));
    vm.run(&restored).unwrap();
    assert_eq!(String::from_utf8(sink.0.borrow().clone()).unwrap(), "144\n");
}

#[test]
fn test_runtime_division_by_zero_traps() {
    let buffer = opalc::compile_source("test", "using core\nlet z = 0\nprintln(7 / z)").unwrap();
    let sink = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(sink.clone()));
    let error = vm.run(&buffer).unwrap_err();
    assert_eq!(error.message, "Division by zero");
}

#[test]
fn test_imported_file_class_reads_sources_back() {
    use std::io::Write as _;
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("data.txt");
    let mut f = std::fs::File::create(&data_path).unwrap();
    write!(f, "from disk").unwrap();

    let source = format!(
        "using core\nusing io\nlet f = File(\"{}\")\nprintln(f.read())",
        data_path.display()
    );
    assert_eq!(run(&source), "from disk\n");
}
