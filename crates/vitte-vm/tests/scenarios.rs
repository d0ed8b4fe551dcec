//! Scénarios de bout en bout (spec §8 : table A-F). Chacun exerce un sous-
//! ensemble distinct d'opcodes ; voir les commentaires par test.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use vitte_vm::{Vm, VmError, VmOptions};

#[derive(Clone)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("vm output is not valid utf-8")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run(source: &str) -> (Result<(), VmError>, String, String) {
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();
    let mut vm = Vm::with_io(VmOptions::default(), Box::new(stdout.clone()), Box::new(stderr.clone()));
    let result = vm.interpret(source);
    (result, stdout.contents(), stderr.contents())
}

#[test]
fn scenario_a_arithmetic_and_precedence() {
    let (result, stdout, _) = run("print 1 + 2 * 3;");
    assert!(result.is_ok());
    assert_eq!(stdout, "7\n");
}

#[test]
fn scenario_b_string_concatenation_and_interning() {
    let (result, stdout, _) = run(r#"var a = "foo"; var b = "bar"; print a + b;"#);
    assert!(result.is_ok());
    assert_eq!(stdout, "foobar\n");
}

#[test]
fn scenario_c_recursive_calls_returns_and_jumps() {
    let (result, stdout, _) =
        run("fun f(n) { if (n < 2) return n; return f(n-1) + f(n-2); } print f(10);");
    assert!(result.is_ok());
    assert_eq!(stdout, "55\n");
}

#[test]
fn scenario_d_closures_and_upvalue_capture() {
    let source = r#"
        fun mk() {
            var x = 0;
            fun inc() { x = x + 1; return x; }
            return inc;
        }
        var c = mk();
        print c();
        print c();
    "#;
    let (result, stdout, _) = run(source);
    assert!(result.is_ok());
    assert_eq!(stdout, "1\n2\n");
}

#[test]
fn scenario_e_classes_initializers_and_bound_methods() {
    let source = r#"
        class Greeter {
            init(name) { this.name = name; }
            hi() { print "hi " + this.name; }
        }
        Greeter("world").hi();
    "#;
    let (result, stdout, _) = run(source);
    assert!(result.is_ok());
    assert_eq!(stdout, "hi world\n");
}

#[test]
fn scenario_f_runtime_type_error_on_mixed_add() {
    let (result, stdout, stderr) = run(r#"print 1 + "a";"#);
    assert_eq!(result, Err(VmError::RuntimeError));
    assert!(stdout.is_empty());
    assert!(stderr.contains("Operands must be two numbers or two strings."));
}

#[test]
fn closures_over_the_same_local_share_one_upvalue() {
    // Propriété 7 : deux fermetures sur le même local partagent la même case,
    // y compris après sa fermeture à la sortie de portée.
    let source = r#"
        var shared_get;
        var shared_set;
        fun mk() {
            var x = 0;
            fun get() { return x; }
            fun set(v) { x = v; }
            shared_get = get;
            shared_set = set;
        }
        mk();
        shared_set(42);
        print shared_get();
    "#;
    let (result, stdout, _) = run(source);
    assert!(result.is_ok());
    assert_eq!(stdout, "42\n");
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let (result, _, stderr) = run("fun f(a, b) { return a + b; } f(1);");
    assert_eq!(result, Err(VmError::RuntimeError));
    assert!(stderr.contains("Expected 2 arguments but got 1."));
}

#[test]
fn undefined_global_is_a_runtime_error() {
    let (result, _, stderr) = run("print undefined_name;");
    assert_eq!(result, Err(VmError::RuntimeError));
    assert!(stderr.contains("Undefined variable 'undefined_name'."));
}

#[test]
fn compile_error_is_reported_without_running() {
    let (result, stdout, stderr) = run("var = 1;");
    assert_eq!(result, Err(VmError::CompileError));
    assert!(stdout.is_empty());
    assert!(!stderr.is_empty());
}

#[test]
fn stress_gc_does_not_change_observable_behavior() {
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();
    let options = VmOptions { stress_gc: true, ..VmOptions::default() };
    let mut vm = Vm::with_io(options, Box::new(stdout.clone()), Box::new(stderr.clone()));
    let result = vm.interpret("fun f(n) { if (n < 2) return n; return f(n-1) + f(n-2); } print f(10);");
    assert!(result.is_ok());
    assert_eq!(stdout.contents(), "55\n");
}
