//! The dispatch loop: a stack machine that executes one `Chunk` at a
//! time against a `Vm`'s persistent globals and heap.
//!
//! The operand stack itself does *not* persist across `interpret` calls:
//! each call compiles and runs one independent top-level unit (a script,
//! or one REPL line), so there is nothing to carry over except the
//! global variables and the interned-string/object arena, both of which
//! live on `Vm`.

use std::io::Write;
use std::rc::Rc;

use ember_core::chunk::OpCode;
use ember_core::{values_equal, Chunk, Heap, Obj, Table, Value};
use thiserror::Error;

use crate::compiler::{self, disassemble_instruction};

/// Hard cap on the operand stack, matching the single-byte `GetLocal`/
/// `SetLocal` slot operand.
const STACK_MAX: usize = 256;

/// Outcome of `Vm::interpret`, mirroring the three exit-status classes
/// the CLI maps to process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Messages for the runtime faults the dispatch loop can detect. Built
/// with `thiserror` so each variant carries its own `Display` text,
/// matching the wording the distilled interpreter prints verbatim.
#[derive(Debug, Error)]
enum RuntimeFault {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operands must be two numbers or two strings.")]
    AddTypeMismatch,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Stack overflow.")]
    StackOverflow,
}

/// Owns everything that must survive across separate `interpret` calls:
/// global variables and the heap's string-interning set and object
/// arena. A fresh `Chunk` and operand stack are created per call.
#[derive(Default)]
pub struct Vm {
    globals: Table<Value>,
    heap: Heap,
}

impl Vm {
    #[must_use]
    pub fn new() -> Self {
        Self {
            globals: Table::new(),
            heap: Heap::new(),
        }
    }

    /// Compiles and runs `source`. Compile errors are reported by the
    /// compiler itself (stderr); runtime errors are reported here,
    /// through `stderr`.
    pub fn interpret(
        &mut self,
        source: &str,
        stdout: &mut impl Write,
        stderr: &mut impl Write,
    ) -> InterpretResult {
        let mut chunk = Chunk::new();
        if compiler::compile(source, &mut chunk, &mut self.heap).is_err() {
            return InterpretResult::CompileError;
        }
        self.run(&chunk, stdout, stderr)
    }

    #[allow(clippy::too_many_lines)]
    fn run(&mut self, chunk: &Chunk, stdout: &mut impl Write, stderr: &mut impl Write) -> InterpretResult {
        let mut stack: Vec<Value> = Vec::with_capacity(STACK_MAX);
        let mut ip: usize = 0;

        macro_rules! push {
            ($value:expr) => {{
                if stack.len() >= STACK_MAX {
                    return self.runtime_error(chunk, ip, stderr, &RuntimeFault::StackOverflow);
                }
                stack.push($value);
            }};
        }

        macro_rules! binary_numeric {
            ($wrap:expr, $op:tt) => {{
                let b = stack.pop().expect("stack discipline guarantees an operand");
                let a = stack.pop().expect("stack discipline guarantees an operand");
                if !a.is_number() || !b.is_number() {
                    return self.runtime_error(chunk, ip, stderr, &RuntimeFault::OperandsMustBeNumbers);
                }
                push!($wrap(a.as_number() $op b.as_number()));
            }};
        }

        loop {
            if tracing::enabled!(tracing::Level::TRACE) {
                let (rendered, _) = disassemble_instruction(chunk, ip);
                tracing::trace!(stack = ?stack, instruction = %rendered, "dispatch");
            }

            let op = OpCode::from_u8(chunk.code()[ip]).expect("compiler only emits well-formed opcodes");
            ip += 1;

            match op {
                OpCode::Constant => {
                    let idx = chunk.code()[ip];
                    ip += 1;
                    push!(chunk.constant(idx).clone());
                }
                OpCode::Nil => push!(Value::Nil),
                OpCode::True => push!(Value::Bool(true)),
                OpCode::False => push!(Value::Bool(false)),
                OpCode::Pop => {
                    stack.pop();
                }
                OpCode::GetLocal => {
                    let slot = chunk.code()[ip] as usize;
                    ip += 1;
                    push!(stack[slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = chunk.code()[ip] as usize;
                    ip += 1;
                    stack[slot] = stack.last().expect("assignment always has a value on top").clone();
                }
                OpCode::GetGlobal => {
                    let idx = chunk.code()[ip];
                    ip += 1;
                    let name = chunk.constant(idx).as_object().clone();
                    match self.globals.get(&name) {
                        Some(value) => push!(value.clone()),
                        None => {
                            let fault = RuntimeFault::UndefinedVariable(global_name(&name));
                            return self.runtime_error(chunk, ip, stderr, &fault);
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let idx = chunk.code()[ip];
                    ip += 1;
                    let name = chunk.constant(idx).as_object().clone();
                    let value = stack.pop().expect("initializer value always precedes DefineGlobal");
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let idx = chunk.code()[ip];
                    ip += 1;
                    let name = chunk.constant(idx).as_object().clone();
                    if self.globals.get(&name).is_none() {
                        let fault = RuntimeFault::UndefinedVariable(global_name(&name));
                        return self.runtime_error(chunk, ip, stderr, &fault);
                    }
                    let value = stack.last().expect("assignment always has a value on top").clone();
                    self.globals.set(name, value);
                }
                OpCode::Equal => {
                    let b = stack.pop().expect("stack discipline guarantees an operand");
                    let a = stack.pop().expect("stack discipline guarantees an operand");
                    push!(Value::Bool(values_equal(&a, &b)));
                }
                OpCode::Greater => binary_numeric!(Value::Bool, >),
                OpCode::Less => binary_numeric!(Value::Bool, <),
                OpCode::Add => {
                    let b = stack.pop().expect("stack discipline guarantees an operand");
                    let a = stack.pop().expect("stack discipline guarantees an operand");
                    if a.is_number() && b.is_number() {
                        push!(Value::Number(a.as_number() + b.as_number()));
                    } else if a.is_string() && b.is_string() {
                        let concatenated = concat_strings(a.as_object(), b.as_object());
                        let obj = self.heap.take_string(concatenated);
                        push!(Value::Object(obj));
                    } else {
                        return self.runtime_error(chunk, ip, stderr, &RuntimeFault::AddTypeMismatch);
                    }
                }
                OpCode::Subtract => binary_numeric!(Value::Number, -),
                OpCode::Multiply => binary_numeric!(Value::Number, *),
                OpCode::Divide => binary_numeric!(Value::Number, /),
                OpCode::Not => {
                    let value = stack.pop().expect("stack discipline guarantees an operand");
                    push!(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    let top = stack.last().expect("stack discipline guarantees an operand");
                    if !top.is_number() {
                        return self.runtime_error(chunk, ip, stderr, &RuntimeFault::OperandMustBeNumber);
                    }
                    let negated = -top.as_number();
                    *stack.last_mut().expect("checked above") = Value::Number(negated);
                }
                OpCode::Print => {
                    let value = stack.pop().expect("stack discipline guarantees an operand");
                    let _ = value.print(stdout);
                    let _ = writeln!(stdout);
                }
                OpCode::Jump => {
                    let offset = read_u16(chunk, ip);
                    ip += 2 + offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_u16(chunk, ip);
                    ip += 2;
                    if stack.last().expect("condition value present").is_falsey() {
                        ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = read_u16(chunk, ip);
                    ip += 2;
                    ip -= offset as usize;
                }
                OpCode::Return => return InterpretResult::Ok,
            }
        }
    }

    fn runtime_error(
        &self,
        chunk: &Chunk,
        ip: usize,
        stderr: &mut impl Write,
        fault: &RuntimeFault,
    ) -> InterpretResult {
        let line = chunk.line(ip.saturating_sub(1));
        tracing::error!(%fault, line, "runtime error");
        let _ = writeln!(stderr, "{fault}");
        let _ = writeln!(stderr, "[line {line}] in script");
        InterpretResult::RuntimeError
    }
}

fn read_u16(chunk: &Chunk, offset: usize) -> u16 {
    u16::from_be_bytes([chunk.code()[offset], chunk.code()[offset + 1]])
}

fn global_name(obj: &Rc<Obj>) -> String {
    obj.as_string().map(|s| s.as_str().to_string()).unwrap_or_default()
}

fn concat_strings(a: &Rc<Obj>, b: &Rc<Obj>) -> Box<str> {
    let a = a.as_string().expect("caller checked is_string").as_str();
    let b = b.as_string().expect("caller checked is_string").as_str();
    let mut out = String::with_capacity(a.len() + b.len());
    out.push_str(a);
    out.push_str(b);
    out.into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (InterpretResult, String, String) {
        let mut vm = Vm::new();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = vm.interpret(source, &mut out, &mut err);
        (result, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn prints_arithmetic_result() {
        let (result, stdout, _) = run("print 1 + 2 * 3;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "7\n");
    }

    #[test]
    fn string_concatenation() {
        let (result, stdout, _) = run(r#"print "foo" + "bar";"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "foobar\n");
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        let (result, _, stderr) = run(r#"print 1 + "x";"#);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(stderr.contains("Operands must be two numbers or two strings."));
    }

    #[test]
    fn globals_persist_and_can_be_reassigned() {
        let (result, stdout, _) = run("var a = 1; a = a + 1; print a;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "2\n");
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let (result, _, stderr) = run("print missing;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(stderr.contains("Undefined variable 'missing'."));
    }

    #[test]
    fn locals_shadow_correctly_across_scopes() {
        let (result, stdout, _) = run("var a = 1; { var a = 2; print a; } print a;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "2\n1\n");
    }

    #[test]
    fn while_loop_accumulates() {
        let (result, stdout, _) = run("var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } print sum;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "10\n");
    }

    #[test]
    fn for_loop_counts_up() {
        let (result, stdout, _) = run("for (var i = 0; i < 3; i = i + 1) { print i; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "0\n1\n2\n");
    }

    #[test]
    fn and_or_short_circuit_without_evaluating_the_right_operand() {
        // If short-circuiting didn't skip the right operand, reading
        // `undefined` would raise a runtime error instead of printing.
        let (result, stdout, _) = run("print false and undefined; print true or undefined;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(stdout, "false\ntrue\n");
    }

    #[test]
    fn compile_error_does_not_run() {
        let (result, stdout, _) = run("print 1 +;");
        assert_eq!(result, InterpretResult::CompileError);
        assert_eq!(stdout, "");
    }

    #[test]
    fn negating_a_non_number_is_a_runtime_error() {
        let (result, _, stderr) = run(r#"print -"x";"#);
        assert_eq!(result, InterpretResult::RuntimeError);
        assert!(stderr.contains("Operand must be a number."));
    }
}
