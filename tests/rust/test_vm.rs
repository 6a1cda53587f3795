//! VM tests: compiler output, bytecode loading, execution, adapter seam

use std::cell::RefCell;
use std::rc::Rc;

use aos_lang::ast::Node;
use aos_lang::capability::host::{HostResult, SyscallHost};
use aos_lang::format::format;
use aos_lang::parser::parse;
use aos_lang::runtime::{evaluate_program, Runtime, RuntimeError, Value};
use aos_lang::vm::{
    compile, run_bytecode, ExecutionAdapter, RuntimeAdapter, Vm, VmProgram, VmStep,
};

#[derive(Default, Clone)]
struct RecordingHost {
    lines: Rc<RefCell<Vec<String>>>,
}

impl SyscallHost for RecordingHost {
    fn write_line(&mut self, text: &str) -> HostResult<()> {
        self.lines.borrow_mut().push(text.to_string());
        Ok(())
    }
}

fn node(source: &str) -> Node {
    parse(source).into_clean_root().expect("test source should parse")
}

fn runtime() -> Runtime {
    Runtime::with_host(Box::new(RecordingHost::default()))
}

/// Wrap `Func` nodes in a valid version-1 container.
fn container(funcs: &str) -> Node {
    node(&format!(
        r#"Bytecode#bc(flags=0 format="AiBC1" magic="AIBC" version=1) {{ {} }}"#,
        funcs
    ))
}

fn exec_with(rt: &mut Runtime, bytecode: &Node, entry: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let program = VmProgram::load(bytecode)?;
    let mut adapter = RuntimeAdapter::new(rt);
    Vm::new(&program).run(entry, args, &mut adapter)
}

fn exec(bytecode: &Node) -> Result<Value, RuntimeError> {
    exec_with(&mut runtime(), bytecode, "main", Vec::new())
}

fn exec_code(bytecode: &Node) -> String {
    match exec(bytecode) {
        Ok(value) => panic!("expected VM error, got {:?}", value),
        Err(err) => err.code().to_string(),
    }
}

fn compile_and_run(source: &str) -> Value {
    let bytecode = compile(&node(source)).expect("program should compile");
    exec(&bytecode).expect("program should run")
}

fn compile_error(source: &str) -> String {
    compile(&node(source)).expect_err("compile should fail").message
}

fn load_error(source: &str) -> String {
    match VmProgram::load(&node(source)) {
        Ok(_) => panic!("expected load failure"),
        Err(err) => {
            assert_eq!(err.code(), "VM001");
            err.to_string()
        }
    }
}

const RECURSIVE_COUNT: &str = r#"Program#p {
    Let#l(name=count) { Fn#f(params=n) { Block#body {
        If#i {
            Eq#e { Var#n1(name=n) Lit#five(value=5) }
            Block#t { Return#r1 { Var#n2(name=n) } }
            Block#el { Return#r2 { Call#rec(target=count) { Add#inc { Var#n3(name=n) Lit#one(value=1) } } } }
        }
    } } }
    Call#c(target=count) { Lit#zero(value=0) }
}"#;

// ── Compile and run ─────────────────────────────────────────

#[test]
fn arithmetic() {
    assert_eq!(compile_and_run("Program#p { Add#s { Lit#a(value=2) Lit#b(value=3) } }"), Value::Int(5));
}

#[test]
fn empty_program_is_void() {
    assert_eq!(compile_and_run("Program#p"), Value::Void);
}

#[test]
fn top_level_let_becomes_main_local() {
    let source = "Program#p { Let#l(name=x) { Lit#a(value=5) } Var#v(name=x) }";
    assert_eq!(compile_and_run(source), Value::Int(5));
}

#[test]
fn user_function_call() {
    let source = r#"Program#p {
        Let#l(name=sum) { Fn#f(params=a,b) { Block#b1 { Return#r { Add#s { Var#va(name=a) Var#vb(name=b) } } } } }
        Call#c(target=sum) { Lit#x(value=2) Lit#y(value=3) }
    }"#;
    assert_eq!(compile_and_run(source), Value::Int(5));
}

#[test]
fn calls_may_precede_definitions() {
    let source = r#"Program#p {
        Call#c(target=seven)
        Let#l(name=seven) { Fn#f(params="") { Block#b { Lit#a(value=7) } } }
    }"#;
    assert_eq!(compile_and_run(source), Value::Int(7));
}

#[test]
fn recursion() {
    assert_eq!(compile_and_run(RECURSIVE_COUNT), Value::Int(5));
}

#[test]
fn if_without_else_pushes_void() {
    assert_eq!(compile_and_run("Program#p { If#i { Lit#c(value=false) Lit#t(value=1) } }"), Value::Void);
}

#[test]
fn strings_go_through_constant_pool() {
    let source = r#"Program#p { StrConcat#s { Lit#a(value="ab") Lit#b(value="ab") } }"#;
    let bytecode = compile(&node(source)).unwrap();
    let consts: Vec<_> = bytecode.children.iter().filter(|c| c.kind == "Const").collect();
    assert_eq!(consts.len(), 1);
    assert_eq!(exec(&bytecode).unwrap(), Value::str("abab"));
}

#[test]
fn err_value_short_circuits() {
    let source = r#"Program#p {
        MakeErr#m { Lit#a(value="e1") Lit#b(value="E300") Lit#c(value="stop") Lit#d(value="n") }
        Lit#after(value=1)
    }"#;
    let value = compile_and_run(source);
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("E300"));
}

#[test]
fn err_returned_from_function_short_circuits_caller() {
    let source = r#"Program#p {
        Let#l(name=fail) { Fn#f(params="") { Block#b {
            MakeErr#m { Lit#a(value="e1") Lit#b2(value="E301") Lit#c(value="inner") Lit#d(value="f") }
        } } }
        Call#c1(target=fail)
        Lit#z(value=99)
    }"#;
    assert!(compile_and_run(source).is_err());
}

// ── Interpreter parity ──────────────────────────────────────

#[test]
fn vm_matches_interpreter() {
    let programs = [
        "Program#p { Add#s { Lit#a(value=40) Lit#b(value=2) } }",
        r#"Program#p { If#i { Eq#e { Lit#a(value="x") Lit#b(value="x") } Lit#t(value="same") Lit#f(value="diff") } }"#,
        r#"Program#p { Let#l(name=s) { StrEscape#e { Lit#a(value="q\"") } } Var#v(name=s) }"#,
        r#"Program#p { ChildCount#c { AppendChild#ap { MakeBlock#b { Lit#a(value="x") } MakeLitString#m { Lit#i(value="y") Lit#v(value="z") } } } }"#,
        "Program#p { Call#c(target=math.add) { Lit#a(value=1) Lit#b(value=2) } }",
        RECURSIVE_COUNT,
    ];
    for source in programs {
        let program = node(source);
        let interpreted = evaluate_program(&program, &mut runtime()).unwrap();
        let bytecode = compile(&program).unwrap();
        let compiled = exec(&bytecode).unwrap();
        assert_eq!(interpreted, compiled, "mismatch for {}", source);
    }
}

// ── Container format ────────────────────────────────────────

#[test]
fn emitted_container_header() {
    let bytecode = compile(&node("Program#p { Lit#a(value=1) }")).unwrap();
    let text = format(&bytecode);
    assert!(text.starts_with(r#"Bytecode#bc(flags=0 format="AiBC1" magic="AIBC" version=1) { Func#f0("#));
    assert!(text.contains("op=PUSH_INT"));
}

#[test]
fn emitted_text_reloads() {
    let bytecode = compile(&node(RECURSIVE_COUNT)).unwrap();
    let reparsed = node(&format(&bytecode));
    assert_eq!(exec(&reparsed).unwrap(), Value::Int(5));
}

#[test]
fn main_is_first_function() {
    let program = VmProgram::load(&compile(&node(RECURSIVE_COUNT)).unwrap()).unwrap();
    let names: Vec<_> = program.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["main", "count"]);
    assert_eq!(program.function("count").unwrap().params, vec!["n".to_string()]);
}

#[test]
fn rejects_non_bytecode_root() {
    assert_eq!(load_error("Program#p"), "Expected Bytecode node.");
}

#[test]
fn rejects_version_two() {
    let message = load_error(r#"Bytecode#bc(flags=0 format="AiBC1" magic="AIBC" version=2)"#);
    assert_eq!(message, "Unsupported bytecode version.");
}

#[test]
fn rejects_bad_magic_and_format() {
    assert_eq!(
        load_error(r#"Bytecode#bc(flags=0 format="AiBC1" magic="NOPE" version=1)"#),
        "Unsupported bytecode magic."
    );
    assert_eq!(
        load_error(r#"Bytecode#bc(flags=0 format="AiBC2" magic="AIBC" version=1)"#),
        "Unsupported bytecode format."
    );
}

#[test]
fn rejects_missing_flags() {
    assert_eq!(
        load_error(r#"Bytecode#bc(format="AiBC1" magic="AIBC" version=1)"#),
        "Invalid bytecode flags."
    );
}

#[test]
fn rejects_unknown_section() {
    let bytecode = container("Data#d");
    let err = VmProgram::load(&bytecode).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported Bytecode section.");
    assert_eq!(err.node_id(), "d");
}

#[test]
fn rejects_bad_constants() {
    let err = VmProgram::load(&container(r#"Const#c0(kind=float value="1.5")"#)).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported constant kind.");
    let err = VmProgram::load(&container(r#"Const#c0(kind=node value="Block b")"#)).unwrap_err();
    assert_eq!(err.to_string(), "Invalid node constant.");
    let err = VmProgram::load(&container(r#"Const#c0(kind="string" value="x")"#)).unwrap_err();
    assert_eq!(err.to_string(), "Invalid Const node.");
}

#[test]
fn rejects_malformed_functions() {
    let err = VmProgram::load(&container("Func#f0")).unwrap_err();
    assert_eq!(err.to_string(), "Func missing name.");
    let err = VmProgram::load(&container("Func#f0(name=main) { Lit#x(value=1) }")).unwrap_err();
    assert_eq!(err.to_string(), "Func contains non-instruction child.");
    let err = VmProgram::load(&container("Func#f0(name=main) { Inst#i0(a=1) }")).unwrap_err();
    assert_eq!(err.to_string(), "Instruction missing op.");
}

#[test]
fn node_and_null_constants() {
    let bytecode = container(
        r#"Const#c0(kind=node value="Block#inner { Lit#x(value=1) }") Const#c1(kind=null)
        Func#f0(name=main) { Inst#i0(op=CONST a=0) Inst#i1(op=CHILD_COUNT) Inst#i2(op=CONST a=1) Inst#i3(op=POP) Inst#i4(op=RETURN) }"#,
    );
    assert_eq!(exec(&bytecode).unwrap(), Value::Int(1));
}

// ── Execution semantics ─────────────────────────────────────

#[test]
fn falling_off_the_end_returns_void() {
    let bytecode = container("Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) }");
    assert_eq!(exec(&bytecode).unwrap(), Value::Void);
}

#[test]
fn halt_returns_top_of_stack() {
    let bytecode = container(
        "Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) Inst#i1(op=PUSH_INT a=2) Inst#i2(op=HALT) Inst#i3(op=PUSH_INT a=3) }",
    );
    assert_eq!(exec(&bytecode).unwrap(), Value::Int(2));
}

#[test]
fn entry_with_arguments() {
    let bytecode = container(
        r#"Func#f0(name=inc params="n") { Inst#i0(op=LOAD_LOCAL a=0) Inst#i1(op=PUSH_INT a=1) Inst#i2(op=ADD) Inst#i3(op=RETURN) }"#,
    );
    let value = exec_with(&mut runtime(), &bytecode, "inc", vec![Value::Int(41)]).unwrap();
    assert_eq!(value, Value::Int(42));
}

#[test]
fn call_with_wrong_argc_pushes_unknown() {
    let bytecode = container(
        r#"Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) Inst#i1(op=PUSH_INT a=2) Inst#i2(op=CALL a=2 s="one") Inst#i3(op=RETURN) }
        Func#f1(name=one params="x") { Inst#j0(op=LOAD_LOCAL a=0) Inst#j1(op=RETURN) }"#,
    );
    assert_eq!(exec(&bytecode).unwrap(), Value::Unknown);
}

#[test]
fn dup_and_jump_if_err_peek() {
    let bytecode = container(
        r#"Const#c0(kind=string value="x")
        Func#f0(name=main) { Inst#i0(op=CONST a=0) Inst#i1(op=JUMP_IF_ERR a=4) Inst#i2(op=DUP) Inst#i3(op=STR_CONCAT) Inst#i4(op=RETURN) }"#,
    );
    assert_eq!(exec(&bytecode).unwrap(), Value::str("xx"));
}

#[test]
fn unknown_opcode_fails_only_when_reached() {
    let reached = container("Func#f0(name=main) { Inst#i0(op=FROB) }");
    assert_eq!(exec_code(&reached), "AIVM001");
    let unreached = container("Func#f0(name=main) { Inst#i0(op=PUSH_INT a=3) Inst#i1(op=RETURN) Inst#i2(op=FROB) }");
    assert_eq!(exec(&unreached).unwrap(), Value::Int(3));
}

#[test]
fn stack_underflow() {
    assert_eq!(exec_code(&container("Func#f0(name=main) { Inst#i0(op=POP) }")), "AIVM003");
    assert_eq!(exec_code(&container("Func#f0(name=main) { Inst#i0(op=ADD) }")), "AIVM003");
}

#[test]
fn callee_cannot_pop_caller_stack() {
    let bytecode = container(
        r#"Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) Inst#i1(op=CALL a=0 s="greedy") Inst#i2(op=RETURN) }
        Func#f1(name=greedy) { Inst#j0(op=POP) Inst#j1(op=RETURN) }"#,
    );
    assert_eq!(exec_code(&bytecode), "AIVM003");
}

#[test]
fn stack_overflow() {
    let bytecode = container("Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) Inst#i1(op=JUMP a=0) }");
    assert_eq!(exec_code(&bytecode), "AIVM002");
}

#[test]
fn frame_overflow() {
    let bytecode = container(
        r#"Func#f0(name=main) { Inst#i0(op=CALL a=0 s="loop") Inst#i1(op=RETURN) }
        Func#f1(name=loop) { Inst#j0(op=CALL a=0 s="loop") Inst#j1(op=RETURN) }"#,
    );
    assert_eq!(exec_code(&bytecode), "AIVM004");
}

#[test]
fn local_out_of_range() {
    assert_eq!(exec_code(&container("Func#f0(name=main) { Inst#i0(op=LOAD_LOCAL a=3) }")), "AIVM006");
}

#[test]
fn jump_if_false_needs_bool() {
    let bytecode = container("Func#f0(name=main) { Inst#i0(op=PUSH_INT a=1) Inst#i1(op=JUMP_IF_FALSE a=0) }");
    assert_eq!(exec_code(&bytecode), "AIVM007");
}

#[test]
fn invalid_program_errors() {
    assert_eq!(exec_code(&container("Func#f0(name=main) { Inst#i0(op=JUMP a=9) }")), "AIVM008");
    assert_eq!(exec_code(&container("Func#f0(name=main) { Inst#i0(op=CONST a=0) }")), "AIVM008");
    assert_eq!(exec_code(&container(r#"Func#f0(name=main) { Inst#i0(op=CALL a=0 s="ghost") }"#)), "AIVM008");
    assert_eq!(exec_code(&container("Func#f0(name=other)")), "AIVM008");
}

#[test]
fn entry_arity_mismatch() {
    let bytecode = container(r#"Func#f0(name=main params="a")"#);
    let err = exec_with(&mut runtime(), &bytecode, "main", Vec::new()).unwrap_err();
    assert_eq!(err.code(), "AIVM008");
}

// ── Capabilities ────────────────────────────────────────────

#[test]
fn call_sys_respects_permissions() {
    let host = RecordingHost::default();
    let lines = Rc::clone(&host.lines);
    let mut rt = Runtime::with_host(Box::new(host));
    let bytecode = compile(&node(r#"Program#p { Call#c(target=console.print) { Lit#a(value="hi") } }"#)).unwrap();

    assert_eq!(exec_with(&mut rt, &bytecode, "main", Vec::new()).unwrap(), Value::Unknown);
    assert!(lines.borrow().is_empty());

    rt.grant("console");
    assert_eq!(exec_with(&mut rt, &bytecode, "main", Vec::new()).unwrap(), Value::Void);
    assert_eq!(*lines.borrow(), vec!["hi".to_string()]);
}

struct CountingAdapter {
    targets: Vec<String>,
    steps: Vec<String>,
}

impl ExecutionAdapter for CountingAdapter {
    fn call_capability(&mut self, target: &str, _args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.targets.push(target.to_string());
        Ok(Value::Int(7))
    }

    fn wants_steps(&self) -> bool {
        true
    }

    fn on_step(&mut self, step: &VmStep<'_>) {
        self.steps.push(format!("{}:{}:{}", step.function, step.pc, step.op));
    }
}

#[test]
fn custom_adapter_sees_syscalls_and_steps() {
    let bytecode = compile(&node("Program#p { Call#c(target=math.add) { Lit#a(value=1) Lit#b(value=2) } }")).unwrap();
    let program = VmProgram::load(&bytecode).unwrap();
    let mut adapter = CountingAdapter {
        targets: Vec::new(),
        steps: Vec::new(),
    };
    let value = Vm::new(&program).run("main", Vec::new(), &mut adapter).unwrap();
    assert_eq!(value, Value::Int(7));
    assert_eq!(adapter.targets, vec!["math.add".to_string()]);
    assert_eq!(
        adapter.steps,
        vec!["main:0:PUSH_INT", "main:1:PUSH_INT", "main:2:CALL_SYS", "main:3:RETURN"]
    );
}

#[test]
fn run_bytecode_converts_lit_arguments() {
    let bytecode = container(
        r#"Func#f0(name=greet params="a,b") { Inst#i0(op=LOAD_LOCAL a=0) Inst#i1(op=LOAD_LOCAL a=1) Inst#i2(op=STR_CONCAT) Inst#i3(op=RETURN) }"#,
    );
    let args = node(r#"Block#args { Lit#a(value="he") Lit#b(value="llo") }"#);
    let value = run_bytecode(&bytecode, "greet", &args, &mut runtime()).unwrap();
    assert_eq!(value, Value::str("hello"));
}

#[test]
fn vm_run_from_a_program() {
    let mut rt = runtime();
    rt.grant("compiler");
    rt.grant("sys");
    let source = r#"Program#p {
        Let#l(name=bc) { Call#e(target=compiler.emitBytecode) {
            Call#c(target=compiler.parse) { Lit#src(value="Program#q { Add#s { Lit#a(value=20) Lit#b(value=22) } }") }
        } }
        Call#run(target=sys.vm_run) { Var#v(name=bc) Lit#entry(value="main") MakeBlock#args { Lit#id(value="args") } }
    }"#;
    assert_eq!(evaluate_program(&node(source), &mut rt).unwrap(), Value::Int(42));
}

#[test]
fn vm_run_failure_is_err_value() {
    let mut rt = runtime();
    rt.grant("compiler");
    rt.grant("sys");
    let source = r#"Program#p {
        Let#l(name=bc) { Call#e(target=compiler.emitBytecode) {
            Call#c(target=compiler.parse) { Lit#src(value="Program#q { Lit#a(value=1) }") }
        } }
        Call#run(target=sys.vm_run) { Var#v(name=bc) Lit#entry(value="nope") MakeBlock#args { Lit#id(value="args") } }
    }"#;
    let value = evaluate_program(&node(source), &mut rt).unwrap();
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("AIVM008"));
}

// ── Compile errors ──────────────────────────────────────────

#[test]
fn compile_requires_program() {
    assert_eq!(compile_error("Block#b"), "Expected Program node.");
}

#[test]
fn main_is_reserved() {
    let source = r#"Program#p { Let#l(name=main) { Fn#f(params="") { Block#b } } }"#;
    assert_eq!(compile_error(source), "'main' is reserved for top-level statements.");
}

#[test]
fn unbound_variable() {
    assert_eq!(compile_error("Program#p { Var#v(name=y) }"), "Unbound variable 'y'.");
}

#[test]
fn functions_do_not_see_main_locals() {
    let source = r#"Program#p {
        Let#l1(name=x) { Lit#a(value=1) }
        Let#l2(name=f) { Fn#fn(params="") { Block#b { Var#v(name=x) } } }
    }"#;
    assert_eq!(compile_error(source), "Unbound variable 'x'.");
}

#[test]
fn function_is_not_a_value() {
    let source = r#"Program#p { Let#l(name=f) { Fn#fn(params="") { Block#b } } Var#v(name=f) }"#;
    assert_eq!(compile_error(source), "Function 'f' cannot be used as a value.");
}

#[test]
fn unknown_call_target() {
    assert_eq!(compile_error("Program#p { Call#c(target=ghost) }"), "Unknown call target 'ghost'.");
}

#[test]
fn unsupported_forms() {
    assert!(compile_error(r#"Program#p { Import#i(path="x.aos") }"#).contains("Import"));
    assert!(compile_error(r#"Program#p { Let#l(name=g) { Lit#a(value=1) } Fn#f(params="") { Block#b } }"#)
        .contains("Nested Fn"));
    assert_eq!(compile_error("Program#p { Add#a { Lit#x(value=1) } }"), "Add expects 2 operands.");
}

#[test]
fn compile_error_carries_node_id() {
    let err = compile(&node("Program#p { Var#missing(name=y) }")).unwrap_err();
    let rendered = err.to_err_node();
    assert_eq!(rendered.ident_attr("code"), Some("VMC001"));
    assert_eq!(rendered.text_attr("nodeId"), Some("missing"));
}
