//! Runtime tests: interpreter evaluation, closures, capabilities, modules

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use aos_lang::ast::Node;
use aos_lang::capability::host::{HostResult, SyscallHost};
use aos_lang::format::format;
use aos_lang::parser::parse;
use aos_lang::runtime::{
    evaluate_program, Runtime, RuntimeConfig, RuntimeError, Value, DEFAULT_MAX_DEPTH,
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

/// Host that backs nothing; every effect is unsupported.
struct BareHost;

impl SyscallHost for BareHost {}

fn program(source: &str) -> Node {
    parse(source).into_clean_root().expect("test program should parse")
}

fn runtime() -> Runtime {
    Runtime::with_host(Box::new(RecordingHost::default()))
}

fn run_with(rt: &mut Runtime, source: &str) -> Result<Value, RuntimeError> {
    evaluate_program(&program(source), rt)
}

fn run(source: &str) -> Value {
    run_with(&mut runtime(), source).expect("evaluation should not fail")
}

fn run_err(rt: &mut Runtime, source: &str) -> String {
    match run_with(rt, source) {
        Ok(value) => panic!("expected fatal error, got {:?}", value),
        Err(err) => err.code().to_string(),
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("aos_runtime_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ── Bindings and literals ───────────────────────────────────

#[test]
fn let_then_var() {
    let value = run("Program#p { Let#l(name=x) { Lit#a(value=5) } Var#v(name=x) }");
    assert_eq!(value, Value::Int(5));
}

#[test]
fn let_evaluates_to_void() {
    assert_eq!(run("Program#p { Let#l(name=x) { Lit#a(value=1) } }"), Value::Void);
}

#[test]
fn empty_program_is_void() {
    assert_eq!(run("Program#p"), Value::Void);
}

#[test]
fn unbound_var_is_unknown() {
    assert_eq!(run("Program#p { Var#v(name=nope) }"), Value::Unknown);
}

#[test]
fn literal_kinds() {
    assert_eq!(run(r#"Program#p { Lit#a(value="hi") }"#), Value::str("hi"));
    assert_eq!(run("Program#p { Lit#a(value=true) }"), Value::Bool(true));
    assert_eq!(run("Program#p { Lit#a(value=-7) }"), Value::Int(-7));
}

#[test]
fn unknown_node_kind_is_unknown() {
    assert_eq!(run("Program#p { Mystery#m }"), Value::Unknown);
}

// ── Operators ───────────────────────────────────────────────

#[test]
fn add_and_eq() {
    assert_eq!(run("Program#p { Add#s { Lit#a(value=2) Lit#b(value=3) } }"), Value::Int(5));
    assert_eq!(
        run("Program#p { Eq#e { Lit#a(value=2) Lit#b(value=2) } }"),
        Value::Bool(true)
    );
}

#[test]
fn add_wraps() {
    let value = run("Program#p { Add#s { Lit#a(value=2147483647) Lit#b(value=1) } }");
    assert_eq!(value, Value::Int(i32::MIN));
}

#[test]
fn operator_with_wrong_operand_kind_is_unknown() {
    assert_eq!(
        run(r#"Program#p { Add#s { Lit#a(value=1) Lit#b(value="x") } }"#),
        Value::Unknown
    );
}

#[test]
fn string_helpers() {
    let value = run(
        r#"Program#p { StrConcat#c { Lit#a(value="n=") ToString#t { Lit#b(value=4) } } }"#,
    );
    assert_eq!(value, Value::str("n=4"));
}

// ── Control flow ────────────────────────────────────────────

#[test]
fn if_selects_branch() {
    let source = r#"Program#p { If#i { Lit#c(value=false) Lit#t(value="yes") Lit#e(value="no") } }"#;
    assert_eq!(run(source), Value::str("no"));
}

#[test]
fn if_without_else_is_void_when_false() {
    assert_eq!(run("Program#p { If#i { Lit#c(value=false) Lit#t(value=1) } }"), Value::Void);
}

#[test]
fn if_with_non_bool_condition_is_unknown() {
    assert_eq!(run("Program#p { If#i { Lit#c(value=1) Lit#t(value=1) } }"), Value::Unknown);
}

#[test]
fn top_level_return_ends_program() {
    assert_eq!(run("Program#p { Return#r { Lit#a(value=7) } Lit#b(value=8) }"), Value::Int(7));
}

#[test]
fn err_value_short_circuits_sequence() {
    let rt_host = RecordingHost::default();
    let lines = Rc::clone(&rt_host.lines);
    let mut rt = Runtime::with_host(Box::new(rt_host));
    rt.grant("console");
    let value = run_with(
        &mut rt,
        r#"Program#p {
            MakeErr#m { Lit#a(value="e1") Lit#b(value="E100") Lit#c(value="bad") Lit#d(value="n1") }
            Call#c1(target=console.print) { Lit#s(value="unreachable") }
        }"#,
    )
    .unwrap();
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("E100"));
    assert!(lines.borrow().is_empty());
}

#[test]
fn err_in_block_skips_remaining_statements() {
    let host = RecordingHost::default();
    let lines = Rc::clone(&host.lines);
    let mut rt = Runtime::with_host(Box::new(host));
    rt.grant("console");
    let value = run_with(
        &mut rt,
        r#"Program#p { Block#b {
            Let#l1(name=x) { Lit#a(value=1) }
            MakeErr#m { Lit#e1(value="e1") Lit#e2(value="E300") Lit#e3(value="stop") Lit#e4(value="m") }
            Block#rest {
                Call#c1(target=console.print) { Lit#s(value="unreachable") }
                Let#l2(name=y) { Lit#b(value=2) }
            }
        } }"#,
    )
    .unwrap();
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("E300"));
    assert_eq!(rt.env.get("x"), Some(&Value::Int(1)));
    assert!(!rt.env.contains_key("y"));
    assert!(lines.borrow().is_empty());
}

// ── Functions and closures ──────────────────────────────────

const ADD_FN: &str = r#"Let#l1(name=sum) { Fn#f(params=a,b) { Block#b1 { Return#r { Add#s { Var#va(name=a) Var#vb(name=b) } } } } }"#;

#[test]
fn call_user_function() {
    let source = format!(
        "Program#p {{ {} Call#c(target=sum) {{ Lit#x(value=2) Lit#y(value=3) }} }}",
        ADD_FN
    );
    assert_eq!(run(&source), Value::Int(5));
}

#[test]
fn arity_mismatch_is_unknown() {
    let source = format!("Program#p {{ {} Call#c(target=sum) {{ Lit#x(value=2) }} }}", ADD_FN);
    assert_eq!(run(&source), Value::Unknown);
}

#[test]
fn fn_without_params_attr_is_unknown() {
    assert_eq!(run("Program#p { Fn#f { Block#b } }"), Value::Unknown);
}

#[test]
fn function_body_without_return_yields_last_value() {
    let source = r#"Program#p {
        Let#l(name=five) { Fn#f(params="") { Block#b { Lit#a(value=5) } } }
        Call#c(target=five)
    }"#;
    assert_eq!(run(source), Value::Int(5));
}

#[test]
fn recursion_through_own_name() {
    let source = r#"Program#p {
        Let#l(name=count) { Fn#f(params=n) { Block#body {
            If#i {
                Eq#e { Var#n1(name=n) Lit#five(value=5) }
                Block#t { Return#r1 { Var#n2(name=n) } }
                Block#el { Return#r2 { Call#rec(target=count) { Add#inc { Var#n3(name=n) Lit#one(value=1) } } } }
            }
        } } }
        Call#c(target=count) { Lit#zero(value=0) }
    }"#;
    assert_eq!(run(source), Value::Int(5));
}

#[test]
fn closure_keeps_captured_binding() {
    let source = r#"Program#p {
        Let#l1(name=x) { Lit#a(value=10) }
        Let#l2(name=g) { Fn#f(params=y) { Block#b { Return#r { Add#s { Var#vx(name=x) Var#vy(name=y) } } } } }
        Let#l3(name=x) { Lit#c(value=1) }
        Call#call(target=g) { Lit#d(value=5) }
    }"#;
    assert_eq!(run(source), Value::Int(15));
}

#[test]
fn function_locals_do_not_leak_into_globals() {
    let mut rt = runtime();
    let source = r#"Program#p {
        Let#l(name=f) { Fn#f1(params="") { Block#b { Let#inner(name=y) { Lit#a(value=1) } Var#v(name=y) } } }
        Call#c(target=f)
    }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::Int(1));
    assert!(rt.env.contains_key("f"));
    assert!(!rt.env.contains_key("y"));
}

#[test]
fn err_inside_function_propagates_to_caller_sequence() {
    let source = r#"Program#p {
        Let#l(name=fail) { Fn#f(params="") { Block#b {
            MakeErr#m { Lit#a(value="e1") Lit#b2(value="E200") Lit#c(value="inner") Lit#d(value="f") }
            Lit#after(value=1)
        } } }
        Call#c(target=fail)
        Lit#z(value=99)
    }"#;
    let value = run(source);
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("E200"));
}

// ── Fatal errors ────────────────────────────────────────────

#[test]
fn strict_mode_rejects_unknown() {
    let mut rt = runtime();
    rt.strict = true;
    assert_eq!(run_err(&mut rt, "Program#p { Var#v(name=missing) }"), "RUN003");
}

#[test]
fn depth_limit_is_fatal() {
    let mut rt = runtime();
    rt.max_depth = 3;
    let source = "Program#p { Add#a { Add#b { Lit#x(value=1) Lit#y(value=2) } Lit#z(value=3) } }";
    assert_eq!(run_err(&mut rt, source), "RUN002");
}

#[test]
fn runaway_recursion_hits_default_depth() {
    let mut rt = Runtime::from_config(RuntimeConfig::default(), Box::new(BareHost));
    assert_eq!(rt.max_depth, DEFAULT_MAX_DEPTH);
    let source = r#"Program#p {
        Let#l(name=loop) { Fn#f(params=n) { Block#b { Return#r {
            Call#c(target=loop) { Add#a { Var#v(name=n) Lit#one(value=1) } }
        } } } }
        Call#start(target=loop) { Lit#zero(value=0) }
    }"#;
    match run_with(&mut rt, source) {
        Err(e) => assert_eq!(e.code(), "RUN002"),
        Ok(value) => panic!("expected depth overflow, got {:?}", value),
    }
    // The guard unwinds cleanly; the runtime stays usable.
    assert_eq!(run_with(&mut rt, "Program#q { Lit#a(value=1) }").unwrap(), Value::Int(1));
}

#[test]
fn read_only_names_cannot_be_rebound() {
    let mut rt = runtime();
    rt.read_only.insert("pi".to_string());
    assert_eq!(run_err(&mut rt, "Program#p { Let#l(name=pi) { Lit#a(value=3) } }"), "RUN001");
}

#[test]
fn fatal_error_renders_as_err_node() {
    let mut rt = runtime();
    rt.strict = true;
    let err = run_with(&mut rt, "Program#p { Var#v(name=missing) }").unwrap_err();
    let node = err.to_err_node();
    assert_eq!(node.kind, "Err");
    assert_eq!(node.text_attr("nodeId"), Some("v"));
}

// ── Capabilities ────────────────────────────────────────────

#[test]
fn math_add_is_granted_by_default() {
    let value = run("Program#p { Call#c(target=math.add) { Lit#a(value=2) Lit#b(value=3) } }");
    assert_eq!(value, Value::Int(5));
}

#[test]
fn denied_capability_is_unknown_and_has_no_effect() {
    let host = RecordingHost::default();
    let lines = Rc::clone(&host.lines);
    let mut rt = Runtime::with_host(Box::new(host));
    let value = run_with(
        &mut rt,
        r#"Program#p { Call#c(target=console.print) { Lit#a(value="hi") } }"#,
    )
    .unwrap();
    assert_eq!(value, Value::Unknown);
    assert!(lines.borrow().is_empty());
}

#[test]
fn granted_capability_reaches_host() {
    let host = RecordingHost::default();
    let lines = Rc::clone(&host.lines);
    let mut rt = Runtime::with_host(Box::new(host));
    rt.grant("console");
    let value = run_with(
        &mut rt,
        r#"Program#p { Call#c(target=console.print) { Lit#a(value="hi") } }"#,
    )
    .unwrap();
    assert_eq!(value, Value::Void);
    assert_eq!(*lines.borrow(), vec!["hi".to_string()]);
}

#[test]
fn ill_typed_capability_args_are_unknown() {
    let value = run(r#"Program#p { Call#c(target=math.add) { Lit#a(value="2") Lit#b(value=3) } }"#);
    assert_eq!(value, Value::Unknown);
}

#[test]
fn unknown_capability_args_never_reach_host() {
    let value = run("Program#p { Call#c(target=math.add) { Var#v(name=missing) Lit#b(value=3) } }");
    assert_eq!(value, Value::Unknown);
}

#[test]
fn host_failure_is_fatal() {
    let mut rt = Runtime::with_host(Box::new(BareHost));
    rt.grant("console");
    let source = r#"Program#p { Call#c(target=console.print) { Lit#a(value="x") } }"#;
    assert_eq!(run_err(&mut rt, source), "RUN005");
}

#[test]
fn unknown_call_target_is_unknown() {
    assert_eq!(run("Program#p { Call#c(target=nowhere) }"), Value::Unknown);
}

// ── AST construction ────────────────────────────────────────

#[test]
fn build_nodes_at_runtime() {
    let source = r#"Program#p {
        Let#l1(name=blk) { MakeBlock#mb { Lit#a(value="body") } }
        Let#l2(name=blk2) { AppendChild#ac { Var#v1(name=blk) MakeLitString#ml { Lit#b(value="s1") Lit#c(value="hello") } } }
        Var#v2(name=blk2)
    }"#;
    let value = run(source);
    let node = value.as_node().expect("node value");
    assert_eq!(format(node), r#"Block#body { Lit#s1(value="hello") }"#);
}

#[test]
fn append_child_copies_parent() {
    let source = r#"Program#p {
        Let#l1(name=blk) { MakeBlock#mb { Lit#a(value="body") } }
        Let#l2(name=grown) { AppendChild#ac { Var#v1(name=blk) Var#v2(name=blk) } }
        ChildCount#cc { Var#v3(name=blk) }
    }"#;
    assert_eq!(run(source), Value::Int(0));
}

#[test]
fn inspect_parsed_node() {
    let mut rt = runtime();
    rt.grant("compiler");
    let source = r#"Program#p {
        Let#l(name=n) { Call#c(target=compiler.parse) { Lit#src(value="Lit#x(value=\"hi\")") } }
        StrConcat#sc {
            NodeKind#k { Var#v1(name=n) }
            AttrValueString#s { Var#v2(name=n) Lit#zero(value=0) }
        }
    }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::str("Lithi"));
}

#[test]
fn child_at_out_of_range_is_unknown() {
    let source = r#"Program#p { ChildAt#c { MakeBlock#mb { Lit#a(value="b") } Lit#i(value=0) } }"#;
    assert_eq!(run(source), Value::Unknown);
}

// ── Meta operations ─────────────────────────────────────────

#[test]
fn compiler_run_evaluates_in_fresh_scope() {
    let mut rt = runtime();
    rt.grant("compiler");
    let source = r#"Program#p {
        Call#run(target=compiler.run) {
            Call#c(target=compiler.parse) { Lit#src(value="Program#q { Let#l(name=z) { Lit#a(value=4) } Var#v(name=z) }") }
        }
    }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::Int(4));
    assert!(!rt.env.contains_key("z"));
}

#[test]
fn compiler_parse_failure_is_err_value() {
    let mut rt = runtime();
    rt.grant("compiler");
    let source = r#"Program#p { Call#c(target=compiler.parse) { Lit#src(value="Program p") } }"#;
    let value = run_with(&mut rt, source).unwrap();
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("PAR002"));
}

#[test]
fn compiler_format_round_trips() {
    let mut rt = runtime();
    rt.grant("compiler");
    let source = r#"Program#p {
        Call#f(target=compiler.format) {
            Call#c(target=compiler.parse) { Lit#src(value="X#x(b=1 a=2)") }
        }
    }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::str("X#x(a=2 b=1)"));
}

// ── Trace ───────────────────────────────────────────────────

#[test]
fn trace_records_each_step() {
    let mut rt = runtime();
    rt.trace = true;
    run_with(&mut rt, "Program#p { Lit#a(value=1) }").unwrap();
    let steps: Vec<_> = rt
        .trace_steps
        .iter()
        .map(|s| (s.id.clone(), s.text_attr("kind").unwrap().to_string()))
        .collect();
    assert_eq!(
        steps,
        vec![("trace0".to_string(), "Program".to_string()), ("trace1".to_string(), "Lit".to_string())]
    );
}

// ── Modules ─────────────────────────────────────────────────

const DOUBLE_MODULE: &str = r#"Program#m {
    Export#e(name=double) { Fn#f(params=x) { Block#b { Return#r { Add#a { Var#v1(name=x) Var#v2(name=x) } } } } }
}"#;

#[test]
fn import_binds_exports_under_file_stem() {
    let dir = scratch_dir("stem");
    std::fs::write(dir.join("mathx.aos"), DOUBLE_MODULE).unwrap();
    let mut rt = runtime();
    rt.base_dir = dir;
    let source = r#"Program#p { Import#i(path="mathx.aos") Call#c(target=mathx.double) { Lit#a(value=21) } }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::Int(42));
}

#[test]
fn import_alias_overrides_namespace() {
    let dir = scratch_dir("alias");
    std::fs::write(dir.join("mathx.aos"), DOUBLE_MODULE).unwrap();
    let mut rt = runtime();
    rt.base_dir = dir;
    let source = r#"Program#p { Import#i(path="mathx.aos" as="m") Call#c(target=m.double) { Lit#a(value=4) } }"#;
    assert_eq!(run_with(&mut rt, source).unwrap(), Value::Int(8));
    assert!(!rt.env.contains_key("mathx.double"));
}

#[test]
fn missing_module_is_err_value() {
    let mut rt = runtime();
    rt.base_dir = scratch_dir("missing");
    let value = run_with(&mut rt, r#"Program#p { Import#i(path="nope.aos") Lit#a(value=1) }"#).unwrap();
    assert!(value.is_err());
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("RUN010"));
}

#[test]
fn unparsable_module_is_err_value() {
    let dir = scratch_dir("broken");
    std::fs::write(dir.join("broken.aos"), "Program m").unwrap();
    let mut rt = runtime();
    rt.base_dir = dir;
    let value = run_with(&mut rt, r#"Program#p { Import#i(path="broken.aos") }"#).unwrap();
    assert_eq!(value.as_node().unwrap().ident_attr("code"), Some("RUN011"));
}

#[test]
fn import_cycle_is_fatal() {
    let dir = scratch_dir("cycle");
    std::fs::write(dir.join("a.aos"), r#"Program#a { Import#ia(path="b.aos") }"#).unwrap();
    std::fs::write(dir.join("b.aos"), r#"Program#b { Import#ib(path="a.aos") }"#).unwrap();
    let mut rt = runtime();
    rt.base_dir = dir;
    assert_eq!(run_err(&mut rt, r#"Program#p { Import#i(path="a.aos") }"#), "RUN004");
}

#[test]
fn module_top_level_lets_stay_private() {
    let dir = scratch_dir("private");
    std::fs::write(
        dir.join("lib.aos"),
        r#"Program#m { Let#l(name=secret) { Lit#a(value=1) } Export#e(name=secret) }"#,
    )
    .unwrap();
    let mut rt = runtime();
    rt.base_dir = dir;
    let value = run_with(&mut rt, r#"Program#p { Import#i(path="lib.aos") Var#v(name=lib.secret) }"#).unwrap();
    assert_eq!(value, Value::Int(1));
    assert!(!rt.env.contains_key("secret"));
}
