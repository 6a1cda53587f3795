use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use aos_lang::ast::{Diagnostic, Node};
use aos_lang::capability::host::StdHost;
use aos_lang::capability::replay::EventReplay;
use aos_lang::format::{format, format_value};
use aos_lang::lexer::tokenize;
use aos_lang::parser::parse;
use aos_lang::patch::apply_patch_document;
use aos_lang::runtime::{
    evaluate_program, Result as RunResult, Runtime, RuntimeConfig, Value, DEFAULT_MAX_DEPTH,
};
use aos_lang::verify::validate;
use aos_lang::vm::{self, VmProgram};

#[derive(ClapParser)]
#[command(name = "aos", version, about = "The AOS node-tree language runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the token stream (debug)
    Tokenize {
        /// Path to .aos file
        file: PathBuf,
    },
    /// Parse and display the tree as JSON
    Parse {
        /// Path to .aos file
        file: PathBuf,
    },
    /// Print the canonical form
    Fmt {
        /// Path to .aos file
        file: PathBuf,
        /// Rewrite the file in place
        #[arg(short, long)]
        write: bool,
    },
    /// Validate structure, types and permissions
    Check {
        /// Path to .aos file
        file: PathBuf,
        /// Permissions granted in addition to `math`
        #[arg(long = "perm")]
        perms: Vec<String>,
    },
    /// Evaluate a program with the tree-walking interpreter
    Run {
        /// Path to .aos file
        file: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
        /// Skip validation before running
        #[arg(long)]
        no_validate: bool,
        /// Arguments exposed through `sys.process_argv`
        #[arg(last = true)]
        argv: Vec<String>,
    },
    /// Compile a program to a Bytecode node
    Emit {
        /// Path to .aos file
        file: PathBuf,
    },
    /// Run a program or Bytecode node on the VM
    Vm {
        /// Path to a .aos program or bytecode file
        file: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
        /// Function to start in
        #[arg(long, default_value = "main")]
        entry: String,
    },
    /// Apply a patch document (`Patch#.. { Op#.. }`) to a program
    Patch {
        /// Path to .aos file
        file: PathBuf,
        /// Path to the patch document
        patch: PathBuf,
        /// Rewrite the file in place
        #[arg(short, long)]
        write: bool,
    },
}

#[derive(Args, Clone)]
struct RunOpts {
    /// Permissions granted in addition to `math`
    #[arg(long = "perm")]
    perms: Vec<String>,
    /// Treat any Unknown result as fatal
    #[arg(long)]
    strict: bool,
    /// Collect evaluation steps
    #[arg(long)]
    trace: bool,
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
    /// Record a debug run with a run id derived from this seed
    #[arg(long)]
    debug_seed: Option<String>,
    /// Where to write the debug artifact as JSON (stdout when omitted)
    #[arg(long)]
    debug_out: Option<PathBuf>,
    /// JSON fixture of UI events served to `sys.ui_pollEvent`
    #[arg(long)]
    events: Option<PathBuf>,
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("AOS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Tokenize { file } => cmd_tokenize(&file),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Fmt { file, write } => cmd_fmt(&file, write),
        Commands::Check { file, perms } => cmd_check(&file, &perms),
        Commands::Run {
            file,
            opts,
            no_validate,
            argv,
        } => cmd_run(&file, &opts, no_validate, argv),
        Commands::Emit { file } => cmd_emit(&file),
        Commands::Vm { file, opts, entry } => cmd_vm(&file, &opts, &entry),
        Commands::Patch { file, patch, write } => cmd_patch(&file, &patch, write),
    };
    process::exit(exit_code);
}

fn read_source(path: &Path) -> Result<String, i32> {
    let filename = path.to_string_lossy();
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_SOURCE_SIZE => {
            eprintln!(
                "Error: file {} is too large ({} bytes, max {} bytes)",
                filename,
                meta.len(),
                MAX_SOURCE_SIZE
            );
            return Err(1);
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    }
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: cannot read file {}: {}", filename, e);
        1
    })
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for (i, diagnostic) in diagnostics.iter().enumerate() {
        println!("{}", format(&diagnostic.to_err_node(&format!("diag{}", i))));
    }
}

fn parse_path(path: &Path) -> Result<Node, i32> {
    let source = read_source(path)?;
    parse(&source).into_clean_root().map_err(|diagnostics| {
        print_diagnostics(&diagnostics);
        1
    })
}

fn write_back(path: &Path, text: &str) -> i32 {
    match std::fs::write(path, format!("{}\n", text)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: cannot write file {}: {}", path.display(), e);
            1
        }
    }
}

fn cmd_tokenize(path: &Path) -> i32 {
    let source = match read_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (tokens, diagnostics) = tokenize(&source);
    for tok in &tokens {
        println!("{}", tok);
    }
    print_diagnostics(&diagnostics);
    if diagnostics.is_empty() {
        0
    } else {
        1
    }
}

fn cmd_parse(path: &Path) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    match serde_json::to_string_pretty(&root) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_fmt(path: &Path, write: bool) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let text = format(&root);
    if write {
        return write_back(path, &text);
    }
    println!("{}", text);
    0
}

fn cmd_check(path: &Path, perms: &[String]) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let config = RuntimeConfig::default().with_permissions(perms.iter().cloned());
    let diagnostics = validate(&root, None, &config.permissions, true);
    if diagnostics.is_empty() {
        println!("{}: OK", path.display());
        0
    } else {
        print_diagnostics(&diagnostics);
        1
    }
}

fn build_runtime(path: &Path, opts: &RunOpts, argv: Vec<String>) -> Result<Runtime, i32> {
    let config = RuntimeConfig {
        strict: opts.strict,
        trace: opts.trace,
        max_depth: opts.max_depth,
        base_dir: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        debug_seed: opts.debug_seed.clone(),
        ..RuntimeConfig::default()
    }
    .with_permissions(opts.perms.iter().cloned());

    let mut runtime = Runtime::from_config(config, Box::new(StdHost::with_argv(argv)));
    if let Some(events) = &opts.events {
        match EventReplay::from_file(events) {
            Ok(replay) => runtime.replay = Some(replay),
            Err(e) => {
                eprintln!("Error: cannot load events {}: {}", events.display(), e);
                return Err(1);
            }
        }
    }
    Ok(runtime)
}

/// Print the result, then any trace and debug artifact.
fn finish_run(runtime: &mut Runtime, opts: &RunOpts, outcome: RunResult<Value>) -> i32 {
    let code = match outcome {
        Ok(value) => {
            println!("{}", format_value(&value));
            if value.is_err() {
                1
            } else {
                0
            }
        }
        Err(e) => {
            if let Some(recorder) = runtime.recorder.as_mut() {
                recorder.record_diagnostic(e.code(), &e.to_string(), e.node_id());
            }
            println!("{}", format(&e.to_err_node()));
            2
        }
    };

    if opts.trace {
        for step in &runtime.trace_steps {
            eprintln!("{}", format(step));
        }
    }
    if let Some(recorder) = runtime.recorder.as_ref() {
        let json = match recorder.to_json() {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error: cannot serialize debug run: {}", e);
                return 2;
            }
        };
        match &opts.debug_out {
            Some(out) => {
                if let Err(e) = std::fs::write(out, json) {
                    eprintln!("Error: cannot write {}: {}", out.display(), e);
                    return 2;
                }
            }
            None => eprintln!("{}", json),
        }
    }
    code
}

fn cmd_run(path: &Path, opts: &RunOpts, no_validate: bool, argv: Vec<String>) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let mut runtime = match build_runtime(path, opts, argv) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };

    if !no_validate {
        let diagnostics = validate(&root, None, &runtime.permissions, true);
        if !diagnostics.is_empty() {
            print_diagnostics(&diagnostics);
            return 1;
        }
    }

    if let Some(recorder) = runtime.recorder.as_mut() {
        recorder.record_event("run", &path.display().to_string());
    }
    let outcome = evaluate_program(&root, &mut runtime);
    finish_run(&mut runtime, opts, outcome)
}

fn cmd_emit(path: &Path) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    match vm::compile(&root) {
        Ok(bytecode) => {
            println!("{}", format(&bytecode));
            0
        }
        Err(e) => {
            println!("{}", format(&e.to_err_node()));
            1
        }
    }
}

fn cmd_vm(path: &Path, opts: &RunOpts, entry: &str) -> i32 {
    let root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let program = if root.is_kind("Bytecode") {
        VmProgram::load(&root).map_err(|e| e.to_err_node())
    } else {
        vm::compile_program(&root).map_err(|e| e.to_err_node())
    };
    let program = match program {
        Ok(program) => program,
        Err(err) => {
            println!("{}", format(&err));
            return 1;
        }
    };

    let mut runtime = match build_runtime(path, opts, Vec::new()) {
        Ok(runtime) => runtime,
        Err(code) => return code,
    };
    if let Some(recorder) = runtime.recorder.as_mut() {
        recorder.record_event("vm", entry);
    }
    let outcome = {
        let mut adapter = vm::RuntimeAdapter::new(&mut runtime);
        vm::Vm::new(&program).run(entry, Vec::new(), &mut adapter)
    };
    finish_run(&mut runtime, opts, outcome)
}

fn cmd_patch(path: &Path, patch_path: &Path, write: bool) -> i32 {
    let mut root = match parse_path(path) {
        Ok(root) => root,
        Err(code) => return code,
    };
    let patch = match parse_path(patch_path) {
        Ok(patch) => patch,
        Err(code) => return code,
    };

    let diagnostics = apply_patch_document(&mut root, &patch);
    let text = format(&root);
    let code = if write {
        write_back(path, &text)
    } else {
        println!("{}", text);
        0
    };
    if diagnostics.is_empty() {
        code
    } else {
        for (i, diagnostic) in diagnostics.iter().enumerate() {
            eprintln!("{}", format(&diagnostic.to_err_node(&format!("diag{}", i))));
        }
        1
    }
}
