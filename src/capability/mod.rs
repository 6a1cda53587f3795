//! Capability table: the whole security boundary of the language.
//!
//! Every host-effecting call is reachable only through a target named
//! here, and only when the caller holds the entry's permission. The
//! validator checks these contracts statically; dispatch checks them again
//! against actual values.

pub mod crypto;
pub mod dispatch;
pub mod host;
pub mod replay;

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::ast::ValueKind;

/// Expected kind of one argument, with the diagnostic code for a mismatch.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub kind: ValueKind,
    pub code: &'static str,
}

/// Arity, argument kinds, return kind and required permission of a target.
#[derive(Debug)]
pub struct Contract {
    pub target: &'static str,
    pub permission: &'static str,
    pub arity_code: &'static str,
    pub args: &'static [ArgSpec],
    pub returns: ValueKind,
}

/// One contract violation: `(code, message)`.
pub type Violation = (&'static str, String);

impl Contract {
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Check argument kinds. Arity failure reports only the arity code.
    pub fn check(&self, arg_kinds: &[ValueKind]) -> Vec<Violation> {
        if arg_kinds.len() != self.args.len() {
            let noun = if self.args.len() == 1 { "argument" } else { "arguments" };
            return vec![(
                self.arity_code,
                format!("{} expects {} {}.", self.target, self.args.len(), noun),
            )];
        }
        let single = self.args.len() == 1;
        self.args
            .iter()
            .zip(arg_kinds)
            .enumerate()
            .filter(|(_, (spec, actual))| !actual.is_compatible(spec.kind))
            .map(|(i, (spec, _))| {
                let message = if single {
                    format!("{} arg must be {}.", self.target, spec.kind)
                } else {
                    format!("{} arg {} must be {}.", self.target, i + 1, spec.kind)
                };
                (spec.code, message)
            })
            .collect()
    }

    /// True when the call is meta (handled by the runtime, not the host).
    pub fn is_meta(&self) -> bool {
        self.target.starts_with("compiler.") || self.target == "sys.vm_run"
    }
}

macro_rules! contract {
    ($target:literal, $perm:literal, $arity:literal, [$(($kind:ident, $code:literal)),*], $ret:ident) => {
        Contract {
            target: $target,
            permission: $perm,
            arity_code: $arity,
            args: &[$(ArgSpec { kind: ValueKind::$kind, code: $code }),*],
            returns: ValueKind::$ret,
        }
    };
}

// ── Contract table ───────────────────────────────────────────────────────

pub static CONTRACTS: &[Contract] = &[
    contract!("math.add", "math", "VAL031", [(Int, "VAL032"), (Int, "VAL033")], Int),
    contract!("console.print", "console", "VAL034", [(String, "VAL035")], Void),
    // io
    contract!("io.print", "io", "VAL080", [(String, "VAL081")], Void),
    contract!("io.write", "io", "VAL082", [(String, "VAL083")], Void),
    contract!("io.readLine", "io", "VAL084", [], String),
    contract!("io.readAllStdin", "io", "VAL085", [], String),
    contract!("io.readFile", "io", "VAL086", [(String, "VAL087")], String),
    contract!("io.fileExists", "io", "VAL088", [(String, "VAL089")], Bool),
    contract!("io.pathExists", "io", "VAL090", [(String, "VAL091")], Bool),
    contract!("io.makeDir", "io", "VAL092", [(String, "VAL093")], Void),
    contract!("io.writeFile", "io", "VAL094", [(String, "VAL095"), (String, "VAL096")], Void),
    // compiler meta-operations
    contract!("compiler.parse", "compiler", "VAL070", [(String, "VAL071")], Node),
    contract!("compiler.format", "compiler", "VAL072", [(Node, "VAL073")], String),
    contract!("compiler.validate", "compiler", "VAL074", [(Node, "VAL075")], Node),
    contract!("compiler.emitBytecode", "compiler", "VAL076", [(Node, "VAL077")], Node),
    contract!("compiler.run", "compiler", "VAL078", [(Node, "VAL079")], Unknown),
    // sys
    contract!("sys.net_listen", "sys", "VAL123", [(Int, "VAL124")], Int),
    contract!("sys.net_listen_tls", "sys", "VAL140", [(Int, "VAL141"), (String, "VAL142"), (String, "VAL143")], Int),
    contract!("sys.net_accept", "sys", "VAL125", [(Int, "VAL126")], Int),
    contract!("sys.net_readHeaders", "sys", "VAL127", [(Int, "VAL128")], String),
    contract!("sys.net_write", "sys", "VAL129", [(Int, "VAL130"), (String, "VAL131")], Void),
    contract!("sys.net_close", "sys", "VAL132", [(Int, "VAL133")], Void),
    contract!("sys.net_tcpListen", "sys", "VAL210", [(String, "VAL208"), (Int, "VAL209")], Int),
    contract!("sys.net_tcpListenTls", "sys", "VAL215", [(String, "VAL211"), (Int, "VAL212"), (String, "VAL213"), (String, "VAL214")], Int),
    contract!("sys.net_tcpAccept", "sys", "VAL216", [(Int, "VAL217")], Int),
    contract!("sys.net_tcpRead", "sys", "VAL220", [(Int, "VAL218"), (Int, "VAL219")], String),
    contract!("sys.net_tcpWrite", "sys", "VAL223", [(Int, "VAL221"), (String, "VAL222")], Int),
    contract!("sys.net_udpBind", "sys", "VAL239", [(String, "VAL237"), (Int, "VAL238")], Int),
    contract!("sys.net_udpRecv", "sys", "VAL242", [(Int, "VAL240"), (Int, "VAL241")], Node),
    contract!("sys.net_udpSend", "sys", "VAL247", [(Int, "VAL243"), (String, "VAL244"), (Int, "VAL245"), (String, "VAL246")], Int),
    contract!("sys.ui_createWindow", "sys", "VAL251", [(String, "VAL248"), (Int, "VAL249"), (Int, "VAL250")], Int),
    contract!("sys.ui_beginFrame", "sys", "VAL252", [(Int, "VAL253")], Void),
    contract!("sys.ui_drawRect", "sys", "VAL260", [(Int, "VAL254"), (Int, "VAL255"), (Int, "VAL256"), (Int, "VAL257"), (Int, "VAL258"), (String, "VAL259")], Void),
    contract!("sys.ui_drawText", "sys", "VAL267", [(Int, "VAL261"), (Int, "VAL262"), (Int, "VAL263"), (String, "VAL264"), (String, "VAL265"), (Int, "VAL266")], Void),
    contract!("sys.ui_drawLine", "sys", "VAL283", [(Int, "VAL276"), (Int, "VAL277"), (Int, "VAL278"), (Int, "VAL279"), (Int, "VAL280"), (String, "VAL281"), (Int, "VAL282")], Void),
    contract!("sys.ui_drawEllipse", "sys", "VAL290", [(Int, "VAL284"), (Int, "VAL285"), (Int, "VAL286"), (Int, "VAL287"), (Int, "VAL288"), (String, "VAL289")], Void),
    contract!("sys.ui_drawPath", "sys", "VAL295", [(Int, "VAL291"), (String, "VAL292"), (String, "VAL293"), (Int, "VAL294")], Void),
    contract!("sys.ui_drawPolyline", "sys", "VAL300", [(Int, "VAL296"), (String, "VAL297"), (String, "VAL298"), (Int, "VAL299")], Void),
    contract!("sys.ui_drawPolygon", "sys", "VAL305", [(Int, "VAL301"), (String, "VAL302"), (String, "VAL303"), (Int, "VAL304")], Void),
    contract!("sys.ui_drawTextPath", "sys", "VAL311", [(Int, "VAL306"), (String, "VAL307"), (String, "VAL308"), (String, "VAL309"), (Int, "VAL310")], Void),
    contract!("sys.ui_drawRectPaint", "sys", "VAL321", [(Int, "VAL312"), (Int, "VAL313"), (Int, "VAL314"), (Int, "VAL315"), (Int, "VAL316"), (String, "VAL317"), (String, "VAL318"), (Int, "VAL319"), (Int, "VAL320")], Void),
    contract!("sys.ui_drawEllipsePaint", "sys", "VAL331", [(Int, "VAL322"), (Int, "VAL323"), (Int, "VAL324"), (Int, "VAL325"), (Int, "VAL326"), (String, "VAL327"), (String, "VAL328"), (Int, "VAL329"), (Int, "VAL330")], Void),
    contract!("sys.ui_drawPolylinePaint", "sys", "VAL337", [(Int, "VAL332"), (String, "VAL333"), (String, "VAL334"), (Int, "VAL335"), (Int, "VAL336")], Void),
    contract!("sys.ui_drawPolygonPaint", "sys", "VAL344", [(Int, "VAL338"), (String, "VAL339"), (String, "VAL340"), (String, "VAL341"), (Int, "VAL342"), (Int, "VAL343")], Void),
    contract!("sys.ui_drawPathPaint", "sys", "VAL352", [(Int, "VAL345"), (String, "VAL346"), (String, "VAL347"), (String, "VAL348"), (Int, "VAL349"), (Int, "VAL350"), (Int, "VAL351")], Void),
    contract!("sys.ui_drawTextPaint", "sys", "VAL360", [(Int, "VAL353"), (Int, "VAL354"), (Int, "VAL355"), (String, "VAL356"), (String, "VAL357"), (Int, "VAL358"), (Int, "VAL359")], Void),
    contract!("sys.ui_filterBlur", "sys", "VAL368", [(Int, "VAL361"), (String, "VAL362"), (String, "VAL363"), (Int, "VAL364"), (Int, "VAL365"), (Int, "VAL366"), (Int, "VAL367")], Void),
    contract!("sys.ui_groupPush", "sys", "VAL370", [(Int, "VAL369")], Void),
    contract!("sys.ui_groupPop", "sys", "VAL372", [(Int, "VAL371")], Void),
    contract!("sys.ui_translate", "sys", "VAL376", [(Int, "VAL373"), (Int, "VAL374"), (Int, "VAL375")], Void),
    contract!("sys.ui_scale", "sys", "VAL380", [(Int, "VAL377"), (Int, "VAL378"), (Int, "VAL379")], Void),
    contract!("sys.ui_rotate", "sys", "VAL383", [(Int, "VAL381"), (Int, "VAL382")], Void),
    contract!("sys.ui_endFrame", "sys", "VAL268", [(Int, "VAL269")], Void),
    contract!("sys.ui_pollEvent", "sys", "VAL270", [(Int, "VAL271")], Node),
    contract!("sys.ui_present", "sys", "VAL272", [(Int, "VAL273")], Void),
    contract!("sys.ui_closeWindow", "sys", "VAL274", [(Int, "VAL275")], Void),
    contract!("sys.ui_getWindowSize", "sys", "VAL276", [(Int, "VAL277")], Node),
    contract!("sys.crypto_base64Encode", "sys", "VAL224", [(String, "VAL225")], String),
    contract!("sys.crypto_base64Decode", "sys", "VAL226", [(String, "VAL227")], String),
    contract!("sys.crypto_sha1", "sys", "VAL228", [(String, "VAL229")], String),
    contract!("sys.crypto_sha256", "sys", "VAL230", [(String, "VAL231")], String),
    contract!("sys.crypto_hmacSha256", "sys", "VAL234", [(String, "VAL232"), (String, "VAL233")], String),
    contract!("sys.crypto_randomBytes", "sys", "VAL235", [(Int, "VAL236")], String),
    contract!("sys.console_write", "sys", "VAL183", [(String, "VAL184")], Void),
    contract!("sys.console_writeLine", "sys", "VAL185", [(String, "VAL186")], Void),
    contract!("sys.console_readLine", "sys", "VAL187", [], String),
    contract!("sys.console_readAllStdin", "sys", "VAL188", [], String),
    contract!("sys.console_writeErrLine", "sys", "VAL189", [(String, "VAL190")], Void),
    contract!("sys.process_cwd", "sys", "VAL193", [], String),
    contract!("sys.process_envGet", "sys", "VAL191", [(String, "VAL192")], String),
    contract!("sys.time_nowUnixMs", "sys", "VAL182", [], Int),
    contract!("sys.time_monotonicMs", "sys", "VAL201", [], Int),
    contract!("sys.time_sleepMs", "sys", "VAL202", [(Int, "VAL203")], Void),
    contract!("sys.stdout_writeLine", "sys", "VAL134", [(String, "VAL135")], Void),
    contract!("sys.proc_exit", "sys", "VAL136", [(Int, "VAL137")], Void),
    contract!("sys.process_argv", "sys", "VAL170", [], Node),
    contract!("sys.fs_readFile", "sys", "VAL138", [(String, "VAL139")], String),
    contract!("sys.fs_fileExists", "sys", "VAL140", [(String, "VAL141")], Bool),
    contract!("sys.fs_readDir", "sys", "VAL204", [(String, "VAL205")], Node),
    contract!("sys.fs_stat", "sys", "VAL206", [(String, "VAL207")], Node),
    contract!("sys.fs_pathExists", "sys", "VAL197", [(String, "VAL198")], Bool),
    contract!("sys.fs_writeFile", "sys", "VAL194", [(String, "VAL195"), (String, "VAL196")], Void),
    contract!("sys.fs_makeDir", "sys", "VAL199", [(String, "VAL200")], Void),
    contract!("sys.str_utf8ByteCount", "sys", "VAL142", [(String, "VAL143")], Int),
    contract!("sys.str_substring", "sys", "VAL281", [(String, "VAL278"), (Int, "VAL279"), (Int, "VAL280")], String),
    contract!("sys.str_remove", "sys", "VAL285", [(String, "VAL282"), (Int, "VAL283"), (Int, "VAL284")], String),
    contract!("sys.http_get", "sys", "VAL148", [(String, "VAL149")], String),
    contract!("sys.platform", "sys", "VAL150", [], String),
    contract!("sys.arch", "sys", "VAL151", [], String),
    contract!("sys.os_version", "sys", "VAL152", [], String),
    contract!("sys.runtime", "sys", "VAL153", [], String),
    contract!("sys.vm_run", "sys", "VAL144", [(Node, "VAL145"), (String, "VAL146"), (Node, "VAL147")], Unknown),
];

fn index() -> &'static HashMap<&'static str, &'static Contract> {
    static INDEX: OnceLock<HashMap<&'static str, &'static Contract>> = OnceLock::new();
    INDEX.get_or_init(|| CONTRACTS.iter().map(|c| (c.target, c)).collect())
}

pub fn lookup(target: &str) -> Option<&'static Contract> {
    index().get(target).copied()
}

/// Namespace prefix of a dotted target (`"sys"` for `"sys.fs_stat"`).
pub fn namespace(target: &str) -> Option<&str> {
    target.split_once('.').map(|(ns, _)| ns)
}
