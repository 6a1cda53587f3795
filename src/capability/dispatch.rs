//! Host dispatch for contract-checked capability calls.
//!
//! By the time a call reaches `invoke` its permission and argument kinds
//! have been checked against the contract table, so argument extraction
//! failures indicate a table/dispatch mismatch and surface as
//! `HostError::Invalid`.

use tracing::trace;

use super::host::{saturate_i32, HostError, HostResult, SyscallHost};
use super::replay::EventReplay;
use crate::runtime::{nodes, Value};

fn str_arg<'a>(target: &str, args: &'a [Value], index: usize) -> HostResult<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::Invalid(format!("{} arg {} must be string", target, index + 1)))
}

fn int_arg(target: &str, args: &[Value], index: usize) -> HostResult<i32> {
    args.get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| HostError::Invalid(format!("{} arg {} must be int", target, index + 1)))
}

fn void(result: HostResult<()>) -> HostResult<Value> {
    result.map(|_| Value::Void)
}

/// Millisecond clocks saturate at the 32-bit int bounds rather than wrap,
/// so a wall-clock reading past 2^31 ms comes back as `i32::MAX`.
fn millis(ms: i64) -> Value {
    Value::Int(saturate_i32(ms))
}

/// Perform the effect behind `target`. `replay`, when present, replaces
/// live UI event polling.
pub fn invoke(
    host: &mut dyn SyscallHost,
    replay: Option<&mut EventReplay>,
    target: &str,
    args: &[Value],
) -> HostResult<Value> {
    trace!(callee = target, argc = args.len(), "host dispatch");
    let s = move |i: usize| str_arg(target, args, i);
    let n = move |i: usize| int_arg(target, args, i);

    match target {
        "math.add" => Ok(Value::Int(n(0)?.wrapping_add(n(1)?))),

        // console / io
        "console.print" | "io.print" | "sys.console_writeLine" | "sys.stdout_writeLine" => {
            void(host.write_line(s(0)?))
        }
        "io.write" | "sys.console_write" => void(host.write(s(0)?)),
        "sys.console_writeErrLine" => void(host.write_err_line(s(0)?)),
        "io.readLine" | "sys.console_readLine" => host.read_line().map(Value::Str),
        "io.readAllStdin" | "sys.console_readAllStdin" => host.read_all_stdin().map(Value::Str),

        // filesystem
        "io.readFile" | "sys.fs_readFile" => host.read_file(s(0)?).map(Value::Str),
        "io.fileExists" | "sys.fs_fileExists" => host.file_exists(s(0)?).map(Value::Bool),
        "io.pathExists" | "sys.fs_pathExists" => host.path_exists(s(0)?).map(Value::Bool),
        "io.makeDir" | "sys.fs_makeDir" => void(host.make_dir(s(0)?)),
        "io.writeFile" | "sys.fs_writeFile" => void(host.write_file(s(0)?, s(1)?)),
        "sys.fs_readDir" => host.read_dir(s(0)?).map(|names| Value::node(nodes::dir_node(&names))),
        "sys.fs_stat" => host.stat(s(0)?).map(|stat| Value::node(nodes::stat_node(&stat))),

        // process
        "sys.process_argv" => host.argv().map(|argv| Value::node(nodes::argv_node(&argv))),
        "sys.process_cwd" => host.cwd().map(Value::Str),
        "sys.process_envGet" => host.env_get(s(0)?).map(Value::Str),
        "sys.proc_exit" => void(host.exit(n(0)?)),

        // time
        "sys.time_nowUnixMs" => host.now_unix_ms().map(millis),
        "sys.time_monotonicMs" => host.monotonic_ms().map(millis),
        "sys.time_sleepMs" => void(host.sleep_ms(n(0)?)),

        // crypto
        "sys.crypto_base64Encode" => host.base64_encode(s(0)?).map(Value::Str),
        "sys.crypto_base64Decode" => host.base64_decode(s(0)?).map(Value::Str),
        "sys.crypto_sha1" => host.sha1(s(0)?).map(Value::Str),
        "sys.crypto_sha256" => host.sha256(s(0)?).map(Value::Str),
        "sys.crypto_hmacSha256" => host.hmac_sha256(s(0)?, s(1)?).map(Value::Str),
        "sys.crypto_randomBytes" => host.random_bytes(n(0)?).map(Value::Str),

        // strings
        "sys.str_utf8ByteCount" => host.utf8_byte_count(s(0)?).map(Value::Int),
        "sys.str_substring" => host.substring(s(0)?, n(1)?, n(2)?).map(Value::Str),
        "sys.str_remove" => host.remove(s(0)?, n(1)?, n(2)?).map(Value::Str),

        // platform
        "sys.http_get" => host.http_get(s(0)?).map(Value::Str),
        "sys.platform" => host.platform().map(Value::Str),
        "sys.arch" => host.arch().map(Value::Str),
        "sys.os_version" => host.os_version().map(Value::Str),
        "sys.runtime" => host.runtime_name().map(Value::Str),

        // network
        "sys.net_listen" => host.net_listen(n(0)?).map(Value::Int),
        "sys.net_listen_tls" => host.net_listen_tls(n(0)?, s(1)?, s(2)?).map(Value::Int),
        "sys.net_accept" => host.net_accept(n(0)?).map(Value::Int),
        "sys.net_readHeaders" => host.net_read_headers(n(0)?).map(Value::Str),
        "sys.net_write" => void(host.net_write(n(0)?, s(1)?)),
        "sys.net_close" => void(host.net_close(n(0)?)),
        "sys.net_tcpListen" => host.tcp_listen(s(0)?, n(1)?).map(Value::Int),
        "sys.net_tcpListenTls" => host.tcp_listen_tls(s(0)?, n(1)?, s(2)?, s(3)?).map(Value::Int),
        "sys.net_tcpAccept" => host.tcp_accept(n(0)?).map(Value::Int),
        "sys.net_tcpRead" => host.tcp_read(n(0)?, n(1)?).map(Value::Str),
        "sys.net_tcpWrite" => host.tcp_write(n(0)?, s(1)?).map(Value::Int),
        "sys.net_udpBind" => host.udp_bind(s(0)?, n(1)?).map(Value::Int),
        "sys.net_udpRecv" => host
            .udp_recv(n(0)?, n(1)?)
            .map(|packet| Value::node(nodes::udp_packet_node(&packet))),
        "sys.net_udpSend" => host.udp_send(n(0)?, s(1)?, n(2)?, s(3)?).map(Value::Int),

        // ui
        "sys.ui_createWindow" => host.ui_create_window(s(0)?, n(1)?, n(2)?).map(Value::Int),
        "sys.ui_beginFrame" => void(host.ui_begin_frame(n(0)?)),
        "sys.ui_endFrame" => void(host.ui_end_frame(n(0)?)),
        "sys.ui_present" => void(host.ui_present(n(0)?)),
        "sys.ui_closeWindow" => void(host.ui_close_window(n(0)?)),
        "sys.ui_pollEvent" => {
            let event = match replay {
                Some(replay) => replay.next_event(),
                None => host.ui_poll_event(n(0)?)?,
            };
            Ok(Value::node(nodes::ui_event_node(&event)))
        }
        "sys.ui_getWindowSize" => host
            .ui_window_size(n(0)?)
            .map(|(w, h)| Value::node(nodes::window_size_node(w, h))),
        _ => match target.strip_prefix("sys.ui_") {
            Some(command) => void(host.ui_draw(n(0)?, command, &args[1..])),
            None => Err(HostError::Unsupported(target.to_string())),
        },
    }
}
