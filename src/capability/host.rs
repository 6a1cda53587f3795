//! Syscall host interface.
//!
//! The core decides whether a call is well-typed and permitted; a
//! `SyscallHost` performs the effect. Every method defaults to
//! `HostError::Unsupported`, so a host only implements what it backs.
//! Drawing is one narrow entry point (`ui_draw`) so each UI backend stays
//! a separate implementation.

use std::io::{self, BufRead, Read, Write};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

use super::crypto;
use super::replay::UiEvent;
use crate::runtime::Value;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type HostResult<T> = Result<T, HostError>;

fn unsupported<T>(what: &str) -> HostResult<T> {
    Err(HostError::Unsupported(what.to_string()))
}

/// Narrow a 64-bit host quantity to the language's 32-bit int. Values out
/// of range saturate at `i32::MIN`/`i32::MAX` instead of wrapping.
pub fn saturate_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

fn millis_i64(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Result of `fs_stat`. `mtime_unix_ms` saturates (see `saturate_i32`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: String,
    pub size: i32,
    pub mtime_unix_ms: i32,
}

/// Result of `net_udpRecv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    pub host: String,
    pub port: i32,
    pub data: String,
}

#[allow(unused_variables)]
pub trait SyscallHost {
    // ── console ─────────────────────────────────────────────────────────
    fn write(&mut self, text: &str) -> HostResult<()> {
        unsupported("console.write")
    }
    fn write_line(&mut self, text: &str) -> HostResult<()> {
        unsupported("console.writeLine")
    }
    fn write_err_line(&mut self, text: &str) -> HostResult<()> {
        unsupported("console.writeErrLine")
    }
    fn read_line(&mut self) -> HostResult<String> {
        unsupported("console.readLine")
    }
    fn read_all_stdin(&mut self) -> HostResult<String> {
        unsupported("console.readAllStdin")
    }

    // ── filesystem ──────────────────────────────────────────────────────
    fn read_file(&mut self, path: &str) -> HostResult<String> {
        unsupported("fs.readFile")
    }
    fn write_file(&mut self, path: &str, text: &str) -> HostResult<()> {
        unsupported("fs.writeFile")
    }
    fn file_exists(&mut self, path: &str) -> HostResult<bool> {
        unsupported("fs.fileExists")
    }
    fn path_exists(&mut self, path: &str) -> HostResult<bool> {
        unsupported("fs.pathExists")
    }
    fn make_dir(&mut self, path: &str) -> HostResult<()> {
        unsupported("fs.makeDir")
    }
    fn read_dir(&mut self, path: &str) -> HostResult<Vec<String>> {
        unsupported("fs.readDir")
    }
    fn stat(&mut self, path: &str) -> HostResult<FileStat> {
        unsupported("fs.stat")
    }

    // ── process ─────────────────────────────────────────────────────────
    fn argv(&mut self) -> HostResult<Vec<String>> {
        unsupported("process.argv")
    }
    fn cwd(&mut self) -> HostResult<String> {
        unsupported("process.cwd")
    }
    fn env_get(&mut self, name: &str) -> HostResult<String> {
        unsupported("process.envGet")
    }
    fn exit(&mut self, code: i32) -> HostResult<()> {
        unsupported("process.exit")
    }

    // ── time ────────────────────────────────────────────────────────────
    fn now_unix_ms(&mut self) -> HostResult<i64> {
        unsupported("time.nowUnixMs")
    }
    fn monotonic_ms(&mut self) -> HostResult<i64> {
        unsupported("time.monotonicMs")
    }
    fn sleep_ms(&mut self, ms: i32) -> HostResult<()> {
        unsupported("time.sleepMs")
    }

    // ── crypto ──────────────────────────────────────────────────────────
    fn base64_encode(&mut self, text: &str) -> HostResult<String> {
        unsupported("crypto.base64Encode")
    }
    fn base64_decode(&mut self, text: &str) -> HostResult<String> {
        unsupported("crypto.base64Decode")
    }
    fn sha1(&mut self, text: &str) -> HostResult<String> {
        unsupported("crypto.sha1")
    }
    fn sha256(&mut self, text: &str) -> HostResult<String> {
        unsupported("crypto.sha256")
    }
    fn hmac_sha256(&mut self, key: &str, text: &str) -> HostResult<String> {
        unsupported("crypto.hmacSha256")
    }
    fn random_bytes(&mut self, count: i32) -> HostResult<String> {
        unsupported("crypto.randomBytes")
    }

    // ── strings (pure) ──────────────────────────────────────────────────
    fn utf8_byte_count(&mut self, text: &str) -> HostResult<i32> {
        Ok(i32::try_from(text.len()).unwrap_or(i32::MAX))
    }
    /// `length` chars starting at char `start`, clamped to the string.
    fn substring(&mut self, text: &str, start: i32, length: i32) -> HostResult<String> {
        let start = start.max(0) as usize;
        let length = length.max(0) as usize;
        Ok(text.chars().skip(start).take(length).collect())
    }
    /// `text` without the `length` chars starting at char `start`.
    fn remove(&mut self, text: &str, start: i32, length: i32) -> HostResult<String> {
        let start = start.max(0) as usize;
        let end = start.saturating_add(length.max(0) as usize);
        Ok(text
            .chars()
            .enumerate()
            .filter(|(i, _)| *i < start || *i >= end)
            .map(|(_, c)| c)
            .collect())
    }

    // ── platform ────────────────────────────────────────────────────────
    fn http_get(&mut self, url: &str) -> HostResult<String> {
        unsupported("http.get")
    }
    fn platform(&mut self) -> HostResult<String> {
        unsupported("platform")
    }
    fn arch(&mut self) -> HostResult<String> {
        unsupported("arch")
    }
    fn os_version(&mut self) -> HostResult<String> {
        unsupported("os_version")
    }
    fn runtime_name(&mut self) -> HostResult<String> {
        unsupported("runtime")
    }

    // ── network ─────────────────────────────────────────────────────────
    fn net_listen(&mut self, port: i32) -> HostResult<i32> {
        unsupported("net.listen")
    }
    fn net_listen_tls(&mut self, port: i32, cert_path: &str, key_path: &str) -> HostResult<i32> {
        unsupported("net.listenTls")
    }
    fn net_accept(&mut self, listener: i32) -> HostResult<i32> {
        unsupported("net.accept")
    }
    fn net_read_headers(&mut self, connection: i32) -> HostResult<String> {
        unsupported("net.readHeaders")
    }
    fn net_write(&mut self, connection: i32, text: &str) -> HostResult<()> {
        unsupported("net.write")
    }
    fn net_close(&mut self, handle: i32) -> HostResult<()> {
        unsupported("net.close")
    }
    fn tcp_listen(&mut self, host: &str, port: i32) -> HostResult<i32> {
        unsupported("net.tcpListen")
    }
    fn tcp_listen_tls(&mut self, host: &str, port: i32, cert_path: &str, key_path: &str) -> HostResult<i32> {
        unsupported("net.tcpListenTls")
    }
    fn tcp_accept(&mut self, listener: i32) -> HostResult<i32> {
        unsupported("net.tcpAccept")
    }
    fn tcp_read(&mut self, connection: i32, max_bytes: i32) -> HostResult<String> {
        unsupported("net.tcpRead")
    }
    fn tcp_write(&mut self, connection: i32, data: &str) -> HostResult<i32> {
        unsupported("net.tcpWrite")
    }
    fn udp_bind(&mut self, host: &str, port: i32) -> HostResult<i32> {
        unsupported("net.udpBind")
    }
    fn udp_recv(&mut self, socket: i32, max_bytes: i32) -> HostResult<UdpPacket> {
        unsupported("net.udpRecv")
    }
    fn udp_send(&mut self, socket: i32, host: &str, port: i32, data: &str) -> HostResult<i32> {
        unsupported("net.udpSend")
    }

    // ── ui ──────────────────────────────────────────────────────────────
    fn ui_create_window(&mut self, title: &str, width: i32, height: i32) -> HostResult<i32> {
        unsupported("ui.createWindow")
    }
    fn ui_begin_frame(&mut self, window: i32) -> HostResult<()> {
        unsupported("ui.beginFrame")
    }
    /// Every draw, paint, filter, group and transform command. `command`
    /// is the target without its `sys.ui_` prefix, e.g. `drawRect`.
    fn ui_draw(&mut self, window: i32, command: &str, args: &[Value]) -> HostResult<()> {
        unsupported("ui.draw")
    }
    fn ui_end_frame(&mut self, window: i32) -> HostResult<()> {
        unsupported("ui.endFrame")
    }
    fn ui_poll_event(&mut self, window: i32) -> HostResult<UiEvent> {
        unsupported("ui.pollEvent")
    }
    fn ui_present(&mut self, window: i32) -> HostResult<()> {
        unsupported("ui.present")
    }
    fn ui_close_window(&mut self, window: i32) -> HostResult<()> {
        unsupported("ui.closeWindow")
    }
    fn ui_window_size(&mut self, window: i32) -> HostResult<(i32, i32)> {
        unsupported("ui.getWindowSize")
    }
}

// ── Reference host ───────────────────────────────────────────────────────

/// Host over the process's own stdio, filesystem, clock and environment.
/// Network and UI stay unsupported.
pub struct StdHost {
    argv: Vec<String>,
    started: Instant,
}

impl StdHost {
    pub fn new() -> Self {
        Self::with_argv(std::env::args().collect())
    }

    pub fn with_argv(argv: Vec<String>) -> Self {
        Self {
            argv,
            started: Instant::now(),
        }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallHost for StdHost {
    fn write(&mut self, text: &str) -> HostResult<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> HostResult<()> {
        writeln!(io::stdout().lock(), "{}", text)?;
        Ok(())
    }

    fn write_err_line(&mut self, text: &str) -> HostResult<()> {
        writeln!(io::stderr().lock(), "{}", text)?;
        Ok(())
    }

    fn read_line(&mut self) -> HostResult<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_all_stdin(&mut self) -> HostResult<String> {
        let mut text = String::new();
        io::stdin().lock().read_to_string(&mut text)?;
        Ok(text)
    }

    fn read_file(&mut self, path: &str) -> HostResult<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write_file(&mut self, path: &str, text: &str) -> HostResult<()> {
        Ok(std::fs::write(path, text)?)
    }

    fn file_exists(&mut self, path: &str) -> HostResult<bool> {
        Ok(std::path::Path::new(path).is_file())
    }

    fn path_exists(&mut self, path: &str) -> HostResult<bool> {
        Ok(std::path::Path::new(path).exists())
    }

    fn make_dir(&mut self, path: &str) -> HostResult<()> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn read_dir(&mut self, path: &str) -> HostResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn stat(&mut self, path: &str) -> HostResult<FileStat> {
        let meta = std::fs::metadata(path)?;
        let kind = if meta.is_dir() { "dir" } else if meta.is_file() { "file" } else { "other" };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(millis_i64)
            .unwrap_or(0);
        Ok(FileStat {
            kind: kind.to_string(),
            size: i32::try_from(meta.len()).unwrap_or(i32::MAX),
            mtime_unix_ms: saturate_i32(mtime),
        })
    }

    fn argv(&mut self) -> HostResult<Vec<String>> {
        Ok(self.argv.clone())
    }

    fn cwd(&mut self) -> HostResult<String> {
        Ok(std::env::current_dir()?.to_string_lossy().into_owned())
    }

    fn env_get(&mut self, name: &str) -> HostResult<String> {
        Ok(std::env::var(name).unwrap_or_default())
    }

    fn exit(&mut self, code: i32) -> HostResult<()> {
        debug!(code, "process exit requested");
        std::process::exit(code)
    }

    fn now_unix_ms(&mut self) -> HostResult<i64> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| HostError::Invalid(e.to_string()))?;
        Ok(millis_i64(now))
    }

    fn monotonic_ms(&mut self) -> HostResult<i64> {
        Ok(millis_i64(self.started.elapsed()))
    }

    fn sleep_ms(&mut self, ms: i32) -> HostResult<()> {
        std::thread::sleep(std::time::Duration::from_millis(ms.max(0) as u64));
        Ok(())
    }

    fn sha256(&mut self, text: &str) -> HostResult<String> {
        Ok(crypto::sha256_hex(text.as_bytes()))
    }

    fn hmac_sha256(&mut self, key: &str, text: &str) -> HostResult<String> {
        Ok(crypto::hmac_sha256_hex(key.as_bytes(), text.as_bytes()))
    }

    fn platform(&mut self) -> HostResult<String> {
        Ok(std::env::consts::OS.to_string())
    }

    fn arch(&mut self) -> HostResult<String> {
        Ok(std::env::consts::ARCH.to_string())
    }

    fn os_version(&mut self) -> HostResult<String> {
        Ok(format!("{}-{}", std::env::consts::FAMILY, std::env::consts::OS))
    }

    fn runtime_name(&mut self) -> HostResult<String> {
        Ok(format!("aos-rust/{}", env!("CARGO_PKG_VERSION")))
    }
}
