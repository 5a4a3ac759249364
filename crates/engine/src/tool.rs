//! External tool runner
//!
//! Every ffmpeg / ffprobe process goes through [`MediaTool`]. The system
//! implementation spawns real processes; tests plug in a recording fake.

use crate::error::MediaError;
use crate::probe::{parse_ffprobe_output, ProbeResult};
use crate::progress::ProgressMonitor;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Command, ExitStatus, Stdio};
use tracing::debug;

/// External program an [`Invocation`] targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Ffmpeg,
    Ffprobe,
}

impl Program {
    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Ffmpeg => "ffmpeg",
            Program::Ffprobe => "ffprobe",
        }
    }
}

/// Argument vector for one external tool run
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: Program,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// ffmpeg invocation that overwrites outputs and keeps the banner quiet
    pub fn ffmpeg() -> Self {
        let mut inv = Self::new(Program::Ffmpeg);
        inv.arg("-hide_banner").arg("-y");
        inv
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Asks ffmpeg for the machine-readable progress feed on stdout.
    ///
    /// Must be called before the output path is appended.
    pub fn with_progress_feed(&mut self) -> &mut Self {
        self.args(["-progress", "pipe:1", "-nostats"])
    }

    /// Last argument, which for ffmpeg is the output path
    pub fn output_path(&self) -> Option<PathBuf> {
        self.args.last().map(PathBuf::from)
    }

    /// Value following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .windows(2)
            .find(|pair| pair[0].as_os_str() == OsStr::new(flag))
            .map(|pair| pair[1].as_os_str())
    }

    pub fn to_command(&self, binary: &Path) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.as_str())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured process output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Seam for running the external media tool
pub trait MediaTool: Send + Sync {
    /// Runs to completion; non-zero exit is an `ExternalToolFailure`.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, MediaError>;

    /// Runs while feeding stdout to `monitor` one character at a time.
    ///
    /// The invocation must already carry [`Invocation::with_progress_feed`].
    fn run_with_progress(
        &self,
        invocation: &Invocation,
        monitor: &mut ProgressMonitor<'_>,
    ) -> Result<ToolOutput, MediaError> {
        let output = self.run(invocation)?;
        for ch in output.stdout.chars() {
            if monitor.feed(ch) {
                break;
            }
        }
        monitor.finish();
        Ok(output)
    }

    /// Stream and format metadata for `path`.
    fn probe(&self, path: &Path) -> Result<ProbeResult, MediaError> {
        let mut inv = Invocation::new(Program::Ffprobe);
        inv.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path);

        let output = self.run(&inv).map_err(|e| match e {
            MediaError::ExternalToolFailure { diagnostic, .. } => {
                MediaError::probe_unavailable(path, diagnostic)
            }
            other => other,
        })?;
        parse_ffprobe_output(&output.stdout)
            .map_err(|e| MediaError::probe_unavailable(path, e.to_string()))
    }
}

/// Spawns the real ffmpeg / ffprobe binaries
#[derive(Debug, Clone)]
pub struct SystemTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for SystemTool {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl SystemTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit binaries instead of looking them up on PATH
    pub fn with_binaries(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    fn binary(&self, program: Program) -> &Path {
        match program {
            Program::Ffmpeg => &self.ffmpeg,
            Program::Ffprobe => &self.ffprobe,
        }
    }

    fn spawn_failure(program: Program, e: std::io::Error) -> MediaError {
        MediaError::ExternalToolFailure {
            program: program.as_str().to_string(),
            status: "not started".to_string(),
            diagnostic: format!("{} (is it installed and in PATH?)", e),
        }
    }
}

fn status_failure(program: Program, status: ExitStatus, stderr: &str) -> MediaError {
    let status = match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    MediaError::ExternalToolFailure {
        program: program.as_str().to_string(),
        status,
        diagnostic: stderr.trim().to_string(),
    }
}

impl MediaTool for SystemTool {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, MediaError> {
        debug!("running {}", invocation);
        let output = invocation
            .to_command(self.binary(invocation.program))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_failure(invocation.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(status_failure(invocation.program, output.status, &stderr));
        }
        Ok(ToolOutput { stdout, stderr })
    }

    fn run_with_progress(
        &self,
        invocation: &Invocation,
        monitor: &mut ProgressMonitor<'_>,
    ) -> Result<ToolOutput, MediaError> {
        debug!("running with progress {}", invocation);
        let mut child = invocation
            .to_command(self.binary(invocation.program))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_failure(invocation.program, e))?;

        // stderr is drained on its own thread so a chatty encoder cannot
        // block on a full pipe while stdout is being read.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let stdout_text = match pump_stdout(child.stdout.take(), monitor) {
            Ok(text) => text,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                if let Some(handle) = stderr_reader {
                    let _ = handle.join();
                }
                return Err(e.into());
            }
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(status_failure(invocation.program, status, &stderr));
        }
        monitor.finish();

        Ok(ToolOutput {
            stdout: stdout_text,
            stderr,
        })
    }
}

/// Reads stdout to the end, feeding the monitor until it reports the final
/// frame. The rest is still drained so the child never blocks on the pipe.
fn pump_stdout(
    stdout: Option<ChildStdout>,
    monitor: &mut ProgressMonitor<'_>,
) -> io::Result<String> {
    let mut stdout_text = String::new();
    let Some(mut stdout) = stdout else {
        return Ok(stdout_text);
    };

    let mut chunk = [0u8; 4096];
    let mut finished = false;
    loop {
        let n = stdout.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&chunk[..n]);
        stdout_text.push_str(&text);
        if finished {
            continue;
        }
        for ch in text.chars() {
            if monitor.feed(ch) {
                finished = true;
                break;
            }
        }
    }
    Ok(stdout_text)
}

/// Extracts the major version from `ffmpeg -version` output.
///
/// Handles `ffmpeg version 7.1 ...` and `ffmpeg version n7.1-...`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');
    let major_str = version_str.split(['.', '-']).next()?;

    major_str.parse().ok()
}

/// Confirms both ffmpeg and ffprobe start; returns ffmpeg's major version
/// when it can be parsed (git builds report none).
pub fn check_tools_available(tool: &dyn MediaTool) -> Result<Option<u32>, MediaError> {
    let mut version = Invocation::new(Program::Ffmpeg);
    version.arg("-version");
    let output = tool.run(&version)?;

    let mut probe_version = Invocation::new(Program::Ffprobe);
    probe_version.arg("-version");
    tool.run(&probe_version)?;

    Ok(parse_ffmpeg_version(&output.stdout))
}
