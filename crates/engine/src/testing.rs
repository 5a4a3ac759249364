//! Recording stand-in for ffmpeg / ffprobe used by unit tests.

use crate::error::MediaError;
use crate::probe::{FormatInfo, ProbeResult, StreamInfo};
use crate::tool::{Invocation, MediaTool, Program, ToolOutput};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    invocations: Vec<Invocation>,
    probes: HashMap<PathBuf, ProbeResult>,
    pinned: HashSet<PathBuf>,
    loudness: HashMap<PathBuf, String>,
    concat_lists: Vec<String>,
    fail_on: Vec<String>,
    panic_on: Vec<String>,
}

/// Pretends to be ffmpeg: records every invocation, creates the output
/// file and registers a probe for it so later steps can inspect it.
#[derive(Default)]
pub struct FakeTool {
    state: Mutex<FakeState>,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_probe(width: u32, height: u32, duration: f64) -> ProbeResult {
        ProbeResult {
            streams: vec![
                StreamInfo {
                    codec_type: "video".to_string(),
                    codec_name: Some("h264".to_string()),
                    width: Some(width),
                    height: Some(height),
                    bit_rate: Some(4_000_000),
                },
                StreamInfo {
                    codec_type: "audio".to_string(),
                    codec_name: Some("aac".to_string()),
                    width: None,
                    height: None,
                    bit_rate: Some(128_000),
                },
            ],
            format: FormatInfo {
                duration_secs: Some(duration),
                bit_rate: Some(4_200_000),
            },
        }
    }

    pub fn silent_video_probe(width: u32, height: u32, duration: f64) -> ProbeResult {
        let mut probe = Self::video_probe(width, height, duration);
        probe.streams.retain(|s| s.codec_type == "video");
        probe
    }

    pub fn audio_probe(duration: f64) -> ProbeResult {
        ProbeResult {
            streams: vec![StreamInfo {
                codec_type: "audio".to_string(),
                codec_name: Some("mp3".to_string()),
                width: None,
                height: None,
                bit_rate: Some(192_000),
            }],
            format: FormatInfo {
                duration_secs: Some(duration),
                bit_rate: Some(192_000),
            },
        }
    }

    pub fn set_probe(&self, path: impl Into<PathBuf>, result: ProbeResult) {
        self.state.lock().unwrap().probes.insert(path.into(), result);
    }

    /// Like [`FakeTool::set_probe`] but never replaced by a later run.
    pub fn pin_probe(&self, path: impl Into<PathBuf>, result: ProbeResult) {
        let path = path.into();
        let mut state = self.state.lock().unwrap();
        state.probes.insert(path.clone(), result);
        state.pinned.insert(path);
    }

    /// Integrated loudness reported by the loudnorm analysis pass.
    pub fn set_loudness(&self, path: impl Into<PathBuf>, input_i: &str) {
        self.state
            .lock()
            .unwrap()
            .loudness
            .insert(path.into(), input_i.to_string());
    }

    /// Any invocation whose rendered command line contains `needle` fails.
    pub fn fail_when(&self, needle: &str) {
        self.state.lock().unwrap().fail_on.push(needle.to_string());
    }

    /// Any invocation whose rendered command line contains `needle` panics.
    pub fn panic_when(&self, needle: &str) {
        self.state.lock().unwrap().panic_on.push(needle.to_string());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Invocations rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations().iter().map(|i| i.to_string()).collect()
    }

    /// Contents of every concat list seen, in order.
    pub fn concat_lists(&self) -> Vec<String> {
        self.state.lock().unwrap().concat_lists.clone()
    }
}

impl MediaTool for FakeTool {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, MediaError> {
        let line = invocation.to_string();
        let mut state = self.state.lock().unwrap();
        state.invocations.push(invocation.clone());

        if state.panic_on.iter().any(|n| line.contains(n.as_str())) {
            drop(state);
            panic!("fake tool asked to panic on {}", line);
        }
        if state.fail_on.iter().any(|n| line.contains(n.as_str())) {
            return Err(MediaError::ExternalToolFailure {
                program: invocation.program.as_str().to_string(),
                status: "exit code 1".to_string(),
                diagnostic: format!("simulated failure: {}", line),
            });
        }
        if invocation.program == Program::Ffprobe {
            return Ok(ToolOutput::default());
        }

        let input = invocation.value_of("-i").map(PathBuf::from);

        if invocation.value_of("-f").map(|v| v == "concat").unwrap_or(false) {
            if let Some(list) = &input {
                let contents = fs::read_to_string(list).unwrap_or_default();
                state.concat_lists.push(contents);
            }
        }

        let output = match invocation.output_path() {
            Some(output) if output != Path::new("-") => output,
            _ => {
                // analysis pass such as loudnorm
                let stderr = input
                    .and_then(|i| state.loudness.get(&i).cloned())
                    .map(|input_i| {
                        format!(
                            "[Parsed_loudnorm_0 @ 0x0]\n{{\n\t\"input_i\" : \"{}\",\n\t\"input_tp\" : \"-1.0\"\n}}\n",
                            input_i
                        )
                    })
                    .unwrap_or_default();
                return Ok(ToolOutput {
                    stdout: String::new(),
                    stderr,
                });
            }
        };

        let _ = fs::write(&output, b"fake media");

        if !state.pinned.contains(&output) {
            let trimmed = invocation
                .value_of("-t")
                .and_then(|t| t.to_str())
                .and_then(|t| t.parse::<f64>().ok());
            let derived = match (trimmed, input.as_ref().and_then(|i| state.probes.get(i))) {
                (Some(t), Some(source)) => {
                    let mut probe = source.clone();
                    probe.format.duration_secs = Some(t);
                    Some(probe)
                }
                (Some(t), None) => Some(Self::audio_probe(t)),
                (None, Some(source)) => Some(source.clone()),
                (None, None) => None,
            };
            if let Some(probe) = derived {
                state.probes.insert(output.clone(), probe);
            }
        }

        Ok(ToolOutput {
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn probe(&self, path: &Path) -> Result<ProbeResult, MediaError> {
        self.state
            .lock()
            .unwrap()
            .probes
            .get(path)
            .cloned()
            .ok_or_else(|| MediaError::probe_unavailable(path, "no probe registered"))
    }
}
