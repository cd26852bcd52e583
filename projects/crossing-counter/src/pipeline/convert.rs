use crate::pipeline::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};

/// Number of trailing stderr lines kept for a failed conversion.
const DIAGNOSTIC_LINES: usize = 20;

/// Re-encodes the intermediate video into the delivery format.
pub trait FormatConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TranscodeSettings {
    /// Executable looked up on PATH
    pub program: String,
    pub video_codec: String,
    /// Constant rate factor, lower is higher quality
    pub crf: u8,
    pub preset: String,
    /// Replace an existing output file instead of failing
    pub overwrite: bool,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            crf: 18,
            preset: "slow".to_string(),
            overwrite: true,
        }
    }
}

/// Runs the ffmpeg CLI once per conversion and waits for it to exit.
pub struct FfmpegConverter {
    settings: TranscodeSettings,
}

impl FfmpegConverter {
    pub fn new(settings: TranscodeSettings) -> Self {
        Self { settings }
    }

    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let s = &self.settings;
        vec![
            "-hide_banner".to_string(),
            if s.overwrite { "-y" } else { "-n" }.to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vcodec".to_string(),
            s.video_codec.clone(),
            "-crf".to_string(),
            s.crf.to_string(),
            "-preset".to_string(),
            s.preset.clone(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Checks that the transcoder can be launched at all.
    pub fn probe(&self) -> bool {
        Command::new(&self.settings.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl FormatConverter for FfmpegConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let args = self.args(input, output);
        tracing::info!(
            "Converting {:?} -> {:?} ({} crf={} preset={})",
            input,
            output,
            self.settings.video_codec,
            self.settings.crf,
            self.settings.preset
        );
        tracing::debug!("{} {}", self.settings.program, args.join(" "));

        let result = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PipelineError::ConverterUnavailable {
                program: self.settings.program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Conversion {
                code: result.status.code(),
                diagnostics: tail_lines(&stderr, DIAGNOSTIC_LINES),
            });
        }

        tracing::info!("Conversion finished: {:?}", output);
        Ok(())
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_match_delivery_format() {
        let converter = FfmpegConverter::new(TranscodeSettings::default());
        let args = converter.args(Path::new("out.avi"), Path::new("out.mp4"));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "out.avi",
                "-vcodec",
                "libx264",
                "-crf",
                "18",
                "-preset",
                "slow",
                "out.mp4"
            ]
        );
    }

    #[test]
    fn test_no_overwrite_flag() {
        let converter = FfmpegConverter::new(TranscodeSettings {
            overwrite: false,
            ..TranscodeSettings::default()
        });
        let args = converter.args(Path::new("a.avi"), Path::new("b.mp4"));
        assert_eq!(args[1], "-n");
    }

    #[test]
    fn test_nonzero_exit_carries_code() {
        // `false` ignores its arguments and exits with 1.
        let converter = FfmpegConverter::new(TranscodeSettings {
            program: "false".to_string(),
            ..TranscodeSettings::default()
        });
        let err = converter
            .convert(Path::new("in.avi"), Path::new("out.mp4"))
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert!(matches!(err, PipelineError::Conversion { .. }));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let converter = FfmpegConverter::new(TranscodeSettings {
            program: "no-such-transcoder-binary".to_string(),
            ..TranscodeSettings::default()
        });
        assert!(!converter.probe());
        let err = converter
            .convert(Path::new("in.avi"), Path::new("out.mp4"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConverterUnavailable { .. }));
        assert!(err.is_conversion());
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_diagnostics_are_captured() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-transcoder");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'banner noise' >&2\necho 'Unknown encoder' >&2\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let converter = FfmpegConverter::new(TranscodeSettings {
            program: script.to_string_lossy().into_owned(),
            ..TranscodeSettings::default()
        });
        match converter.convert(Path::new("in.avi"), Path::new("out.mp4")) {
            Err(PipelineError::Conversion { code, diagnostics }) => {
                assert_eq!(code, Some(3));
                assert_eq!(diagnostics, "banner noise\nUnknown encoder");
            }
            other => panic!("expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_tail_lines_keeps_last() {
        let text = "a\nb\n\nc\nd\n";
        assert_eq!(tail_lines(text, 2), "c\nd");
        assert_eq!(tail_lines(text, 10), "a\nb\nc\nd");
        assert_eq!(tail_lines("", 3), "");
    }
}
