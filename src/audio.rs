//! Audio normalization for untrusted uploads.
//!
//! Every upload is re-encoded to the canonical format (mono, 44.1 kHz,
//! MP3 at 128 kbit/s) no matter what the client declared; mobile recorders
//! mislabel formats too often for the declared type to be trusted. The
//! conversion runs an ordered list of strategies: an ffmpeg subprocess
//! with container auto-detection first, then a symphonia decode whose raw
//! PCM output is encoded without any container probing. The first success
//! wins; if every strategy fails the combined diagnostics surface as a
//! conversion error.

use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::AppError;

/// Canonical sample rate all uploads are resampled to.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;
/// Canonical channel count.
pub const TARGET_CHANNELS: u16 = 1;
/// Canonical encoder bitrate.
pub const TARGET_BITRATE: &str = "128k";
/// Canonical container/codec name advertised to clients.
pub const TARGET_FORMAT: &str = "mp3";

/// Raw upload plus the client's (untrusted) hints about what it contains.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Tracks every temporary file created during one pipeline invocation so
/// the orchestrator can reclaim them on every exit path. Each removal is
/// independent and logged, never re-raised; `Drop` is a backstop for
/// paths that survive an early return.
#[derive(Debug, Default)]
pub struct TempTracker {
    paths: Vec<PathBuf>,
}

impl TempTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh tracked temp file and returns its path.
    pub fn create(&mut self, suffix: &str) -> Result<PathBuf, AppError> {
        let file = tempfile::Builder::new()
            .prefix("practice-")
            .suffix(suffix)
            .tempfile()
            .map_err(|err| AppError::internal(format!("failed to create temp file: {err}")))?;
        let (_, path) = file
            .keep()
            .map_err(|err| AppError::internal(format!("failed to keep temp file: {err}")))?;
        self.paths.push(path.clone());
        Ok(path)
    }

    /// Removes every tracked file. Safe to call more than once.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed temp file"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), %err, "failed to remove temp file"),
            }
        }
    }

    #[cfg(test)]
    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for TempTracker {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// One way of converting an upload into the canonical encoding.
///
/// Strategies report failure as a diagnostic string; the normalizer
/// aggregates the diagnostics of every failed attempt.
#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), String>;
}

/// Converts arbitrary uploads into the canonical encoding by trying each
/// strategy in order.
pub struct AudioNormalizer {
    strategies: Vec<Box<dyn ConversionStrategy>>,
}

impl AudioNormalizer {
    pub fn new(cfg: &AppConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(FfmpegStrategy {
                ffmpeg_path: cfg.ffmpeg_path.clone(),
            }),
            Box::new(SymphoniaStrategy {
                ffmpeg_path: cfg.ffmpeg_path.clone(),
            }),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ConversionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Writes the upload to a tracked temp file and converts it to the
    /// canonical encoding, returning the converted file's path. The caller
    /// owns cleanup of everything registered with `tracker`.
    pub async fn normalize(
        &self,
        blob: &AudioBlob,
        tracker: &mut TempTracker,
    ) -> Result<PathBuf, AppError> {
        let input = tracker.create(".upload")?;
        tokio::fs::write(&input, &blob.bytes)
            .await
            .map_err(|err| AppError::internal(format!("failed to write upload: {err}")))?;

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            let output = tracker.create(".mp3")?;
            match strategy.convert(&input, &output).await {
                Ok(()) => {
                    debug!(strategy = strategy.name(), output = %output.display(), "converted upload");
                    return Ok(output);
                }
                Err(diagnostic) => {
                    warn!(strategy = strategy.name(), %diagnostic, "conversion strategy failed");
                    failures.push(format!("{}: {}", strategy.name(), diagnostic));
                }
            }
        }

        Err(AppError::Conversion(failures.join("; ")))
    }
}

/// Primary strategy: an ffmpeg subprocess probing the container itself.
struct FfmpegStrategy {
    ffmpeg_path: String,
}

#[async_trait]
impl ConversionStrategy for FfmpegStrategy {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), String> {
        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-acodec", "libmp3lame"])
            .args(["-b:a", TARGET_BITRATE])
            .args(["-ac", &TARGET_CHANNELS.to_string()])
            .args(["-ar", &TARGET_SAMPLE_RATE.to_string()])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| format!("failed to run {}: {err}", self.ffmpeg_path))?;

        if !result.status.success() {
            return Err(format!(
                "exited with {}: {}",
                result.status,
                stderr_tail(&result.stderr)
            ));
        }
        Ok(())
    }
}

/// Fallback strategy: symphonia decodes the upload with format
/// auto-detection, then the raw PCM is encoded through ffmpeg's `s16le`
/// input, which skips the container probing the primary strategy died on.
struct SymphoniaStrategy {
    ffmpeg_path: String,
}

#[async_trait]
impl ConversionStrategy for SymphoniaStrategy {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), String> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|err| format!("failed to read upload: {err}"))?;

        let pcm = tokio::task::spawn_blocking(move || decode_to_mono_target_rate(&bytes))
            .await
            .map_err(|err| format!("decode task failed: {err}"))??;

        encode_pcm(&self.ffmpeg_path, &pcm, output).await
    }
}

/// Pipes s16le PCM at the canonical rate into ffmpeg for MP3 encoding.
async fn encode_pcm(ffmpeg_path: &str, samples: &[i16], output: &Path) -> Result<(), String> {
    let mut child = Command::new(ffmpeg_path)
        .arg("-y")
        .args(["-f", "s16le"])
        .args(["-ar", &TARGET_SAMPLE_RATE.to_string()])
        .args(["-ac", &TARGET_CHANNELS.to_string()])
        .args(["-i", "pipe:0"])
        .args(["-acodec", "libmp3lame"])
        .args(["-b:a", TARGET_BITRATE])
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| format!("failed to run {ffmpeg_path}: {err}"))?;

    let mut pcm_bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        pcm_bytes.extend_from_slice(&sample.to_le_bytes());
    }

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| "ffmpeg stdin unavailable".to_string())?;
    stdin
        .write_all(&pcm_bytes)
        .await
        .map_err(|err| format!("failed to pipe PCM to ffmpeg: {err}"))?;
    drop(stdin);

    let result = child
        .wait_with_output()
        .await
        .map_err(|err| format!("failed waiting for ffmpeg: {err}"))?;

    if !result.status.success() {
        return Err(format!(
            "exited with {}: {}",
            result.status,
            stderr_tail(&result.stderr)
        ));
    }
    Ok(())
}

/// Decodes media bytes to mono s16 samples at the canonical rate using
/// symphonia's format auto-detection. No extension hint is given; the
/// upload's declared format is exactly what we do not trust.
fn decode_to_mono_target_rate(bytes: &[u8]) -> Result<Vec<i16>, String> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| format!("failed to probe media: {err}"))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no audio track found".to_string())?;

    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err("missing codec information".to_string());
    }

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| format!("unsupported codec: {err}"))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let track_id = track.id;
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(format!("failed reading media stream: {err}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(err) => return Err(format!("failed to decode packet: {err}")),
        };

        sample_rate = decoded.spec().rate;
        let channels = decoded.spec().channels.count();

        let mut sample_buffer =
            SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buffer.copy_interleaved_ref(decoded);
        let samples = sample_buffer.samples();

        if channels <= 1 {
            mono.extend_from_slice(samples);
            continue;
        }

        for frame in samples.chunks(channels) {
            let sample = frame
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            mono.push(sample);
        }
    }

    if mono.is_empty() {
        return Err("decoded audio is empty".to_string());
    }

    let resampled = resample_linear(&mono, sample_rate, TARGET_SAMPLE_RATE);
    Ok(resampled
        .into_iter()
        .map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .collect())
}

/// Resamples a mono signal from `src_rate` to `dst_rate` via linear interpolation.
fn resample_linear(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || input.len() < 2 {
        return input.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = ((input.len() as f64) * (dst_rate as f64) / (src_rate as f64)).round() as usize;
    let out_len = out_len.max(1);

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().nth_back(499) {
        Some((idx, _)) => trimmed[idx..].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStrategy;

    #[async_trait]
    impl ConversionStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn convert(&self, _input: &Path, _output: &Path) -> Result<(), String> {
            Err("always fails".to_string())
        }
    }

    struct SucceedingStrategy;

    #[async_trait]
    impl ConversionStrategy for SucceedingStrategy {
        fn name(&self) -> &'static str {
            "succeeding"
        }
        async fn convert(&self, input: &Path, output: &Path) -> Result<(), String> {
            let bytes = std::fs::read(input).map_err(|err| err.to_string())?;
            std::fs::write(output, bytes).map_err(|err| err.to_string())
        }
    }

    fn blob(bytes: &[u8]) -> AudioBlob {
        AudioBlob {
            bytes: bytes.to_vec(),
            filename: Some("clip.webm".to_string()),
            content_type: Some("audio/webm".to_string()),
        }
    }

    #[tokio::test]
    async fn fallback_runs_after_primary_failure() {
        let normalizer = AudioNormalizer::with_strategies(vec![
            Box::new(FailingStrategy),
            Box::new(SucceedingStrategy),
        ]);
        let mut tracker = TempTracker::new();

        let output = normalizer
            .normalize(&blob(b"payload"), &mut tracker)
            .await
            .expect("fallback succeeds");
        assert_eq!(std::fs::read(&output).expect("output"), b"payload");

        tracker.cleanup();
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn all_failures_are_aggregated() {
        let normalizer = AudioNormalizer::with_strategies(vec![
            Box::new(FailingStrategy),
            Box::new(FailingStrategy),
        ]);
        let mut tracker = TempTracker::new();

        let err = normalizer
            .normalize(&blob(b""), &mut tracker)
            .await
            .expect_err("all strategies fail");
        match err {
            AppError::Conversion(detail) => {
                assert_eq!(detail.matches("failing: always fails").count(), 2);
            }
            other => panic!("expected Conversion error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn real_strategies_fail_on_empty_upload() {
        let cfg = crate::config::AppConfig::for_tests();
        let normalizer = AudioNormalizer::new(&cfg);
        let mut tracker = TempTracker::new();

        let err = normalizer
            .normalize(&blob(b""), &mut tracker)
            .await
            .expect_err("zero-byte upload cannot convert");
        assert!(matches!(err, AppError::Conversion(_)));

        let tracked: Vec<_> = tracker.tracked().to_vec();
        assert!(!tracked.is_empty());
        tracker.cleanup();
        for path in tracked {
            assert!(!path.exists(), "temp file left behind: {}", path.display());
        }
    }

    #[test]
    fn tracker_cleanup_is_idempotent() {
        let mut tracker = TempTracker::new();
        let path = tracker.create(".tmp").expect("temp file");
        assert!(path.exists());
        tracker.cleanup();
        assert!(!path.exists());
        tracker.cleanup();
    }

    #[test]
    fn resample_preserves_constant_signal() {
        let input = vec![0.25_f32; 100];
        let out = resample_linear(&input, 48_000, 44_100);
        assert!(!out.is_empty());
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
    }
}
