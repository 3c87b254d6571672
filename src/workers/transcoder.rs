use crate::config::settings::MediaConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

pub const MASTER_PLAYLIST: &str = "master.m3u8";
const SEGMENT_SECONDS: u32 = 6;
const AUDIO_BITRATE_K: u32 = 128;
const STDERR_TAIL_LINES: usize = 20;

/// Height and target video bitrate (kbps) of each rung, lowest first.
const LADDER: [(u32, u32); 3] = [(360, 800), (720, 2800), (1080, 5000)];

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Source file {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("ffprobe failed: {0}")]
    Probe(String),
    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("Transcoder finished but {0} was not written")]
    MissingManifest(PathBuf),
    #[error("Transcode timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Transcoder panicked")]
    Panicked,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces an HLS bundle for one source file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Writes the bundle under a directory named `job_id` and returns the
    /// path of the master playlist.
    async fn transcode(&self, source: &Path, job_id: &str) -> Result<PathBuf, TranscodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendition {
    pub height: u32,
    pub video_bitrate_k: u32,
}

/// Picks the renditions to encode for a source of `source_height` pixels.
///
/// Rungs above the source are dropped; a source that falls between rungs (or
/// below the lowest one) keeps its own height as the top rendition, with the
/// bitrate of the next rung scaled down to match.
pub fn plan_renditions(source_height: u32, source_bitrate_k: Option<u32>) -> Vec<Rendition> {
    // Scaled outputs need an even height of at least 2.
    let source_height = source_height.max(2);
    let source_height = source_height - source_height % 2;
    let mut renditions: Vec<Rendition> = LADDER
        .iter()
        .filter(|(height, _)| *height <= source_height)
        .map(|&(height, video_bitrate_k)| Rendition {
            height,
            video_bitrate_k,
        })
        .collect();

    let on_a_rung = renditions.iter().any(|r| r.height == source_height);
    if let Some(&(next_height, next_bitrate)) =
        LADDER.iter().find(|(height, _)| *height > source_height)
    {
        if !on_a_rung {
            renditions.push(Rendition {
                height: source_height,
                video_bitrate_k: next_bitrate * source_height / next_height,
            });
        }
    }

    if let Some(cap) = source_bitrate_k.filter(|k| *k > 0) {
        for r in &mut renditions {
            r.video_bitrate_k = r.video_bitrate_k.min(cap);
        }
    }
    renditions
}

/// Arguments for a single ffmpeg run that writes every rendition plus the
/// master playlist into `out_dir`.
pub fn build_ffmpeg_args(
    source: &Path,
    out_dir: &Path,
    renditions: &[Rendition],
    has_audio: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        source.display().to_string(),
    ];

    for _ in renditions {
        args.extend(["-map".into(), "0:v:0".into()]);
        if has_audio {
            args.extend(["-map".into(), "0:a:0".into()]);
        }
    }

    for (i, r) in renditions.iter().enumerate() {
        args.extend([
            format!("-filter:v:{i}"),
            format!("scale=-2:{}", r.height),
            format!("-c:v:{i}"),
            "libx264".into(),
            format!("-b:v:{i}"),
            format!("{}k", r.video_bitrate_k),
            format!("-maxrate:v:{i}"),
            format!("{}k", r.video_bitrate_k * 107 / 100),
            format!("-bufsize:v:{i}"),
            format!("{}k", r.video_bitrate_k * 3 / 2),
        ]);
    }

    args.extend([
        "-preset".into(),
        "veryfast".into(),
        "-g".into(),
        "48".into(),
        "-keyint_min".into(),
        "48".into(),
        "-sc_threshold".into(),
        "0".into(),
    ]);

    if has_audio {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{AUDIO_BITRATE_K}k"),
            "-ac".into(),
            "2".into(),
        ]);
    }

    let stream_map = (0..renditions.len())
        .map(|i| {
            if has_audio {
                format!("v:{i},a:{i}")
            } else {
                format!("v:{i}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        SEGMENT_SECONDS.to_string(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_flags".into(),
        "independent_segments".into(),
        "-hls_segment_filename".into(),
        out_dir.join("v%v").join("segment_%03d.ts").display().to_string(),
        "-master_pl_name".into(),
        MASTER_PLAYLIST.into(),
        "-var_stream_map".into(),
        stream_map,
        out_dir.join("v%v").join("index.m3u8").display().to_string(),
    ]);

    args
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    bit_rate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub bitrate_k: Option<u32>,
    pub has_audio: bool,
}

/// Reads the first video stream's geometry out of `ffprobe -print_format json`.
pub fn parse_probe(json: &[u8]) -> Result<SourceInfo, TranscodeError> {
    let probe: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| TranscodeError::Probe(e.to_string()))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| TranscodeError::Probe("no video stream".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(TranscodeError::Probe("video stream has no dimensions".to_string())),
    };

    let bitrate_k = probe
        .format
        .and_then(|f| f.bit_rate)
        .and_then(|b| b.parse::<u64>().ok())
        .map(|bps| (bps / 1000) as u32);

    Ok(SourceInfo {
        width,
        height,
        bitrate_k,
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs ffprobe and ffmpeg as child processes.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
    output_root: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            output_root: config.hls_dir.clone(),
        }
    }

    async fn probe(&self, source: &Path) -> Result<SourceInfo, TranscodeError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(TranscodeError::Probe(stderr_tail(&output.stderr)));
        }
        parse_probe(&output.stdout)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, source: &Path, job_id: &str) -> Result<PathBuf, TranscodeError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(TranscodeError::SourceMissing(source.to_path_buf()));
        }

        let info = self.probe(source).await?;
        let renditions = plan_renditions(info.height, info.bitrate_k);
        info!(
            job_id,
            width = info.width,
            height = info.height,
            renditions = ?renditions.iter().map(|r| r.height).collect::<Vec<_>>(),
            "Probed source video"
        );

        let out_dir = self.output_root.join(job_id);
        if tokio::fs::try_exists(&out_dir).await? {
            tokio::fs::remove_dir_all(&out_dir).await?;
        }
        for i in 0..renditions.len() {
            tokio::fs::create_dir_all(out_dir.join(format!("v{i}"))).await?;
        }

        let args = build_ffmpeg_args(source, &out_dir, &renditions, info.has_audio);
        debug!(job_id, ?args, "Spawning ffmpeg");

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(TranscodeError::Process {
                program: self.ffmpeg.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let master = out_dir.join(MASTER_PLAYLIST);
        if !tokio::fs::try_exists(&master).await? {
            return Err(TranscodeError::MissingManifest(master));
        }
        Ok(master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heights(renditions: &[Rendition]) -> Vec<u32> {
        renditions.iter().map(|r| r.height).collect()
    }

    #[test]
    fn ladder_is_capped_at_source_height() {
        assert_eq!(heights(&plan_renditions(1080, None)), vec![360, 720, 1080]);
        assert_eq!(heights(&plan_renditions(2160, None)), vec![360, 720, 1080]);
        assert_eq!(heights(&plan_renditions(720, None)), vec![360, 720]);
    }

    #[test]
    fn in_between_source_keeps_its_own_height() {
        let plan = plan_renditions(540, None);
        assert_eq!(heights(&plan), vec![360, 540]);
        // 2800k scaled by 540/720
        assert_eq!(plan[1].video_bitrate_k, 2100);
    }

    #[test]
    fn tiny_source_gets_a_single_even_rendition() {
        let plan = plan_renditions(241, None);
        assert_eq!(heights(&plan), vec![240]);
    }

    #[test]
    fn one_pixel_source_still_gets_a_rendition() {
        for height in [0, 1] {
            let plan = plan_renditions(height, None);
            assert_eq!(heights(&plan), vec![2], "height {height}");
            assert!(plan[0].video_bitrate_k > 0);
        }

        let plan = plan_renditions(1, None);
        let args = build_ffmpeg_args(Path::new("in.mp4"), Path::new("out"), &plan, false);
        let map_at = args.iter().position(|a| a == "-var_stream_map").unwrap();
        assert_eq!(args[map_at + 1], "v:0");
        assert!(args.contains(&"scale=-2:2".to_string()));
    }

    #[test]
    fn bitrates_never_exceed_the_source() {
        let plan = plan_renditions(1080, Some(1500));
        assert!(plan.iter().all(|r| r.video_bitrate_k <= 1500));
        assert_eq!(plan[0].video_bitrate_k, 800);
    }

    #[test]
    fn ffmpeg_args_map_every_rendition() {
        let renditions = plan_renditions(720, None);
        let args = build_ffmpeg_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/out/abc"),
            &renditions,
            true,
        );

        let map_at = args.iter().position(|a| a == "-var_stream_map").unwrap();
        assert_eq!(args[map_at + 1], "v:0,a:0 v:1,a:1");
        assert!(args.contains(&"scale=-2:720".to_string()));
        assert!(args.contains(&MASTER_PLAYLIST.to_string()));
        assert_eq!(args.last().unwrap(), "/out/abc/v%v/index.m3u8");
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 4);
    }

    #[test]
    fn ffmpeg_args_without_audio_skip_audio_maps() {
        let renditions = plan_renditions(360, None);
        let args = build_ffmpeg_args(Path::new("in.mov"), Path::new("out"), &renditions, false);

        let map_at = args.iter().position(|a| a == "-var_stream_map").unwrap();
        assert_eq!(args[map_at + 1], "v:0");
        assert!(!args.contains(&"-c:a".to_string()));
    }

    #[test]
    fn probe_output_is_parsed() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720}
            ],
            "format": {"bit_rate": "2500000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(
            info,
            SourceInfo {
                width: 1280,
                height: 720,
                bitrate_k: Some(2500),
                has_audio: true
            }
        );
    }

    #[test]
    fn probe_without_video_is_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(parse_probe(json), Err(TranscodeError::Probe(_))));
    }

    #[tokio::test]
    async fn missing_source_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            output_root: dir.path().to_path_buf(),
        };

        let result = transcoder
            .transcode(&dir.path().join("nope.mp4"), "nope")
            .await;
        assert!(matches!(result, Err(TranscodeError::SourceMissing(_))));
    }
}
