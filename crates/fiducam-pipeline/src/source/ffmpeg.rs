use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use fiducam_core::{Frame, PixelOrder};

use super::{now_ms, FrameSource, ReadError, SourceError};
use crate::config::{CameraConfig, SourceKind, SourceSpec};

/// Frames buffered between the decoder thread and the reader.
const QUEUE_SIZE: usize = 2;

/// Minimum time between two restarts of a live stream's decoder.
const RESTART_INTERVAL: Duration = Duration::from_secs(1);

/// Camera, network stream or video file decoded by an `ffmpeg` child
/// process into raw BGR frames.
///
/// A background thread reads fixed-size frames from the child's stdout into
/// a small bounded channel, so a slow consumer backpressures the decoder.
/// Opening waits for the first frame. When the decoder of a video file exits
/// the stream ends; for cameras and network streams it is restarted and the
/// read reports a transient failure. The child is killed when the source is
/// dropped.
pub struct FfmpegSource {
    config: CameraConfig,
    program: String,
    args: Vec<String>,
    stream: Decoder,
    pending: Option<Frame>,
    timeout: Duration,
    description: String,
    restarted_at: Option<Instant>,
}

/// A running decoder process and the channel its reader thread feeds.
struct Decoder {
    child: Child,
    rx: Receiver<Result<Frame, ReadError>>,
}

impl Decoder {
    fn start(config: &CameraConfig, program: &str, args: &[String]) -> Result<Self, SourceError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => {
                    SourceError::unavailable(&config.source, format!("{program} executable not found"))
                }
                _ => SourceError::Spawn(err),
            })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::unavailable(&config.source, format!("failed to capture {program} stdout")));
        };

        let (tx, rx) = bounded(QUEUE_SIZE);
        let (width, height) = (config.width, config.height);
        let spawned = thread::Builder::new()
            .name(format!("ffmpeg-{}", config.id))
            .spawn(move || reader_loop(stdout, width, height, tx));
        if let Err(err) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Spawn(err));
        }
        Ok(Self { child, rx })
    }

    /// Why the decoder stopped producing output. Reaps the child.
    fn exit_reason(&mut self) -> String {
        match self.child.wait() {
            Ok(status) => format!("decoder exited ({status})"),
            Err(err) => format!("decoder lost: {err}"),
        }
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Command-line arguments (without the program name) that decode `config`
/// to `bgr24` rawvideo on stdout.
pub fn ffmpeg_args(config: &CameraConfig) -> Result<Vec<String>, SourceError> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(String::from)
        .collect();

    match (config.kind, &config.source) {
        (SourceKind::LocalCamera, spec) => {
            let device = match spec {
                SourceSpec::Index(i) => format!("/dev/video{i}"),
                SourceSpec::Uri(uri) => uri.clone(),
            };
            args.extend(["-f".into(), "video4linux2".into()]);
            args.extend([
                "-video_size".into(),
                format!("{}x{}", config.width, config.height),
            ]);
            args.extend(["-i".into(), device]);
        }
        (SourceKind::NetworkStream, SourceSpec::Uri(uri)) => {
            if uri.starts_with("rtsp://") {
                args.extend(["-rtsp_transport".into(), "tcp".into()]);
            }
            args.extend(["-fflags".into(), "nobuffer".into(), "-flags".into(), "low_delay".into()]);
            args.extend(["-i".into(), uri.clone()]);
        }
        (SourceKind::LocalVideo, SourceSpec::Uri(path)) => {
            args.extend(["-i".into(), path.clone()]);
        }
        (kind, spec) => {
            return Err(SourceError::unavailable(
                spec,
                format!("{kind:?} sources cannot be decoded with ffmpeg"),
            ));
        }
    }

    args.extend([
        "-an".into(),
        "-vf".into(),
        format!("scale={}:{}", config.width, config.height),
        "-pix_fmt".into(),
        "bgr24".into(),
        "-f".into(),
        "rawvideo".into(),
        "-".into(),
    ]);
    Ok(args)
}

impl FfmpegSource {
    /// Start `ffmpeg` for `config` and wait for its first frame.
    pub fn spawn(config: &CameraConfig) -> Result<Self, SourceError> {
        check_input_exists(config)?;
        let args = ffmpeg_args(config)?;
        Self::open_command(config, "ffmpeg", args)
    }

    /// Run `program args` as the decoder; it must write `bgr24` frames of the
    /// configured size to stdout.
    pub(crate) fn open_command(config: &CameraConfig, program: &str, args: Vec<String>) -> Result<Self, SourceError> {
        let description = format!("ffmpeg {:?} {}", config.kind, config.source);
        let mut stream = Decoder::start(config, program, &args)?;

        let open_timeout = Duration::from_millis(config.open_timeout_ms.max(1));
        let first = match stream.rx.recv_timeout(open_timeout) {
            Ok(Ok(frame)) => frame,
            Ok(Err(err)) => {
                return Err(SourceError::unavailable(&config.source, format!("first frame unusable: {err}")));
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(SourceError::unavailable(
                    &config.source,
                    format!("no frame within {} ms", open_timeout.as_millis()),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SourceError::unavailable(&config.source, stream.exit_reason()));
            }
        };

        log::info!("opened {description}");
        Ok(Self {
            config: config.clone(),
            program: program.to_owned(),
            args,
            stream,
            pending: Some(first),
            timeout: Duration::from_millis(config.read_timeout_ms.max(1)),
            description,
            restarted_at: None,
        })
    }

    /// Live sources keep running after their decoder dies.
    fn is_live(&self) -> bool {
        self.config.kind != SourceKind::LocalVideo
    }

    fn restart(&mut self) -> ReadError {
        let reason = self.stream.exit_reason();
        if let Some(at) = self.restarted_at {
            let wait = RESTART_INTERVAL.saturating_sub(at.elapsed());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
        self.restarted_at = Some(Instant::now());

        log::warn!("{}: {reason}, restarting", self.description);
        match Decoder::start(&self.config, &self.program, &self.args) {
            Ok(stream) => {
                self.stream = stream;
                ReadError::Transient(format!("{reason}; decoder restarted"))
            }
            Err(err) => ReadError::Corrupt(format!("{reason}; restart failed: {err}")),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.stream.rx.recv_timeout(self.timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => Err(ReadError::Transient(format!(
                "no frame within {} ms",
                self.timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) if self.is_live() => Err(self.restart()),
            Err(RecvTimeoutError::Disconnected) => Err(ReadError::EndOfStream),
        }
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

fn check_input_exists(config: &CameraConfig) -> Result<(), SourceError> {
    let path = match (config.kind, &config.source) {
        (SourceKind::LocalCamera, SourceSpec::Index(i)) => format!("/dev/video{i}"),
        (SourceKind::LocalCamera | SourceKind::LocalVideo, SourceSpec::Uri(p)) => p.clone(),
        _ => return Ok(()),
    };
    if Path::new(&path).exists() {
        Ok(())
    } else {
        Err(SourceError::unavailable(&config.source, format!("{path} does not exist")))
    }
}

/// Read whole frames until the stream ends or the receiver goes away.
fn reader_loop(mut stdout: impl Read, width: u32, height: u32, tx: Sender<Result<Frame, ReadError>>) {
    let frame_bytes = width as usize * height as usize * 3;
    let mut buffer = vec![0u8; frame_bytes];

    loop {
        let item = match fill(&mut stdout, &mut buffer) {
            Ok(0) => break,
            Ok(n) if n < frame_bytes => {
                Err(ReadError::Corrupt(format!("short frame: {n} of {frame_bytes} bytes")))
            }
            Ok(_) => Frame::new(width, height, PixelOrder::Bgr, buffer.clone())
                .map(|f| f.with_timestamp(now_ms()))
                .map_err(|e| ReadError::Corrupt(e.to_string())),
            Err(err) => Err(ReadError::Corrupt(err.to_string())),
        };
        let last = item.is_err();
        if tx.send(item).is_err() || last {
            break;
        }
    }
    log::debug!("ffmpeg reader finished");
}

/// Like `read_exact`, but reports how much was read before EOF.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cam(kind: SourceKind, source: SourceSpec) -> CameraConfig {
        CameraConfig::new("t", source, kind)
    }

    #[test]
    fn device_index_maps_to_v4l2() {
        let args = ffmpeg_args(&cam(SourceKind::LocalCamera, SourceSpec::Index(3))).expect("args");
        let joined = args.join(" ");
        assert!(joined.contains("-f video4linux2 -video_size 640x480 -i /dev/video3"));
        assert!(joined.ends_with("-pix_fmt bgr24 -f rawvideo -"));
    }

    #[test]
    fn rtsp_streams_use_tcp() {
        let args = ffmpeg_args(&cam(
            SourceKind::NetworkStream,
            SourceSpec::Uri("rtsp://cam.local/stream".into()),
        ))
        .expect("args");
        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(args.windows(2).any(|w| w == ["-i", "rtsp://cam.local/stream"]));
    }

    #[test]
    fn image_kind_is_not_an_ffmpeg_source() {
        let err = ffmpeg_args(&cam(SourceKind::LocalImage, SourceSpec::Uri("a.png".into()))).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn reader_splits_stream_into_frames_and_flags_short_tail() {
        let (w, h) = (4u32, 2u32);
        let mut bytes = vec![7u8; 24 * 2];
        bytes.extend([1u8; 10]);
        let (tx, rx) = bounded(8);
        reader_loop(Cursor::new(bytes), w, h, tx);

        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].as_ref().is_ok_and(|f| f.width() == 4 && f.as_bytes()[0] == 7));
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(ReadError::Corrupt(_))));
    }

    /// A 4x2 camera whose decoder is `head -c <bytes> /dev/zero`.
    #[cfg(unix)]
    fn zero_frames(kind: SourceKind, bytes: usize) -> Result<FfmpegSource, SourceError> {
        let mut config = cam(kind, SourceSpec::Uri("rtsp://cam.local/stream".into()));
        config.width = 4;
        config.height = 2;
        config.open_timeout_ms = 5_000;
        let args = vec!["-c".to_owned(), bytes.to_string(), "/dev/zero".to_owned()];
        FfmpegSource::open_command(&config, "head", args)
    }

    #[cfg(unix)]
    #[test]
    fn decoder_without_output_is_unavailable() {
        let err = zero_frames(SourceKind::NetworkStream, 0).err().expect("open must fail");
        assert!(matches!(err, SourceError::Unavailable { .. }), "{err}");
        assert!(err.to_string().contains("rtsp://cam.local/stream"));
    }

    #[cfg(unix)]
    #[test]
    fn missing_decoder_program_is_unavailable() {
        let config = cam(SourceKind::NetworkStream, SourceSpec::Uri("rtsp://cam.local/stream".into()));
        let err = FfmpegSource::open_command(&config, "fiducam-no-such-decoder", Vec::new())
            .err()
            .expect("open must fail");
        assert!(matches!(err, SourceError::Unavailable { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn video_file_ends_when_decoder_exits() {
        let mut source = zero_frames(SourceKind::LocalVideo, 48).expect("open");
        assert!(source.read_frame().is_ok());
        assert!(source.read_frame().is_ok());
        assert_eq!(source.read_frame(), Err(ReadError::EndOfStream));
    }

    #[cfg(unix)]
    #[test]
    fn live_stream_restarts_its_decoder() {
        let mut source = zero_frames(SourceKind::NetworkStream, 24).expect("open");
        assert!(source.read_frame().is_ok());
        assert!(matches!(source.read_frame(), Err(ReadError::Transient(_))));
        // The restarted decoder delivers again.
        assert!(source.read_frame().is_ok());
    }

    #[test]
    fn clean_end_closes_the_channel() {
        let (tx, rx) = bounded(8);
        reader_loop(Cursor::new(vec![0u8; 24]), 4, 2, tx);
        assert_eq!(rx.iter().count(), 1);
    }
}
