//! End-to-end session tests: scripted audio in, WAV files and events out.

use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use uttercap::{
    AudioFormat, AudioSource, CaptureError, PcmFrame, RecordingSession, SessionConfig,
    SessionEvent, WavSink,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replays a fixed script of frames, then reports closure. Each read is
/// slightly delayed so the producer/consumer interleaving is realistic.
struct ScriptedSource {
    frames: VecDeque<PcmFrame>,
    read_delay: Duration,
}

impl ScriptedSource {
    fn new(frames: Vec<PcmFrame>) -> Self {
        Self {
            frames: frames.into(),
            read_delay: Duration::from_millis(1),
        }
    }
}

impl AudioSource for ScriptedSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    fn frame_samples(&self) -> usize {
        320
    }

    fn read_frame(&mut self) -> uttercap::error::Result<PcmFrame> {
        std::thread::sleep(self.read_delay);
        self.frames.pop_front().ok_or(CaptureError::SourceClosed)
    }
}

/// A source that produces frames forever, for cancellation tests.
struct EndlessSource {
    frame: PcmFrame,
}

impl AudioSource for EndlessSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    fn frame_samples(&self) -> usize {
        self.frame.len()
    }

    fn read_frame(&mut self) -> uttercap::error::Result<PcmFrame> {
        std::thread::sleep(Duration::from_millis(2));
        Ok(self.frame.clone())
    }
}

/// Sink provider handing out real files under the OS temp directory.
/// Plays the role of the external naming/corpus collaborator.
fn temp_file_sinks(label: &str) -> (impl FnMut() -> uttercap::error::Result<(PathBuf, Box<dyn WavSink>)>, Arc<Mutex<Vec<PathBuf>>>)
{
    static UNIQUE: AtomicU64 = AtomicU64::new(0);
    let run = UNIQUE.fetch_add(1, Ordering::Relaxed);
    let label = label.to_string();
    let paths: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&paths);
    let mut index = 0u32;
    let provider = move || -> uttercap::error::Result<(PathBuf, Box<dyn WavSink>)> {
        let path = std::env::temp_dir().join(format!(
            "uttercap-{label}-{}-{run}-{index}.wav",
            std::process::id()
        ));
        index += 1;
        let file = File::create(&path)?;
        recorded.lock().unwrap().push(path.clone());
        Ok((path, Box::new(file) as Box<dyn WavSink>))
    };
    (provider, paths)
}

fn collect_until_finished(rx: &Receiver<SessionEvent>, timeout: Duration) -> Vec<SessionEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or_else(|| panic!("timed out; events so far: {events:?}"));
        let event = rx.recv_timeout(remaining).expect("event channel closed");
        let finished = event == SessionEvent::Finished;
        events.push(event);
        if finished {
            return events;
        }
    }
}

fn silent_frames(count: usize) -> impl Iterator<Item = PcmFrame> {
    std::iter::repeat_with(|| PcmFrame::silent(320)).take(count)
}

fn loud_frames(count: usize, amplitude: i16) -> impl Iterator<Item = PcmFrame> {
    std::iter::repeat_with(move || PcmFrame::new(vec![amplitude; 320])).take(count)
}

#[test]
fn scenario_five_silent_three_loud_five_silent_produces_one_wav() {
    init_tracing();

    let mut frames = Vec::new();
    frames.extend(silent_frames(5));
    frames.extend(loud_frames(3, 1000));
    frames.extend(silent_frames(5));

    let (sinks, paths) = temp_file_sinks("scenario");
    let (session, rx) = RecordingSession::start(
        SessionConfig::default(),
        move || Ok(ScriptedSource::new(frames)),
        sinks,
    )
    .expect("session should start");

    let events = collect_until_finished(&rx, Duration::from_secs(5));
    session.stop();

    // SpeechStart at frame 6, SpeechEnd at frame 9, one utterance total.
    assert_eq!(events[0], SessionEvent::Started);
    assert_eq!(events[1], SessionEvent::SpeechStart { utterance: 0 });
    let (path, payload_len) = match &events[2] {
        SessionEvent::UtteranceCompleted {
            utterance: 0,
            path,
            payload_len,
        } => (path.clone(), *payload_len),
        other => panic!("expected UtteranceCompleted, got {other:?}"),
    };
    assert_eq!(events[3], SessionEvent::Finished);
    assert_eq!(events.len(), 4);

    // Payload = exactly the 3 loud frames.
    assert_eq!(payload_len, 3 * 320 * 2);

    // The file on disk is a WAV that hound accepts, with consistent header.
    let mut reader = hound::WavReader::open(&path).expect("hound rejected the file");
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 3 * 320);
    assert!(samples.iter().all(|&s| s == 1000));

    // Raw header fields: RIFF chunk size = payload + 36, data size = payload.
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(
        u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        payload_len + 36
    );
    assert_eq!(
        u32::from_le_bytes(bytes[40..44].try_into().unwrap()),
        payload_len
    );

    for path in paths.lock().unwrap().iter() {
        let _ = std::fs::remove_file(path);
    }
}

#[test]
fn multiple_speech_bursts_produce_multiple_wavs() {
    init_tracing();

    let mut frames = Vec::new();
    for _ in 0..3 {
        frames.extend(silent_frames(4));
        frames.extend(loud_frames(2, 2000));
    }
    frames.extend(silent_frames(4));

    let (sinks, paths) = temp_file_sinks("bursts");
    let (session, rx) = RecordingSession::start(
        SessionConfig::default(),
        move || Ok(ScriptedSource::new(frames)),
        sinks,
    )
    .unwrap();

    let events = collect_until_finished(&rx, Duration::from_secs(5));
    session.stop();

    let completed: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::UtteranceCompleted { utterance, .. } => Some(*utterance),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![0, 1, 2]);

    let paths = paths.lock().unwrap();
    assert_eq!(paths.len(), 3);
    for path in paths.iter() {
        let reader = hound::WavReader::open(path).expect("valid wav");
        assert_eq!(reader.len(), 2 * 320); // 2 loud frames each
        let _ = std::fs::remove_file(path);
    }
}

#[test]
fn stop_during_blocked_pop_exits_promptly() {
    init_tracing();

    // Source produces only silence: the VAD never starts an utterance and
    // the processing thread spends its life parked in pop().
    let (sinks, _) = temp_file_sinks("cancel");
    let (session, rx) = RecordingSession::start(
        SessionConfig::default(),
        move || {
            Ok(EndlessSource {
                frame: PcmFrame::silent(320),
            })
        },
        sinks,
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    session.stop();
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "stop() must not deadlock against a blocked pop()"
    );

    let events = collect_until_finished(&rx, Duration::from_secs(1));
    assert_eq!(events.last(), Some(&SessionEvent::Finished));
}

#[test]
fn stop_mid_speech_finalizes_in_flight_utterance() {
    init_tracing();

    // Calibration frame, then loud frames forever: the utterance never ends
    // naturally, so stop() must finalize it.
    let mut frames = Vec::new();
    frames.extend(silent_frames(2));
    frames.extend(loud_frames(10_000, 1500));

    let (sinks, paths) = temp_file_sinks("midspeech");
    let (session, rx) = RecordingSession::start(
        SessionConfig::default(),
        move || Ok(ScriptedSource::new(frames)),
        sinks,
    )
    .unwrap();

    // Wait until speech has started, then stop mid-utterance.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("never saw SpeechStart");
        match rx.recv_timeout(remaining).expect("event channel closed") {
            SessionEvent::SpeechStart { .. } => break,
            _ => continue,
        }
    }
    session.stop();

    let events = collect_until_finished(&rx, Duration::from_secs(5));
    let completed = events.iter().find_map(|e| match e {
        SessionEvent::UtteranceCompleted {
            path, payload_len, ..
        } => Some((path.clone(), *payload_len)),
        _ => None,
    });
    let (path, payload_len) = completed.expect("in-flight utterance must be finalized, not discarded");

    assert!(payload_len > 0);
    // Header must be valid, not a zeroed placeholder.
    let reader = hound::WavReader::open(&path).expect("finalized header expected");
    assert_eq!(u32::from(reader.len()) * 2, payload_len);

    for path in paths.lock().unwrap().iter() {
        let _ = std::fs::remove_file(path);
    }
}

#[test]
fn bounded_queue_session_still_completes() {
    init_tracing();

    let mut frames = Vec::new();
    frames.extend(silent_frames(5));
    frames.extend(loud_frames(3, 1000));
    frames.extend(silent_frames(5));

    let config = SessionConfig {
        queue_capacity: Some(64),
        ..SessionConfig::default()
    };
    let (sinks, paths) = temp_file_sinks("bounded");
    let (session, rx) = RecordingSession::start(
        config,
        move || Ok(ScriptedSource::new(frames)),
        sinks,
    )
    .unwrap();

    let events = collect_until_finished(&rx, Duration::from_secs(5));
    session.stop();

    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::UtteranceCompleted { .. })));

    for path in paths.lock().unwrap().iter() {
        let _ = std::fs::remove_file(path);
    }
}
