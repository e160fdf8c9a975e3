//! The chunk loop: source, detector, switch and router wired together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::io::source::ChunkSource;
use crate::process::detect::{Detection, SyncDetector};
use crate::process::route::{OutputRouter, RouterStats};
use crate::process::switch::{DebouncedSwitch, ModeTransition, StreamMode};
use crate::structs::chunk::Chunk;
use crate::structs::config::EngineConfig;
use crate::utils::errors::{Error, RunError};

/// Shared stop flag, checked before every source read and by sources that
/// wait for input.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives per-chunk progress from a running session.
pub trait SessionObserver {
    /// Called after classification, before the chunk is delivered under `mode`.
    fn on_chunk(&mut self, _chunk: &Chunk, _detection: &Detection, _mode: StreamMode) {}

    fn on_transition(&mut self, _seq: u64, _transition: ModeTransition, _detection: &Detection) {}
}

impl SessionObserver for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub end: EndReason,
    pub chunks: u64,
    pub transitions: u64,
    pub final_mode: StreamMode,
    pub stats: RouterStats,
}

pub struct Session<S: ChunkSource> {
    source: S,
    detector: SyncDetector,
    switch: DebouncedSwitch,
    router: OutputRouter,
    cancel: CancelToken,
}

impl<S: ChunkSource> Session<S> {
    pub fn new(source: S, router: OutputRouter, config: &EngineConfig) -> Self {
        Self {
            source,
            detector: SyncDetector::new(),
            switch: DebouncedSwitch::new(config.det_window),
            router,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs until the source is exhausted or the session is cancelled, then
    /// drains any live pipeline and closes both sinks.
    pub fn run(self, observer: &mut dyn SessionObserver) -> Result<RunSummary, RunError> {
        let Session {
            mut source,
            mut detector,
            mut switch,
            mut router,
            cancel,
        } = self;

        source.watch_cancel(cancel.clone());

        let mut chunks = 0u64;
        let mut transitions = 0u64;

        let end = loop {
            if cancel.is_cancelled() {
                log::info!("Stopping after {chunks} chunks");
                break EndReason::Cancelled;
            }

            let chunk = match source.next_chunk() {
                Ok(chunk) => chunk,
                Err(Error::SourceExhausted) if cancel.is_cancelled() => {
                    log::info!("Stopping after {chunks} chunks");
                    break EndReason::Cancelled;
                }
                Err(Error::SourceExhausted) => {
                    log::info!("Input exhausted after {chunks} chunks");
                    break EndReason::Exhausted;
                }
                Err(e) => return Err(abort(router, e, None)),
            };
            let seq = chunk.seq;

            if source.take_discontinuity() {
                log::debug!("Input restarted before chunk {seq}, clearing detector state");
                detector.reset();
            }
            let detection = detector.classify(&chunk.data);
            if let Some(transition) = switch.observe(detection.classification) {
                transitions += 1;
                match (transition.to, detection.burst) {
                    (StreamMode::Compressed, Some(burst)) => {
                        log::info!("Chunk {seq}: {transition}, detected {burst}")
                    }
                    _ => log::info!("Chunk {seq}: {transition}"),
                }
                observer.on_transition(seq, transition, &detection);
                if let Err(e) = router.on_transition(transition) {
                    return Err(abort(router, e, Some(seq)));
                }
            }

            let mode = switch.mode();
            observer.on_chunk(&chunk, &detection, mode);
            if let Err(e) = router.deliver(chunk, mode) {
                return Err(abort(router, e, Some(seq)));
            }
            chunks += 1;
        };

        let final_mode = switch.mode();
        let stats = router.shutdown().map_err(|e| RunError::new(e, None))?;
        Ok(RunSummary {
            end,
            chunks,
            transitions,
            final_mode,
            stats,
        })
    }
}

/// Tears the router down after a fatal error and returns that error.
fn abort(router: OutputRouter, error: Error, seq: Option<u64>) -> RunError {
    if let Err(e) = router.shutdown() {
        log::warn!("Shutdown after {} also failed: {e}", error.kind());
    }
    RunError::new(error, seq)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::num::NonZeroUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::io::sink::Sink;
    use crate::io::source::ReaderSource;
    use crate::process::detect::Classification;
    use crate::structs::format::AudioFormat;
    use crate::structs::preamble::{BurstPreamble, DataType};
    use crate::structs::route::OutputRoute;
    use crate::testing::{FakeFactory, ScriptedReader, SharedBuffer};
    use crate::utils::errors::{Component, ErrorKind, SinkRole};

    const CHUNK_FRAMES: usize = 4;
    const CHUNK_BYTES: usize = CHUNK_FRAMES * 4;

    fn config() -> EngineConfig {
        EngineConfig {
            chunk_frames: CHUNK_FRAMES,
            det_window: NonZeroUsize::new(2).unwrap(),
            drain_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn pcm_bytes(seq: u64) -> Vec<u8> {
        (0..CHUNK_BYTES).map(|i| ((i as u64 + seq) & 0x0F) as u8).collect()
    }

    fn ac3_bytes(seq: u64) -> Vec<u8> {
        let preamble = BurstPreamble {
            data_type: DataType::Ac3,
            error: false,
            info: 0,
            stream_number: 0,
            length_code: 64,
        };
        let mut bytes = preamble.to_bytes().to_vec();
        bytes.extend((0..CHUNK_BYTES - bytes.len()).map(|i| (i as u64 * 3 + seq) as u8 & 0x3F));
        bytes
    }

    /// Scripted chunk source; optionally endless compressed chunks once the
    /// script runs out.
    struct ScriptedSource {
        script: VecDeque<Vec<u8>>,
        endless: bool,
        next_seq: u64,
    }

    impl ScriptedSource {
        fn new(pattern: &[(bool, usize)]) -> Self {
            let mut script = VecDeque::new();
            let mut seq = 0;
            for &(compressed, count) in pattern {
                for _ in 0..count {
                    script.push_back(if compressed { ac3_bytes(seq) } else { pcm_bytes(seq) });
                    seq += 1;
                }
            }
            Self {
                script,
                endless: false,
                next_seq: 0,
            }
        }
    }

    impl ChunkSource for ScriptedSource {
        fn next_chunk(&mut self) -> Result<Chunk, Error> {
            let data = match self.script.pop_front() {
                Some(data) => data,
                None if self.endless => ac3_bytes(self.next_seq),
                None => return Err(Error::SourceExhausted),
            };
            let chunk = Chunk::new(self.next_seq, AudioFormat::STEREO_S16LE, data);
            self.next_seq += 1;
            Ok(chunk)
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u64, Classification, StreamMode)>,
        transitions: Vec<(u64, ModeTransition, Option<DataType>)>,
        cancel_after: Option<(u64, CancelToken)>,
    }

    impl SessionObserver for Recorder {
        fn on_chunk(&mut self, chunk: &Chunk, detection: &Detection, mode: StreamMode) {
            self.seen.push((chunk.seq, detection.classification, mode));
            if let Some((after, token)) = &self.cancel_after {
                if chunk.seq >= *after {
                    token.cancel();
                }
            }
        }

        fn on_transition(&mut self, seq: u64, transition: ModeTransition, detection: &Detection) {
            self.transitions
                .push((seq, transition, detection.burst.map(|b| b.data_type)));
        }
    }

    struct Outputs {
        pcm: SharedBuffer,
        decoded: SharedBuffer,
        factory: FakeFactory,
    }

    /// Decodes to the input's frame size so fed and decoded byte counts match.
    fn router(factory: FakeFactory, config: &EngineConfig) -> (OutputRouter, Outputs) {
        router_decoding_to(factory, config, AudioFormat::STEREO_S16LE)
    }

    fn router_decoding_to(
        factory: FakeFactory,
        config: &EngineConfig,
        decoded_format: AudioFormat,
    ) -> (OutputRouter, Outputs) {
        let pcm = SharedBuffer::default();
        let decoded = SharedBuffer::default();
        let router = OutputRouter::new(
            OutputRoute::pcm("pcm", config.pcm_format),
            Sink::new(SinkRole::Pcm, "pcm", Box::new(pcm.clone())),
            OutputRoute::decoded("decoded", decoded_format),
            Sink::new(SinkRole::Decoded, "decoded", Box::new(decoded.clone())),
            Box::new(factory.clone()),
        )
        .drain_timeout(config.drain_timeout);
        (
            router,
            Outputs {
                pcm,
                decoded,
                factory,
            },
        )
    }

    #[test]
    fn switches_once_after_two_compressed_chunks() -> anyhow::Result<()> {
        let config = config();
        let (router, out) = router(FakeFactory::new(1), &config);
        let source = ScriptedSource::new(&[(false, 10), (true, 12)]);
        let mut recorder = Recorder::default();

        let summary = Session::new(source, router, &config).run(&mut recorder)?;

        assert_eq!(summary.end, EndReason::Exhausted);
        assert_eq!(summary.chunks, 22);
        assert_eq!(summary.transitions, 1);
        assert_eq!(summary.final_mode, StreamMode::Compressed);
        assert_eq!(
            recorder.transitions,
            vec![(
                11,
                ModeTransition {
                    from: StreamMode::Pcm,
                    to: StreamMode::Compressed
                },
                Some(DataType::Ac3)
            )]
        );
        assert_eq!(out.factory.spawn_count(), 1);

        for &(seq, class, mode) in &recorder.seen {
            let expected_class = if seq < 10 {
                Classification::Pcm
            } else {
                Classification::Compressed
            };
            assert_eq!(class, expected_class, "chunk {seq}");
            let expected_mode = if seq < 11 {
                StreamMode::Pcm
            } else {
                StreamMode::Compressed
            };
            assert_eq!(mode, expected_mode, "chunk {seq}");
        }

        // The first compressed chunk is still played as PCM; the transitioning
        // chunk goes to the decoder.
        let mut expected_pcm: Vec<u8> = (0..10).flat_map(pcm_bytes).collect();
        expected_pcm.extend(ac3_bytes(10));
        assert_eq!(out.pcm.contents(), expected_pcm);

        let expected_decoded: Vec<u8> = (11..22).flat_map(ac3_bytes).collect();
        assert_eq!(out.decoded.contents(), expected_decoded);
        assert_eq!(summary.stats.fed_bytes, 11 * CHUNK_BYTES as u64);
        assert_eq!(summary.stats.decoded_bytes, 11 * CHUNK_BYTES as u64);
        Ok(())
    }

    #[test]
    fn surround_output_is_frame_aligned() -> anyhow::Result<()> {
        let config = config();
        assert_eq!(config.decoded_format, AudioFormat::SURROUND_F32LE);
        let (router, out) = router_decoding_to(FakeFactory::new(1), &config, config.decoded_format);
        let source = ScriptedSource::new(&[(false, 10), (true, 12)]);

        let summary = Session::new(source, router, &config).run(&mut ())?;

        // 11 chunks of 16 bytes, padded up to whole 24-byte frames.
        let fed = 11 * CHUNK_BYTES;
        let frame = AudioFormat::SURROUND_F32LE.bytes_per_frame();
        assert_eq!(frame, 24);
        let aligned = fed.div_ceil(frame) * frame;
        assert_eq!(aligned, 192);

        assert_eq!(summary.stats.fed_bytes, fed as u64);
        assert_eq!(summary.stats.decoded_bytes, aligned as u64);

        let decoded = out.decoded.contents();
        assert_eq!(decoded.len(), aligned);
        let expected: Vec<u8> = (11..22).flat_map(ac3_bytes).collect();
        assert_eq!(&decoded[..fed], expected.as_slice());
        assert!(decoded[fed..].iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn cancel_reaches_source_waiting_for_writer() -> anyhow::Result<()> {
        let config = config();
        let (router, out) = router(FakeFactory::new(1), &config);
        let source = ReaderSource::new(io::empty(), config.input_format, config.chunk_frames)
            .follow(Duration::from_millis(10));
        let session = Session::new(source, router, &config);
        let cancel = session.cancel_token();

        let (tx, rx) = mpsc::channel();
        let runner = thread::spawn(move || {
            let _ = tx.send(session.run(&mut ()));
        });
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();

        let summary = rx.recv_timeout(Duration::from_secs(3))??;
        runner.join().expect("session thread panicked");
        assert_eq!(summary.end, EndReason::Cancelled);
        assert_eq!(summary.chunks, 0);
        assert!(out.pcm.contents().is_empty());
        Ok(())
    }

    #[test]
    fn restarted_input_does_not_join_streams() -> anyhow::Result<()> {
        let config = config();
        let (router, _out) = router(FakeFactory::new(1), &config);

        // The old writer leaves Pa Pb Pc at the very end of its last chunk and
        // the new one happens to start with a valid Pd.
        let preamble = ac3_bytes(0);
        let mut before = vec![0u8; CHUNK_BYTES - 6];
        before.extend_from_slice(&preamble[..6]);
        let mut after = preamble[6..8].to_vec();
        after.resize(CHUNK_BYTES, 0);

        let reader = ScriptedReader::new(vec![Some(before), None, Some(after)]);
        let source = ReaderSource::new(reader, config.input_format, config.chunk_frames)
            .follow(Duration::from_millis(1));
        let session = Session::new(source, router, &config);
        let mut recorder = Recorder {
            cancel_after: Some((1, session.cancel_token())),
            ..Default::default()
        };

        let summary = session.run(&mut recorder)?;
        assert_eq!(summary.end, EndReason::Cancelled);
        assert_eq!(
            recorder.seen,
            vec![
                (0, Classification::Ambiguous, StreamMode::Pcm),
                (1, Classification::Pcm, StreamMode::Pcm),
            ]
        );
        Ok(())
    }

    #[test]
    fn delivery_order_is_strict_across_transitions() -> anyhow::Result<()> {
        let config = config();
        let (router, out) = router(FakeFactory::new(1), &config);
        let pattern = [(false, 3), (true, 3), (false, 3), (true, 3), (false, 1)];
        let source = ScriptedSource::new(&pattern);
        let mut recorder = Recorder::default();

        let summary = Session::new(source, router, &config).run(&mut recorder)?;

        let seqs: Vec<u64> = recorder.seen.iter().map(|s| s.0).collect();
        assert_eq!(seqs, (0..13).collect::<Vec<_>>());
        let at: Vec<u64> = recorder.transitions.iter().map(|t| t.0).collect();
        assert_eq!(at, vec![4, 7, 10]);
        assert_eq!(out.factory.spawn_count(), 2);
        assert_eq!(summary.stats.pipelines_spawned, 2);

        // Every byte of every chunk went to exactly one sink.
        let total = out.pcm.contents().len() + out.decoded.contents().len();
        assert_eq!(total, 13 * CHUNK_BYTES);
        assert_eq!(summary.stats.chunks, 13);
        Ok(())
    }

    #[test]
    fn cancellation_while_compressed_drains_pipeline() -> anyhow::Result<()> {
        let config = config();
        let (router, out) = router(FakeFactory::new(1), &config);
        let mut source = ScriptedSource::new(&[(false, 2)]);
        source.endless = true;

        let session = Session::new(source, router, &config);
        let mut recorder = Recorder {
            cancel_after: Some((40, session.cancel_token())),
            ..Default::default()
        };
        let summary = session.run(&mut recorder)?;

        assert_eq!(summary.end, EndReason::Cancelled);
        assert_eq!(summary.chunks, 41);
        assert_eq!(summary.final_mode, StreamMode::Compressed);
        assert_eq!(summary.stats.forced_stops, 0);
        assert_eq!(summary.stats.decoded_bytes, summary.stats.fed_bytes);
        assert_eq!(out.decoded.contents().len() as u64, summary.stats.fed_bytes);
        Ok(())
    }

    #[test]
    fn spawn_failure_reports_chunk_and_component() {
        let config = config();
        let mut factory = FakeFactory::new(1);
        factory.fail = true;
        let (router, out) = router(factory, &config);
        let source = ScriptedSource::new(&[(false, 1), (true, 5)]);

        let err = Session::new(source, router, &config)
            .run(&mut ())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PipelineSpawn);
        assert_eq!(err.component, Component::Pipeline);
        assert_eq!(err.seq, Some(2));
        assert_eq!(err.exit_code(), 5);
        // Chunks before the failure were still written out.
        assert_eq!(out.pcm.contents().len(), 2 * CHUNK_BYTES);
    }

    #[test]
    fn cancelled_before_start_reads_nothing() -> anyhow::Result<()> {
        let config = config();
        let (router, out) = router(FakeFactory::new(1), &config);
        let session = Session::new(ScriptedSource::new(&[(false, 5)]), router, &config);
        session.cancel_token().cancel();

        let summary = session.run(&mut ())?;
        assert_eq!(summary.end, EndReason::Cancelled);
        assert_eq!(summary.chunks, 0);
        assert!(out.pcm.contents().is_empty());
        Ok(())
    }
}
