use std::time::Duration;

use crate::io::pipeline::{DecodingPipeline, PipelineFactory};
use crate::io::sink::Sink;
use crate::process::switch::{ModeTransition, StreamMode};
use crate::structs::chunk::Chunk;
use crate::structs::route::OutputRoute;
use crate::utils::errors::{Error, SinkRole};

/// Running totals of everything the router moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub chunks: u64,
    pub pcm_bytes: u64,
    pub fed_bytes: u64,
    pub decoded_bytes: u64,
    pub pipelines_spawned: u64,
    pub forced_stops: u64,
}

/// Owns both output sinks and the decoding pipeline.
///
/// While a pipeline is live the decoded sink belongs to its output pump and
/// comes back when the pipeline is drained.
pub struct OutputRouter {
    pcm_route: OutputRoute,
    decoded_route: OutputRoute,
    pcm_sink: Option<Sink>,
    decoded_sink: Option<Sink>,
    factory: Box<dyn PipelineFactory>,
    pipeline: Option<Box<dyn DecodingPipeline>>,
    drain_timeout: Duration,
    next_seq: Option<u64>,
    stats: RouterStats,
}

fn sink_gone(role: SinkRole) -> Error {
    Error::SinkWrite {
        role,
        source: std::io::Error::new(std::io::ErrorKind::NotConnected, "sink already released"),
    }
}

impl OutputRouter {
    pub fn new(
        pcm_route: OutputRoute,
        pcm_sink: Sink,
        decoded_route: OutputRoute,
        decoded_sink: Sink,
        factory: Box<dyn PipelineFactory>,
    ) -> Self {
        Self {
            pcm_route,
            decoded_route,
            pcm_sink: Some(pcm_sink),
            decoded_sink: Some(decoded_sink),
            factory,
            pipeline: None,
            drain_timeout: Duration::from_secs(2),
            next_seq: None,
            stats: RouterStats::default(),
        }
    }

    /// Upper bound on waiting for decoder output when leaving compressed mode.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn pipeline_active(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn on_transition(&mut self, transition: ModeTransition) -> Result<(), Error> {
        match transition.to {
            StreamMode::Compressed => {
                let pcm = self.pcm_sink.as_mut().ok_or_else(|| sink_gone(SinkRole::Pcm))?;
                pcm.flush().map_err(|source| Error::SinkWrite {
                    role: SinkRole::Pcm,
                    source,
                })?;
                self.start_pipeline()
            }
            StreamMode::Pcm => self.stop_pipeline(),
        }
    }

    fn start_pipeline(&mut self) -> Result<(), Error> {
        if self.pipeline.is_some() {
            log::warn!("Decoding pipeline already running; restarting it");
            self.stop_pipeline()?;
        }

        let sink = self
            .decoded_sink
            .take()
            .ok_or_else(|| sink_gone(SinkRole::Decoded))?;
        let pipeline = self.factory.spawn(&self.decoded_route, sink)?;
        self.pipeline = Some(pipeline);
        self.stats.pipelines_spawned += 1;
        log::info!("Decoding to {}", self.decoded_route);
        Ok(())
    }

    fn stop_pipeline(&mut self) -> Result<(), Error> {
        let Some(pipeline) = self.pipeline.take() else {
            return Ok(());
        };

        let drained = pipeline.drain(self.drain_timeout)?;
        log::info!(
            "Decoder drained: {} bytes in, {} bytes decoded{}",
            drained.fed_bytes,
            drained.decoded_bytes,
            if drained.forced { " (killed)" } else { "" }
        );
        self.stats.decoded_bytes += drained.decoded_bytes;
        if drained.forced {
            self.stats.forced_stops += 1;
        }
        self.decoded_sink = Some(drained.sink);
        log::info!("Passing through to {}", self.pcm_route);
        Ok(())
    }

    /// Writes one chunk to the output of `mode`.
    pub fn deliver(&mut self, chunk: Chunk, mode: StreamMode) -> Result<(), Error> {
        if let Some(expected) = self.next_seq {
            if chunk.seq != expected {
                log::error!("Chunk {} delivered out of order, expected {expected}", chunk.seq);
                debug_assert_eq!(chunk.seq, expected, "chunk delivered out of order");
            }
        }
        self.next_seq = Some(chunk.seq + 1);

        match mode {
            StreamMode::Pcm => {
                let sink = self.pcm_sink.as_mut().ok_or_else(|| sink_gone(SinkRole::Pcm))?;
                sink.write_chunk(&chunk.data)
                    .map_err(|source| Error::SinkWrite {
                        role: SinkRole::Pcm,
                        source,
                    })?;
                self.stats.pcm_bytes += chunk.len() as u64;
            }
            StreamMode::Compressed => {
                let pipeline = self.pipeline.as_mut().ok_or_else(|| {
                    Error::PipelineIo(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "no decoding pipeline is running",
                    ))
                })?;
                pipeline.feed(&chunk.data)?;
                self.stats.fed_bytes += chunk.len() as u64;
            }
        }

        self.stats.chunks += 1;
        log::trace!("Chunk {} -> {mode}", chunk.seq);
        Ok(())
    }

    /// Drains any live pipeline and closes both sinks.
    ///
    /// Every step is attempted; the first failure is returned.
    pub fn shutdown(mut self) -> Result<RouterStats, Error> {
        let mut first: Option<Error> = None;

        if let Err(e) = self.stop_pipeline() {
            log::warn!("Stopping decoding pipeline failed: {e}");
            first.get_or_insert(e);
        }

        for (role, sink) in [
            (SinkRole::Pcm, self.pcm_sink.take()),
            (SinkRole::Decoded, self.decoded_sink.take()),
        ] {
            let Some(sink) = sink else { continue };
            let label = sink.label().to_string();
            if let Err(source) = sink.close() {
                log::warn!("Closing {role} sink {label} failed: {source}");
                first.get_or_insert(Error::SinkWrite { role, source });
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}
