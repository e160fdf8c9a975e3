mod progress;
mod signal;

use std::time::Duration;

use anyhow::Result;
use indicatif::MultiProgress;
use iec61937::io::command::CommandFactory;
use iec61937::io::sink::Sink;
use iec61937::io::source::ReaderSource;
use iec61937::process::route::OutputRouter;
use iec61937::process::session::{CancelToken, EndReason, Session};
use iec61937::structs::route::OutputRoute;
use iec61937::utils::errors::SinkRole;

use crate::cli::command::{Cli, RunArgs};
use crate::config::{FileConfig, resolve_run};
use crate::endpoint::{open_input, open_output};
use crate::timestamp::chunk_time;
use progress::ProgressObserver;

/// Poll interval while waiting for a FIFO writer to come back.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

pub fn cmd_run(args: &RunArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = resolve_run(args, &file, cli.strict)?;
    let engine = &settings.engine;

    log::info!(
        "Chunk size {} frames, detection window {} chunks, drain timeout {} ms (strict mode: {})",
        engine.chunk_frames,
        engine.det_window,
        engine.drain_timeout.as_millis(),
        engine.strict
    );
    log::info!("Input format {}, decoded format {}", engine.input_format, engine.decoded_format);
    log::debug!("Decoder: {}", settings.decoder.command_line(&engine.decoded_format));

    let input = open_input(&settings.input, &engine.input_format)?;
    let pcm = open_output(&settings.pcm_out, &engine.pcm_format)?;
    let decoded = open_output(&settings.decoded_out, &engine.decoded_format)?;
    log::info!(
        "Reading {}; PCM to {}, decoded to {}",
        input.label,
        pcm.label,
        decoded.label
    );

    let mut source = ReaderSource::new(input.stream, engine.input_format, engine.chunk_frames);
    if settings.follow {
        source = source.follow(FOLLOW_INTERVAL);
    }

    let factory = CommandFactory::new(settings.decoder.clone()).strict(engine.strict);
    let router = OutputRouter::new(
        OutputRoute::pcm(pcm.label.clone(), engine.pcm_format),
        Sink::new(SinkRole::Pcm, pcm.label, pcm.stream),
        OutputRoute::decoded(decoded.label.clone(), engine.decoded_format),
        Sink::new(SinkRole::Decoded, decoded.label, decoded.stream),
        Box::new(factory),
    )
    .drain_timeout(engine.drain_timeout);

    let cancel = CancelToken::new();
    signal::watch(cancel.clone())?;

    let mut observer = ProgressObserver::new(multi, engine.chunk_frames, engine.input_format)?;
    let start_time = std::time::Instant::now();
    let result = Session::new(source, router, engine)
        .with_cancel(cancel)
        .run(&mut observer);
    observer.finish();
    let summary = result?;

    let elapsed = start_time.elapsed().as_secs_f64();
    log::info!(
        "{} after {} chunks ({} of stream, {elapsed:.1}s wall), {} transitions, final mode {}",
        match summary.end {
            EndReason::Exhausted => "Input ended",
            EndReason::Cancelled => "Stopped",
        },
        summary.chunks,
        chunk_time(summary.chunks, engine.chunk_frames, &engine.input_format),
        summary.transitions,
        summary.final_mode
    );
    log::info!(
        "PCM {} bytes, fed {} bytes to {} decoder run(s), decoded {} bytes",
        summary.stats.pcm_bytes,
        summary.stats.fed_bytes,
        summary.stats.pipelines_spawned,
        summary.stats.decoded_bytes
    );
    if summary.stats.forced_stops > 0 {
        log::warn!("{} decoder run(s) had to be killed", summary.stats.forced_stops);
    }

    Ok(())
}
