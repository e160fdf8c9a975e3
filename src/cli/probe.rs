use std::collections::BTreeMap;
use std::io::Read;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use iec61937::io::source::{ChunkSource, ReaderSource};
use iec61937::process::detect::{Classification, SyncDetector};
use iec61937::process::switch::DebouncedSwitch;
use iec61937::structs::config::EngineConfig;
use iec61937::utils::errors::Error;
use serde::Serialize;

use super::command::{Cli, ProbeArgs};
use crate::config::{FileConfig, InputEndpoint, resolve_probe};
use crate::endpoint::open_input;
use crate::timestamp::chunk_time;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassCounts {
    pub pcm: u64,
    pub compressed: u64,
    pub ambiguous: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BurstReport {
    pub chunk: u64,
    pub time: String,
    pub data_type: String,
    pub payload_bytes: usize,
    pub stream_number: u8,
    pub error_flag: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransitionReport {
    pub chunk: u64,
    pub time: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProbeReport {
    pub input: String,
    pub format: String,
    pub chunk_frames: usize,
    pub det_window: usize,
    pub chunks: u64,
    pub duration: String,
    pub classifications: ClassCounts,
    pub bursts: BTreeMap<String, u64>,
    pub rejected: BTreeMap<String, u64>,
    pub first_burst: Option<BurstReport>,
    pub transitions: Vec<TransitionReport>,
    pub final_mode: String,
}

pub fn cmd_probe(args: &ProbeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let engine = resolve_probe(args, &file)?;

    log::info!("Probing {}", args.input.display());
    let input = open_input(&InputEndpoint::File(args.input.clone()), &engine.input_format)?;

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} chunks {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(pb)
        }
        None => None,
    };

    let report = probe(input.stream, &engine, input.label, pb.as_ref())?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    print!("{}", serde_yaml_ng::to_string(&report)?);
    Ok(())
}

/// Runs the detector and switch over `reader` without routing anything.
pub fn probe<R: Read>(
    reader: R,
    engine: &EngineConfig,
    label: String,
    pb: Option<&ProgressBar>,
) -> Result<ProbeReport> {
    let mut source = ReaderSource::new(reader, engine.input_format, engine.chunk_frames);
    let mut detector = SyncDetector::new();
    let mut switch = DebouncedSwitch::new(engine.det_window);
    let time = |seq: u64| chunk_time(seq, engine.chunk_frames, &engine.input_format);

    let mut report = ProbeReport {
        input: label,
        format: engine.input_format.to_string(),
        chunk_frames: engine.chunk_frames,
        det_window: engine.det_window.get(),
        chunks: 0,
        duration: String::new(),
        classifications: ClassCounts::default(),
        bursts: BTreeMap::new(),
        rejected: BTreeMap::new(),
        first_burst: None,
        transitions: Vec::new(),
        final_mode: String::new(),
    };

    loop {
        let chunk = match source.next_chunk() {
            Ok(chunk) => chunk,
            Err(Error::SourceExhausted) => break,
            Err(e) => return Err(e.into()),
        };
        let detection = detector.classify(&chunk.data);

        match detection.classification {
            Classification::Pcm => report.classifications.pcm += 1,
            Classification::Compressed => report.classifications.compressed += 1,
            Classification::Ambiguous => report.classifications.ambiguous += 1,
        }
        if let Some(burst) = detection.burst {
            *report.bursts.entry(burst.data_type.to_string()).or_default() += 1;
            if report.first_burst.is_none() {
                log::info!("First burst at chunk {}: {burst}", chunk.seq);
                report.first_burst = Some(BurstReport {
                    chunk: chunk.seq,
                    time: time(chunk.seq),
                    data_type: burst.data_type.to_string(),
                    payload_bytes: burst.payload_bytes(),
                    stream_number: burst.stream_number,
                    error_flag: burst.error,
                });
            }
        }
        if let Some(issue) = detection.rejected {
            log::debug!("Chunk {}: sync rejected: {issue}", chunk.seq);
            *report.rejected.entry(issue.to_string()).or_default() += 1;
        }

        if let Some(transition) = switch.observe(detection.classification) {
            log::info!("Chunk {} ({}): {transition}", chunk.seq, time(chunk.seq));
            report.transitions.push(TransitionReport {
                chunk: chunk.seq,
                time: time(chunk.seq),
                from: transition.from.to_string(),
                to: transition.to.to_string(),
            });
        }

        report.chunks += 1;
        if let Some(pb) = pb {
            pb.inc(1);
        }
    }

    report.duration = time(report.chunks);
    report.final_mode = switch.mode().to_string();
    Ok(report)
}
