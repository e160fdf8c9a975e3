use iec61937::structs::format::AudioFormat;

/// `HH:MM:SS.mmm` position of a frame count in the stream.
pub fn stream_time(frames: u64, format: &AudioFormat) -> String {
    let ms = (format.seconds(frames) * 1000.0).round() as u64;
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let millis = ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Stream position at the start of chunk `seq`.
pub fn chunk_time(seq: u64, chunk_frames: usize, format: &AudioFormat) -> String {
    stream_time(seq * chunk_frames as u64, format)
}

#[test]
fn formats_stream_positions() {
    let fmt = AudioFormat::STEREO_S16LE;
    assert_eq!(stream_time(0, &fmt), "00:00:00.000");
    assert_eq!(stream_time(48_000, &fmt), "00:00:01.000");
    assert_eq!(stream_time(48_000 * 3_723 + 24_000, &fmt), "01:02:03.500");
    assert_eq!(chunk_time(11, 2048, &fmt), "00:00:00.469");
}
