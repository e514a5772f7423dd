use std::path::Path;

use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::SampleBuffer;
use crate::error::LoadError;

/// Decode a whole file into memory, keeping mono or stereo channels separate.
pub fn decode_audio(path: &Path) -> Result<SampleBuffer, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::Probe {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::NoTrack(path.to_path_buf()))?;

    let track_id = track.id;
    let declared = track.codec_params.channels.map(|c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::UnknownSampleRate(path.to_path_buf()))?;

    if let Some(channels) = declared {
        check_channels(path, channels)?;
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, e))?;

    // Sized by the first decoded packet; containers may leave the layout unset
    let mut planar: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(decode_error(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(decode_error(path, e)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = InterleavedBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        deinterleave(path, &mut planar, sample_buf.samples(), spec.channels.count(), declared)?;
    }

    if planar.first().map_or(true, |c| c.is_empty()) {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    let channels = planar.len();

    log::info!(
        "Decoded {}: {} samples x {} ch, {}Hz, {:.1}s",
        path.display(),
        planar[0].len(),
        channels,
        sample_rate,
        planar[0].len() as f32 / sample_rate as f32
    );

    SampleBuffer::new(planar, sample_rate)
}

fn check_channels(path: &Path, channels: usize) -> Result<(), LoadError> {
    if channels == 0 || channels > 2 {
        return Err(LoadError::UnsupportedChannels {
            path: path.to_path_buf(),
            channels,
        });
    }
    Ok(())
}

/// Append one interleaved packet to the planar channels. The first packet
/// fixes the layout; later packets and the container must agree with it.
fn deinterleave(
    path: &Path,
    planar: &mut Vec<Vec<f32>>,
    samples: &[f32],
    channels: usize,
    declared: Option<usize>,
) -> Result<(), LoadError> {
    if planar.is_empty() {
        check_channels(path, channels)?;
        if let Some(declared) = declared.filter(|&d| d != channels) {
            return Err(LoadError::Decode {
                path: path.to_path_buf(),
                reason: format!("track declares {declared} channels, packets carry {channels}"),
            });
        }
        planar.resize(channels, Vec::new());
    } else if planar.len() != channels {
        return Err(LoadError::Decode {
            path: path.to_path_buf(),
            reason: format!("channel count changed from {} to {channels}", planar.len()),
        });
    }

    for frame in samples.chunks_exact(channels) {
        for (channel, &s) in planar.iter_mut().zip(frame) {
            channel.push(s);
        }
    }
    Ok(())
}

fn decode_error(path: &Path, err: SymphoniaError) -> LoadError {
    LoadError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
