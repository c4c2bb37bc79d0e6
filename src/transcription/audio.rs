// Audio normalization: whatever the client uploads, the recognizer wants a
// 16 kHz mono f32 waveform.
//
// Two variants, chosen once at construction:
// - Convert (feature `decode`, the default): symphonia probes and decodes
//   any supported container/codec, the result is downmixed to mono and
//   resampled with rubato.
// - Passthrough (built without `decode`): the bytes are parsed as a WAV
//   container and its samples are fed through unchanged, a documented
//   degraded mode where the caller is responsible for uploading audio
//   that is already 16 kHz mono.

use std::io::Cursor;

use anyhow::{Context, Result};
use hound::SampleFormat;

#[cfg(feature = "decode")]
use symphonia::core::audio::SampleBuffer;
#[cfg(feature = "decode")]
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
#[cfg(feature = "decode")]
use symphonia::core::errors::Error as SymphoniaError;
#[cfg(feature = "decode")]
use symphonia::core::formats::FormatOptions;
#[cfg(feature = "decode")]
use symphonia::core::io::MediaSourceStream;
#[cfg(feature = "decode")]
use symphonia::core::meta::MetadataOptions;
#[cfg(feature = "decode")]
use symphonia::core::probe::Hint;

/// The waveform format the recognizer consumes.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// A normalized (or passed-through) waveform plus its wall-clock length.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub duration_secs: f64,
}

/// Upload-to-waveform conversion capability, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioNormalizer {
    /// Decode any supported format and resample to 16 kHz mono.
    #[cfg(feature = "decode")]
    Convert,
    /// Parse as WAV and feed the samples unchanged.
    Passthrough,
}

impl AudioNormalizer {
    /// The best normalizer this build supports.
    pub fn from_build() -> Self {
        #[cfg(feature = "decode")]
        {
            AudioNormalizer::Convert
        }
        #[cfg(not(feature = "decode"))]
        {
            AudioNormalizer::Passthrough
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, AudioNormalizer::Passthrough)
    }

    /// Turn uploaded bytes into a waveform. The filename's extension is
    /// only a format hint; content detection does the real work.
    pub fn normalize(&self, bytes: &[u8], filename: &str) -> Result<DecodedAudio> {
        match self {
            #[cfg(feature = "decode")]
            AudioNormalizer::Convert => decode_any(bytes, extension_hint(filename)),
            AudioNormalizer::Passthrough => {
                let _ = filename;
                parse_wav(bytes)
            }
        }
    }
}

/// Lowercased filename extension, if there is one.
fn extension_hint(filename: &str) -> Option<String> {
    let ext = filename.rsplit('.').next()?;
    if ext.is_empty() || ext.len() == filename.len() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Passthrough path: parse a WAV container and convert its samples to f32
/// without resampling or downmixing.
fn parse_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV upload")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read WAV samples")?,
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read WAV samples")?
        }
    };

    let frames = samples.len() / spec.channels.max(1) as usize;
    let duration_secs = frames as f64 / spec.sample_rate.max(1) as f64;

    Ok(DecodedAudio {
        samples,
        duration_secs,
    })
}

/// Convert path: probe, decode, downmix, resample.
#[cfg(feature = "decode")]
fn decode_any(bytes: &[u8], extension: Option<String>) -> Result<DecodedAudio> {
    let cursor = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No decodable audio track in upload")?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut rate = 0u32;
    let mut channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed reading audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is recoverable; skip it and keep decoding.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e).context("Audio decode failed"),
        };

        let spec = *decoded.spec();
        rate = spec.rate;
        channels = spec.channels.count();

        let needs_realloc = match &sample_buf {
            Some(buf) => buf.capacity() < decoded.capacity() * channels,
            None => true,
        };
        if needs_realloc {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let buf = sample_buf.as_mut().context("sample buffer missing")?;
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() || channels == 0 || rate == 0 {
        anyhow::bail!("Upload contained no decodable audio");
    }

    let mono = downmix(&samples, channels);
    let duration_secs = mono.len() as f64 / rate as f64;
    let samples = resample(mono, rate)?;

    Ok(DecodedAudio {
        samples,
        duration_secs,
    })
}

/// Average interleaved channels into one.
#[cfg(feature = "decode")]
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio to the target rate with a sinc resampler.
#[cfg(feature = "decode")]
fn resample(samples: Vec<f32>, src_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if src_rate == TARGET_SAMPLE_RATE {
        return Ok(samples);
    }

    const CHUNK: usize = 1024;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::Blackman2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        TARGET_SAMPLE_RATE as f64 / src_rate as f64,
        2.0,
        params,
        CHUNK,
        1,
    )
    .context("Failed to build resampler")?;

    let expected =
        (samples.len() as f64 * TARGET_SAMPLE_RATE as f64 / src_rate as f64) as usize + CHUNK;
    let mut out = Vec::with_capacity(expected);

    let mut pos = 0;
    while pos + CHUNK <= samples.len() {
        let produced = resampler
            .process(&[&samples[pos..pos + CHUNK]], None)
            .context("Resampling failed")?;
        out.extend_from_slice(&produced[0]);
        pos += CHUNK;
    }
    if pos < samples.len() {
        let produced = resampler
            .process_partial(Some(&[&samples[pos..]]), None)
            .context("Resampling failed")?;
        out.extend_from_slice(&produced[0]);
    }
    // Drain the filter delay line.
    let produced = resampler
        .process_partial::<&[f32]>(None, None)
        .context("Resampling failed")?;
    out.extend_from_slice(&produced[0]);

    Ok(out)
}
