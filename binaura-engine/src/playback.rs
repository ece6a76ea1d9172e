//! Realtime playback of the offline substrate through CPAL.
//!
//! The returned stream pulls interleaved frames from a [`SynthGraph`] clone;
//! the engine keeps scheduling onto its own clone from the control thread.
//! Callers start it with `cpal::traits::StreamTrait::play`.

use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::error;

use crate::synth::SynthGraph;

/// Why an output stream could not be built.
#[derive(Debug)]
pub enum PlaybackError {
    NoOutputDevice,
    Device(String),
    /// The device's rate differs from the graph's; build the graph at the
    /// device rate instead.
    SampleRateMismatch { device: u32, graph: u32 },
    UnsupportedFormat(cpal::SampleFormat),
    Build(cpal::BuildStreamError),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::NoOutputDevice => write!(f, "no default output device"),
            PlaybackError::Device(e) => write!(f, "output device error: {e}"),
            PlaybackError::SampleRateMismatch { device, graph } => write!(
                f,
                "device runs at {device} Hz but the graph was built at {graph} Hz"
            ),
            PlaybackError::UnsupportedFormat(fmt_) => {
                write!(f, "unsupported device sample format: {fmt_:?}")
            }
            PlaybackError::Build(e) => write!(f, "could not build output stream: {e}"),
        }
    }
}

impl std::error::Error for PlaybackError {}

impl From<cpal::BuildStreamError> for PlaybackError {
    fn from(e: cpal::BuildStreamError) -> Self {
        PlaybackError::Build(e)
    }
}

/// Build an output stream on the default device feeding from `graph`.
pub fn output_stream(graph: &SynthGraph) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::Device(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.config();

    let graph_rate = graph.sample_rate() as u32;
    if config.sample_rate.0 != graph_rate {
        return Err(PlaybackError::SampleRateMismatch {
            device: config.sample_rate.0,
            graph: graph_rate,
        });
    }

    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, graph.clone()),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, graph.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, graph.clone()),
        other => Err(PlaybackError::UnsupportedFormat(other)),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: SynthGraph,
) -> Result<cpal::Stream, PlaybackError>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = config.channels as usize;
    let err_fn = |e: cpal::StreamError| error!("output stream error: {e}");
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |out: &mut [T], _| {
            scratch.resize(out.len(), 0.0);
            graph.render_interleaved(&mut scratch, channels);
            for (o, s) in out.iter_mut().zip(&scratch) {
                *o = T::from_sample(*s);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
