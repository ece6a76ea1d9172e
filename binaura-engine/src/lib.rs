//! Binaura Engine — parameter-automation core of a two-oscillator
//! binaural-beat generator.
//!
//! Crate layout:
//! - [`graph`]      : the audio-graph substrate boundary the engine drives
//! - [`timeline`]   : click-free scheduling discipline and transition policy
//! - [`engine`]     : the orchestrator (start/update/stop, filter, compressor,
//!                    wave crossfade)
//! - [`drift`]      : slow beat-frequency oscillation on a re-arming timer
//! - [`isochronic`] : periodic amplitude pulsing on the shared gain parameter
//! - [`mock`]       : recording substrate with a manual clock, for tests
//! - [`synth`]      : offline substrate that renders the scheduled automation
//! - [`playback`]   : CPAL output for the offline substrate (`realtime`)
//!
//! The engine never touches an audio buffer: it validates inputs, schedules
//! automation, and arms cancellable timers. Everything sample-accurate
//! happens inside whichever [`graph::AudioGraph`] hosts it.

pub mod drift;
pub mod engine;
pub mod error;
pub mod graph;
pub mod isochronic;
pub mod mock;
#[cfg(feature = "realtime")]
pub mod playback;
pub mod synth;
pub mod timeline;

// Re-export the common surface so downstream imports stay short.
pub use binaura_core::filters::FilterKind;
pub use binaura_core::wave::WaveShape;
pub use drift::DriftShape;
pub use engine::{
    CompressorSettings, CompressorUpdate, Engine, EngineConfig, EngineState, FilterSettings,
};
pub use error::EngineError;
pub use graph::{AudioGraph, AudioParam, GraphError};
