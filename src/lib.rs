//! Worthy - Mastering Effects-Chain Engine
//!
//! One fixed mastering chain (high-pass, bass centering, 5-band EQ, mud and
//! harshness cuts, air, glue compression, loudness normalization, limiter)
//! realized two ways:
//! 1. Live Preview Graph - real-time nodes re-configured as parameters change
//! 2. Offline Render Pipeline - two-pass (measure, then correct) export to WAV
//!
//! # Architecture
//!
//! - `params`: the settings record both paths read
//! - `chain`: backend-independent stage descriptors built from the settings
//! - `loudness` + `render`: analysis pass and offline execution strategies
//! - `preview` + `engine::transport`: audition while playing
//! - `session`: command/event dispatch tying it together

pub mod chain;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod loudness;
pub mod params;
pub mod preview;
pub mod render;
pub mod session;
pub mod visual;

pub use config::{Backend, EngineConfig};
pub use error::{Result, WorthyError};
pub use params::{EqGains, EqPreset, MasteringParams, OutputFormat, ParamUpdate};
pub use session::{Command, Event, Session};
