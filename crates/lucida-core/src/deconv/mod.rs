//! Richardson-Lucy iteration engine.

mod config;
mod engine;
mod observer;

pub use config::{DeconvolutionConfig, FirstGuess};
pub use engine::{deconvolve, RichardsonLucy, RunState};
pub use observer::{NoOpObserver, RunObserver};
