//! Real-time decorative backdrop: a cursor-reactive fluid solver and an
//! ambient particle vortex, plus the input routing and resize plumbing
//! both engines share.

pub mod backdrop;
pub mod color;
pub mod config;
pub mod error;
pub mod fluid;
pub mod input;
pub mod lifecycle;
pub mod noise_field;
pub mod settings;
pub mod vortex;

pub use backdrop::Backdrop;
pub use config::{BackdropConfig, FluidConfig, VortexConfig};
pub use error::EngineError;
pub use fluid::FluidEngine;
pub use vortex::VortexEngine;
