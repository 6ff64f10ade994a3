//! dorling - Animated Dorling cartograms.
//!
//! Regions are drawn as circles sized by a statistical value, pushed apart by a
//! force simulation while staying close to their geographic centroid. The
//! [`Cartogram`] controller cycles between the map and the cartogram and can be
//! paused, restarted or rebuilt at any time.

pub mod animation;
pub mod cartogram;
pub mod config;
pub mod dataset;
pub mod io;
pub mod model;
pub mod projection;
pub mod radius;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod simulation;

pub use animation::Phase;
pub use cartogram::Cartogram;
pub use config::{DorlingConfig, NutsLevel};
pub use io::{ProviderError, ProviderResult};
