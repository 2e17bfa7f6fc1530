//! wavetrace - deterministic 2-D ray-tracing propagation engine for indoor
//! and small-cell radio planning.
//!
//! Given a floor plan of axis-aligned buildings, a set of transmitters and
//! a set of receivers, the engine enumerates geometric propagation paths
//! (line of sight, specular reflections by the image method, one ground
//! bounce, single-edge knife-edge diffraction), sums the complex field
//! contributions per receiver and derives the usual planning observables:
//! received power, user-end SNR, RMS delay spread, Rice factor and a
//! coverage flag. A greedy optimizer places transmitters on building
//! corners until a coverage target is met.

pub mod antenna;
pub mod emitter;
pub mod engine;
pub mod field;
pub mod fresnel;
pub mod geometry;
pub mod optimizer;
pub mod raypath;
pub mod receiver;
pub mod scene;
pub mod scenefile;
pub mod settings;
pub mod tracer;
pub mod walls;
