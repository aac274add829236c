//! Deterministic simulation substrate: data model, spatial index and id
//! tables (§3, §4.A), shared by `oz-sim`'s collider, physics and tick
//! pipeline.

pub mod error;
pub mod events;
pub mod geom;
pub mod grid;
pub mod heading;
pub mod ids;
pub mod library;
pub mod model;
pub mod rng;
pub mod world;

pub use error::{SimError, SimResult};
pub use heading::Heading;
pub use library::ClassLibrary;
pub use rng::Rng;
pub use world::{World, WorldCaps};
