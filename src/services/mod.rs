pub mod extractor;
pub mod gaps;
pub mod gefs;
pub mod ingester;
pub mod interpolation;
pub mod lattice;
pub mod links;
pub mod loader;
pub mod normalize;
pub mod presentation;
