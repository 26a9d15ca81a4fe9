//! Format internals: primitive codecs, property lists, tiles and the
//! document-level decoder and encoder.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod io;
pub mod model;
pub mod parasite;
pub mod paths;
pub mod property;
pub mod rle;
pub mod text;
pub mod tile;

pub(crate) mod channel;
pub(crate) mod layer;
pub(crate) mod tree;
