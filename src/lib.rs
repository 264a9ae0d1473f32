//! A toolkit for decoding serialized organized point clouds.
//!
//! The [`cloud2`] module turns the column-packed data buffer of a decoded
//! point-cloud message into per-point tuples of typed scalar values, driven
//! by the message's own field descriptors.

pub mod cloud2;
