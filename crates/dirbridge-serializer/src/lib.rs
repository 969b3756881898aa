//! dirbridge serializer - declarative entity serialization configuration
//!
//! - `config`: the config model (exclusion policy, field overrides, property
//!   paths, hints, ordering, post-serialize hook)
//! - `accessor`: total read helpers over the model
//! - `serializer`: turns JSON entities into maps according to a config

pub mod accessor;
pub mod config;
pub mod serializer;


pub use config::*;
pub use serializer::{EntitySerializer, PostSerializeHook, SerializationContext};
