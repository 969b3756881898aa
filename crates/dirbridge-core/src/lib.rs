//! dirbridge core - domain types and collaborator traits shared by the
//! serializer and directory crates

pub mod directory;
pub mod error;
pub mod ids;
pub mod models;
pub mod traits;

pub use directory::*;
pub use error::*;
pub use ids::*;
pub use models::*;
pub use traits::*;
