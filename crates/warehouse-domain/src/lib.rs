//! warehouse-domain: shelf, item and note models for the warehouse editor.
//!
//! Everything here is pure and synchronous. The sync layer in
//! `warehouse-sync` owns the collections; the renderer and panels consume
//! snapshots of these types and send back patches.

pub mod model;
pub mod patch;
pub mod search;
pub mod seed;
pub mod snap;
pub mod transfer;
pub mod validate;

pub use model::*;
pub use patch::*;
pub use search::*;
pub use seed::*;
pub use snap::*;
pub use transfer::*;
pub use validate::*;
