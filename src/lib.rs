pub mod config;
pub mod core;
pub mod devis;
pub mod export;
pub mod index;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod rooms;

pub use config::Settings;
pub use core::error::{RoomError, SourceError};
pub use core::geometry::{BBox, ScaleFactor};
pub use core::model::{PageSpans, Room, RoomCandidate, RoomRegistry, TextSpan};
