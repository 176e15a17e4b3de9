pub mod confidence;
pub mod error;
pub mod geometry;
pub mod model;
pub mod page_classifier;
pub mod page_selector;
