//! Grammar-constrained decoding of natural-language queries into syntax trees

pub mod action;
pub mod batch;
pub mod dataset;
pub mod decoder;
pub mod error;
pub mod evaluation;
pub mod grammar;
pub mod hypothesis;
pub mod model;
pub mod query;
pub mod render;
pub mod results;
pub mod testing;
pub mod tree;
pub mod vocab;
