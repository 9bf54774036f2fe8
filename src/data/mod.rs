//! Flat data containers used by restrictions: storage buffers, the vector
//! collaborator, and array ownership modes.

pub mod array;
pub mod storage;
pub mod vector;
