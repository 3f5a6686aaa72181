pub mod domain;
pub mod generation;
pub mod pipeline;
pub mod sink;
pub mod traits;
