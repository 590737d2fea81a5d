//! Endpointing primitives
//!
//! Level samples are classified into idle/silence/noise; the coordinator
//! turns an uninterrupted run of silence into a stop action.

mod level;

pub use level::LevelClass;
