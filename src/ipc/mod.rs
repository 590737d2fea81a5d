//! IPC module for communication with the display layer, wake detector and
//! assistant peer

mod protocol;
mod server;

pub use server::{Server, ServerContext};
