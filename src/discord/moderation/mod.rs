pub mod commands;
pub mod events;
pub mod transport;

pub use transport::SerenityTransport;
