pub mod manager;
pub mod model;

pub use manager::ServerManager;
pub use model::{Server, ServerRecord};
