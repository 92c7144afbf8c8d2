mod actor;
pub mod wire;

pub use actor::{Actor, ApiResponse, Credentials};
pub use wire::*;
