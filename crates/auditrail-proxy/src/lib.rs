pub mod handler;
pub mod router;
pub mod rpc;
pub mod state;

pub use router::build_router;
pub use state::AppState;
