pub mod verify;

pub use verify::{verify_anchors, verify_chain, AnchorVerification, ChainVerification};
