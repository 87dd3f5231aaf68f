pub mod dto;
pub mod framing;

pub use dto::VmHash;
