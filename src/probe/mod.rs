pub mod icmp;
pub mod reply;
pub mod socket;

pub use icmp::*;
pub use reply::*;
pub use socket::*;
