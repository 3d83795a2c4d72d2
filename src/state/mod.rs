pub mod lossrun;
pub mod session;

pub use lossrun::*;
pub use session::*;
