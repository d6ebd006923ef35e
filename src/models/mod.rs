pub mod alert;
pub mod status;

pub use alert::*;
pub use status::*;
