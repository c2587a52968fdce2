pub mod operation;
pub mod params;
pub mod temporal;

pub use operation::*;
pub use params::*;
pub use temporal::*;
