pub mod since;

pub use since::since;
