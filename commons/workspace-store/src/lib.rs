pub mod error;
pub mod traits;

#[cfg(feature = "k8s")]
pub mod kubernetes;

#[cfg(feature = "memory")]
pub mod memory;

pub use error::*;
pub use traits::*;
