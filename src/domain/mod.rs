pub mod client;
pub mod device;
pub mod time;
pub mod types;
pub mod zone;

pub use client::*;
pub use device::*;
pub use time::*;
pub use types::*;
pub use zone::*;
