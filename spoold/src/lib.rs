pub mod daemon;
pub mod lock;
pub mod sync;
