pub mod discovery;
pub mod sync;
