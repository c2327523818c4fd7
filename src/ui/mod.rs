#[cfg(feature = "gtk")]
pub mod overlay;
pub mod terminal;
