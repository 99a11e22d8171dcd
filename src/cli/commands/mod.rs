pub mod diagnostics;
pub mod providers;
pub mod write;
