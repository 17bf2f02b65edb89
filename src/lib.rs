pub mod address;
pub mod cli;
pub mod dump;
pub mod format;
pub mod markup;

pub use dump::run;
