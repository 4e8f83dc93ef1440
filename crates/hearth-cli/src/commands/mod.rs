pub mod blob;
pub mod migrate;
pub mod reset;
