pub mod filesystem;

pub use filesystem::LocalObjectStorage;
