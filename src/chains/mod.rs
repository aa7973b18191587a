pub mod registry;

pub use registry::ChainRegistry;
