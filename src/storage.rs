//! A storage is the dense table where all instances of one component type are kept,
//! indexed by the index of their owning [`ComponentIdentifier`](crate::ComponentIdentifier).

mod vec;
pub use vec::VecStorage;

#[cfg(test)]
mod tests;
