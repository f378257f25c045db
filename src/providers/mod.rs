//! Concrete cache backends
//!
//! - `memory`: bounded in-process store with pluggable eviction; always
//!   available, serves as the fallback target
//! - `remote`: Redis-backed shared cache; owns connection lifecycle, key
//!   prefixing, and value encoding

pub mod memory;
pub mod remote;

pub use memory::MemoryCacheProvider;
pub use remote::RemoteCacheProvider;
