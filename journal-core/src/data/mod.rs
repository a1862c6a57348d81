//! Source adapters — the providers a field's value is pulled from.

pub mod circuit_breaker;
pub mod eodhd;
pub mod fred;
pub mod http;
pub mod memory;
pub mod registry;
pub mod source;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use eodhd::EodhdSource;
pub use fred::FredSource;
pub use http::{HttpFetcher, HttpSettings};
pub use memory::MemorySource;
pub use registry::SourceRegistry;
pub use source::{DisabledSource, PointSource, SeriesSource, SourceError, SourceResult};
pub use yahoo::YahooSource;
