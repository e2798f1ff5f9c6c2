//! Outgoing request handling: cache-first interception with an offline
//! fallback chain (network → cache → synthesized 503).

mod interceptor;
mod network;

pub use interceptor::FetchInterceptor;
pub use network::{FetchedResponse, HttpFetcher, NetworkFetcher};
