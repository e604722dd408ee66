// Core modules - one responsibility per file
pub mod market; // product lines and their hosts
pub mod rest; // typed endpoint builders over the kernel RestClient
pub mod streams; // typed stream constructors
pub mod types; // serde structs <- raw JSON

pub mod builder; // config -> BinanceClient

// Re-export main types for easier importing
pub use builder::{build_client, build_client_with_executor, BinanceClient};
pub use market::Market;
pub use rest::BinanceRestClient;
pub use streams::{BinanceStreams, CombinedStream, SingleStream, UserDataDecoder};
pub use types::*;
