//! Library crate for nmap-api-rs: scan execution, result normalization,
//! scan history persistence and the HTTP API that ties them together.
pub mod error;
pub mod history;
pub mod logging;
pub mod nmap_xml;
pub mod normalize;
pub mod scanner;
pub mod server;
pub mod types;
