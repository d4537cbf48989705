pub mod capture;
pub mod classifier;
pub mod configuration;
pub mod error_handling;
pub mod packet_decode;
pub mod pipeline;
pub mod storage;
pub mod web_interface;
