pub mod api;
pub mod contracts;
pub mod mail;
pub mod metrics;
pub mod render;
pub mod storage;
