//! Backend adapters implementing the record, assessment, writer and trigger ports.

pub mod rest;

pub use rest::RestBackend;
