// src/lib.rs
//! Acquisition and processing pipeline for a handheld NIR plastic scanner.
pub mod config;
pub mod console;
pub mod engine;
pub mod recorder;
pub mod scanner;
pub mod types;
