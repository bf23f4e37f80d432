//! Core packing pipeline
//!
//! Modules in build order: [`grouper`] and [`stabilizer`] produce bundle
//! definitions, the [`archiver`] writes them, [`assembler`] turns the results
//! into catalog locations, [`partition`] splits them between catalogs and
//! [`relocate`] produces the final layout. [`pipeline`] runs all of it.

pub mod archiver;
pub mod assembler;
pub mod catalog;
pub mod config;
pub mod content_state;
pub mod context;
pub mod error;
pub mod group;
pub mod grouper;
pub mod hashing;
pub mod manifest;
pub mod partition;
pub mod pipeline;
pub mod registry;
pub mod relocate;
pub mod stabilizer;
pub mod validation;
