//! bm20: capitalization-weighted crypto index construction.
//!
//! Hexagonal architecture: index logic in [`domain`], collaborator traits in
//! [`ports`], filesystem implementations in [`adapters`], and the command
//! line in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
