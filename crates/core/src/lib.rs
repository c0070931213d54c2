//! ShareApp Core - Shared domain types.
//!
//! This crate provides the types shared by the event handlers and their tests:
//! - `functions` - Trigger handlers reacting to auth, Firestore and storage events
//! - `integration-tests` - In-memory fakes and black-box handler tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no runtime.
//! Record shapes and path builders live here so that the handlers and the
//! fakes agree on exactly where each document and blob lives.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, emails, record shapes and storage paths

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
