//! ShareApp functions library.
//!
//! Event handlers that keep Firestore profiles, Stripe payment sources and
//! Cloud Storage images consistent with account and catalog changes, plus
//! the HTTP routes the platform delivers those events to.
//!
//! # Security
//!
//! This crate holds the Stripe secret key and acts as the project's
//! service account. Trigger routes must only be reachable by the event
//! delivery infrastructure.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod events;
pub mod firestore;
pub mod google;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod storage;
pub mod stripe;
