//! Core types for ShareApp.
//!
//! This module provides type-safe wrappers for the records the handlers
//! read and write, and the paths those records live at.

pub mod email;
pub mod id;
pub mod paths;
pub mod records;

pub use email::{Email, EmailError};
pub use id::*;
pub use paths::{DocumentPath, item_images_prefix, profile_image};
pub use records::{
    CatalogItem, CustomerRef, PaymentProfile, PaymentSource, PaymentToken, UserProfile,
};
