//! Newtype IDs for type-safe document and object references.
//!
//! Every identifier in this system ends up as a single segment of a
//! Firestore document path or a Cloud Storage object name, so the
//! `define_id!` macro only admits values that are valid as one segment.

use thiserror::Error;

/// Maximum size of a Firestore document ID in bytes.
pub const MAX_ID_BYTES: usize = 1500;

/// Errors that can occur when parsing an identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("{kind} cannot be empty")]
    Empty {
        /// Name of the identifier type.
        kind: &'static str,
    },
    /// The input string is longer than a document ID may be.
    #[error("{kind} must be at most {MAX_ID_BYTES} bytes")]
    TooLong {
        /// Name of the identifier type.
        kind: &'static str,
    },
    /// The input would address more than one path segment.
    #[error("{kind} must not contain '/' or be '.' or '..' (got {value:?})")]
    NotASegment {
        /// Name of the identifier type.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Validate that `value` can be used as a single path segment.
///
/// # Errors
///
/// Returns an [`IdError`] naming `kind` when the value is empty, too long,
/// contains a slash, or is a relative path component.
pub fn validate_segment(kind: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if value.len() > MAX_ID_BYTES {
        return Err(IdError::TooLong { kind });
    }
    if value.contains('/') || value == "." || value == ".." {
        return Err(IdError::NotASegment {
            kind,
            value: value.to_owned(),
        });
    }
    Ok(())
}

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` (validated on the way in)
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `parse()`, `as_str()`, `into_inner()`
/// - `Display`, `FromStr`, `AsRef<str>` and `TryFrom<String>`
///
/// # Example
///
/// ```rust
/// # use shareapp_core::define_id;
/// define_id!(AccountId, "account id");
/// define_id!(ItemId, "item id");
///
/// let account = AccountId::parse("u1").unwrap();
/// let item = ItemId::parse("u1").unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: AccountId = item;
/// # let _ = (account, item);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an ID, rejecting values that are not a single path segment.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is empty, too long, or contains `/`.
            pub fn parse(value: &str) -> ::core::result::Result<Self, $crate::IdError> {
                $crate::types::id::validate_segment($kind, value)?;
                Ok(Self(value.to_owned()))
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl ::core::convert::TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(value: String) -> ::core::result::Result<Self, Self::Error> {
                $crate::types::id::validate_segment($kind, &value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Firebase Auth uid
define_id!(AccountId, "account id");
// Document ID of a submitted card token
define_id!(TokenId, "token id");
define_id!(ItemId, "item id");
// Stripe customer id (cus_...)
define_id!(CustomerId, "customer id");
// Stripe card fingerprint
define_id!(Fingerprint, "card fingerprint");
