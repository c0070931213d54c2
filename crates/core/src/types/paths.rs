//! Firestore document paths and Cloud Storage object names.
//!
//! ```text
//! users/{accountId}                              UserProfile
//! cards/{accountId}                              PaymentProfile
//! cards/{accountId}/tokens/{tokenId}             PaymentToken (trigger input)
//! cards/{accountId}/sources/{fingerprint}        PaymentSource
//! items/{itemId}                                 CatalogItem
//!
//! profile_pics/{accountId}                       profile image blob
//! items/{itemId}/...                             item image blobs
//! ```

use core::fmt;

use super::id::{AccountId, Fingerprint, ItemId, TokenId};

/// Collection holding one [`UserProfile`](super::UserProfile) per account.
pub const USERS: &str = "users";
/// Collection holding one [`PaymentProfile`](super::PaymentProfile) per account.
pub const CARDS: &str = "cards";
/// Subcollection of `cards/{accountId}` receiving client card tokens.
pub const TOKENS: &str = "tokens";
/// Subcollection of `cards/{accountId}` holding persisted payment sources.
pub const SOURCES: &str = "sources";
/// Collection of catalog items.
pub const ITEMS: &str = "items";

/// Path of a document relative to the database's `documents` root.
///
/// Only constructible from typed IDs, so every segment is known to be
/// non-empty and slash-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// `users/{accountId}`
    #[must_use]
    pub fn user(account: &AccountId) -> Self {
        Self(format!("{USERS}/{account}"))
    }

    /// `cards/{accountId}`
    #[must_use]
    pub fn payment_profile(account: &AccountId) -> Self {
        Self(format!("{CARDS}/{account}"))
    }

    /// `cards/{accountId}/tokens/{tokenId}`
    #[must_use]
    pub fn payment_token(account: &AccountId, token: &TokenId) -> Self {
        Self(format!("{CARDS}/{account}/{TOKENS}/{token}"))
    }

    /// `cards/{accountId}/sources/{fingerprint}`
    #[must_use]
    pub fn payment_source(account: &AccountId, fingerprint: &Fingerprint) -> Self {
        Self(format!("{CARDS}/{account}/{SOURCES}/{fingerprint}"))
    }

    /// `items/{itemId}`
    #[must_use]
    pub fn catalog_item(item: &ItemId) -> Self {
        Self(format!("{ITEMS}/{item}"))
    }

    /// The slash-separated path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Object name of an account's profile image: `profile_pics/{accountId}`.
#[must_use]
pub fn profile_image(account: &AccountId) -> String {
    format!("profile_pics/{account}")
}

/// Object-name prefix shared by all images of an item: `items/{itemId}/`.
///
/// The trailing slash keeps item `a` from matching the images of item `ab`.
#[must_use]
pub fn item_images_prefix(item: &ItemId) -> String {
    format!("{ITEMS}/{item}/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::parse("uid42").unwrap()
    }

    #[test]
    fn test_document_paths() {
        let token = TokenId::parse("t1").unwrap();
        let fingerprint = Fingerprint::parse("fp9").unwrap();
        let item = ItemId::parse("X").unwrap();

        assert_eq!(DocumentPath::user(&account()).as_str(), "users/uid42");
        assert_eq!(
            DocumentPath::payment_profile(&account()).as_str(),
            "cards/uid42"
        );
        assert_eq!(
            DocumentPath::payment_token(&account(), &token).as_str(),
            "cards/uid42/tokens/t1"
        );
        assert_eq!(
            DocumentPath::payment_source(&account(), &fingerprint).as_str(),
            "cards/uid42/sources/fp9"
        );
        assert_eq!(DocumentPath::catalog_item(&item).as_str(), "items/X");
    }

    #[test]
    fn test_segments() {
        let fingerprint = Fingerprint::parse("fp9").unwrap();
        let path = DocumentPath::payment_source(&account(), &fingerprint);
        assert_eq!(
            path.segments().collect::<Vec<_>>(),
            vec!["cards", "uid42", "sources", "fp9"]
        );
    }

    #[test]
    fn test_blob_paths() {
        assert_eq!(profile_image(&account()), "profile_pics/uid42");
        assert_eq!(
            item_images_prefix(&ItemId::parse("X").unwrap()),
            "items/X/"
        );
    }
}
