//! Newtype wrappers for digest strings, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Full 64-character hex digest of a composed environment descriptor.
    DescriptorDigest
);

string_newtype!(
    /// Truncated 12-character prefix of a [`DescriptorDigest`], used for display.
    ShortDigest
);

string_newtype!(
    /// Blake3 digest of a single descriptor entry's canonical value.
    ValueDigest
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_display_and_as_ref() {
        let d = DescriptorDigest::new("abc123");
        assert_eq!(d.to_string(), "abc123");
        assert_eq!(d.as_str(), "abc123");
        assert_eq!(AsRef::<str>::as_ref(&d), "abc123");
    }

    #[test]
    fn digest_serializes_as_plain_string() {
        let d = ValueDigest::new("deadbeef");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: ValueDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn short_digest_compares_with_strings() {
        let s = ShortDigest::from("abc123def456");
        assert!(s == *"abc123def456");
        assert!(s == "abc123def456".to_owned());
        assert_eq!(s.into_inner(), "abc123def456");
    }
}
