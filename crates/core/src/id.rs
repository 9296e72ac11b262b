//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque random strings. Domain crates declare their own with
//! [`string_id!`](crate::string_id).

use uuid::Uuid;

/// Generate a fresh opaque identifier value.
///
/// Uses UUIDv7 in its compact (hyphen-less) form so ids sort by creation time.
pub fn generate() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Declare a string-backed identifier newtype.
#[macro_export]
macro_rules! string_id {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self($crate::id::generate())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $t {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

string_id!(
    /// Identifier of a user (actor identity).
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_compact() {
        let a = UserId::new();
        let b = UserId::new();

        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(!a.as_str().contains('-'));
    }

    #[test]
    fn ids_round_trip_through_strings() {
        let id = UserId::from("john");

        assert_eq!(id.to_string(), "john");
        assert_eq!(String::from(id.clone()), "john");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("john"));
    }
}
