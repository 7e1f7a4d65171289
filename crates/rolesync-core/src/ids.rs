use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chat-platform snowflake identifiers. Opaque strings, compared verbatim.
macro_rules! snowflake_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Game tags (`#2PP`), normalized on construction: upper-cased, `O` read as
/// `0`, leading `#` enforced. Deserialization normalizes too.
macro_rules! game_tag {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: &str) -> Self {
                Self(normalize_tag(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Tag without the leading `#`, URL-encoded form for API paths.
            pub fn encoded(&self) -> String {
                format!("%23{}", &self.0[1..])
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(d)?;
                Ok(Self::new(&raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::new(s))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

snowflake_id!(GuildId);
snowflake_id!(UserId);
snowflake_id!(RoleId);

game_tag!(PlayerTag);
game_tag!(ClanTag);

fn normalize_tag(raw: &str) -> String {
    let body: String = raw
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c.to_ascii_uppercase() {
            'O' => '0',
            other => other,
        })
        .collect();
    format!("#{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_normalized() {
        assert_eq!(PlayerTag::new("2pp").as_str(), "#2PP");
        assert_eq!(PlayerTag::new("#8qo9").as_str(), "#8Q09");
        assert_eq!(ClanTag::new("  #abc ").as_str(), "#ABC");
    }

    #[test]
    fn tag_encoded_for_paths() {
        assert_eq!(ClanTag::new("#2PP").encoded(), "%232PP");
    }

    #[test]
    fn tag_deserialize_normalizes() {
        let tag: PlayerTag = serde_json::from_str("\"#lqo\"").unwrap();
        assert_eq!(tag, PlayerTag::new("#LQ0"));
    }

    #[test]
    fn snowflake_roundtrips_verbatim() {
        let id: GuildId = "123456789012345678".parse().unwrap();
        assert_eq!(id.as_str(), "123456789012345678");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"123456789012345678\"");
    }

    #[test]
    fn ids_order_lexically() {
        let a = RoleId::from_raw("1");
        let b = RoleId::from_raw("2");
        assert!(a < b);
    }
}
