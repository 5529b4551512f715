// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! name_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// Unique row identifier, stable for the row's lifetime.
name_id!(Uid);
// Opaque view name (a mailbox, or a synthetic overlay such as the filter view).
name_id!(ViewName);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Prefix the rendering side uses for row element ids (`vp_row<uid>`).
pub const DOM_ID_PREFIX: &str = "vp_row";

pub fn dom_id_for(uid: &Uid) -> String {
    format!("{DOM_ID_PREFIX}{uid}")
}

/// Strips the six-character row prefix, mirroring how element ids are minted.
pub fn uid_from_dom_id(dom_id: &str) -> Uid {
    Uid::new(dom_id.get(DOM_ID_PREFIX.len()..).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{Uid, dom_id_for, uid_from_dom_id};

    #[test]
    fn dom_id_round_trips_through_prefix() {
        let uid = Uid::from("4711");
        assert_eq!(dom_id_for(&uid), "vp_row4711");
        assert_eq!(uid_from_dom_id("vp_row4711"), uid);
    }

    #[test]
    fn short_dom_id_yields_empty_uid() {
        assert_eq!(uid_from_dom_id("vp"), Uid::from(""));
    }
}
