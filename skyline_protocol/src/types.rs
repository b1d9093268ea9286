// Entity identifiers as they appear on the wire.
//
// The simulation server names buildings, tenants and people either with
// compact integers or with hex UUID strings, depending on which part of the
// server emitted the event. `WireId` accepts both without guessing: JSON
// numbers become `Index`, JSON strings become `Name`. The typed wrappers are
// `#[serde(transparent)]` so the payload shape stays `{"id": 7}` or
// `{"id": "3fa2..."}`.
//
// These are mirror-side keys only. Nothing here is generated locally; every
// id originates on the server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A server-assigned identifier: integer or string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Index(u64),
    Name(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Index(n) => write!(f, "{n}"),
            WireId::Name(s) => f.write_str(s),
        }
    }
}

impl From<u64> for WireId {
    fn from(n: u64) -> Self {
        WireId::Index(n)
    }
}

impl From<&str> for WireId {
    fn from(s: &str) -> Self {
        WireId::Name(s.to_owned())
    }
}

macro_rules! wire_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub WireId);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(WireId::Index(n))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(WireId::Name(s.to_owned()))
            }
        }
    };
}

wire_id!(
    /// Building identity, assigned positionally to lattice cells at setup.
    BuildingId
);
wire_id!(
    /// Tenant identity. Not unique within a building: the server may report
    /// the same tenant id more than once.
    TenantId
);
wire_id!(
    /// Resident identity.
    PersonId
);
