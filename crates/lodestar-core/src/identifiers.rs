//! Core identifier types
//!
//! Devices, services and ports are all named by operators, so the identifiers
//! are thin string newtypes. They order lexicographically, which is what the
//! PathMap builder relies on for reproducible output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is blank
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Device identifier, also the name of a service entry
    ///
    /// One entry in a service document addresses one device component, so
    /// the entry name and the device name are the same thing.
    DeviceId
);

string_id!(
    /// Service document name, e.g. `transceivers` or `interfaces`
    ServiceName
);

string_id!(
    /// Port (or transceiver slot) name on a device, e.g. `oe1`
    PortId
);

/// Management protocol spoken by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// NETCONF over SSH
    Netconf,
    /// gNMI over gRPC
    Gnmi,
}

impl ProtocolKind {
    /// Every supported protocol
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::Netconf, ProtocolKind::Gnmi];

    /// Wire name as used in intent documents (`nos`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Netconf => "netconf",
            ProtocolKind::Gnmi => "gnmi",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netconf" => Ok(ProtocolKind::Netconf),
            "gnmi" => Ok(ProtocolKind::Gnmi),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryPatch;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = DeviceId::new("cassini1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"cassini1\"");
        assert_eq!(id.to_string(), "cassini1");
    }

    #[test]
    fn test_protocol_round_trips_through_text() {
        for protocol in ProtocolKind::ALL {
            let parsed: ProtocolKind = protocol.as_str().parse().unwrap();
            assert_eq!(parsed, protocol);
        }
        assert!("snmp".parse::<ProtocolKind>().is_err());
        assert_eq!(
            serde_json::from_str::<ProtocolKind>("\"netconf\"").unwrap(),
            ProtocolKind::Netconf
        );
    }

    #[test]
    fn test_blank_ids_are_empty() {
        assert!(PortId::new("  ").is_empty());
        assert!(!PortId::new("oe1").is_empty());
    }

    #[test]
    fn test_default_ids_are_blank() {
        assert!(DeviceId::default().is_empty());
        assert_eq!(EntryPatch::default().name, DeviceId::default());
    }
}
