//! Document Encoding
//!
//! Turns model values into the opaque documents carried by patch operations
//! and request bodies, and holds the fixed-width identifier and bit rate
//! encodings used by TS 29.571 data types.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MbsmfError, MbsmfResult};

/// Encoded value as sent on the wire
pub type Document = serde_json::Value;

/// Anything that can be rendered as a [`Document`]
///
/// Encoding never fails loudly: a value the encoder rejects yields `None`
/// and the patch operation is emitted without a value.
pub trait ToDocument {
    fn to_document(&self) -> Option<Document>;
}

impl<T: Serialize + ?Sized> ToDocument for T {
    fn to_document(&self) -> Option<Document> {
        match serde_json::to_value(self) {
            Ok(doc) => Some(doc),
            Err(e) => {
                log::warn!("Failed to encode document: {e}");
                None
            }
        }
    }
}

/// Render `value` as an uppercase, zero padded hex string of `digits` digits
pub fn hex_fixed(value: u64, digits: usize) -> String {
    format!("{:0digits$X}", value, digits = digits)
}

/// Parse a hex string of exactly `digits` digits
pub fn hex_parse(field: &'static str, s: &str, digits: usize) -> MbsmfResult<u64> {
    if s.len() != digits || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MbsmfError::invalid(
            field,
            format!("expected {digits} hex digits, got '{s}'"),
        ));
    }
    u64::from_str_radix(s, 16).map_err(|e| MbsmfError::invalid(field, e.to_string()))
}

macro_rules! hex_identifier {
    ($(#[$doc:meta])* $name:ident, $inner:ty, $bits:expr, $digits:expr, $field:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) $inner);

        impl $name {
            pub const BITS: u32 = $bits;
            pub const DIGITS: usize = $digits;
            pub const MAX: $inner = ((1u64 << $bits) - 1) as $inner;

            /// Values wider than the field are rejected
            pub fn new(value: $inner) -> MbsmfResult<Self> {
                if value > Self::MAX {
                    return Err(MbsmfError::invalid(
                        $field,
                        format!("{value:#X} does not fit in {} bits", Self::BITS),
                    ));
                }
                Ok(Self(value))
            }

            pub fn value(&self) -> $inner {
                self.0
            }

            /// Hex rendering used on the wire
            pub fn to_hex(&self) -> String {
                hex_fixed(self.0 as u64, Self::DIGITS)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = MbsmfError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                hex_parse($field, s, Self::DIGITS).map(|v| Self(v as $inner))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// NR cell identity (36 bits, 9 hex digits)
    NrCellId, u64, 36, 9, "nrCellId"
);
hex_identifier!(
    /// Network identifier (44 bits, 11 hex digits)
    Nid, u64, 44, 11, "nid"
);
hex_identifier!(
    /// MBS Frequency Selection Area identifier (24 bits, 6 hex digits)
    FsaId, u32, 24, 6, "mbsFsaId"
);
hex_identifier!(
    /// 5GS tracking area code (24 bits, 6 hex digits)
    Tac, u32, 24, 6, "tac"
);

const BITRATE_UNITS: [(u64, &str); 5] = [
    (1_000_000_000_000, "Tbps"),
    (1_000_000_000, "Gbps"),
    (1_000_000, "Mbps"),
    (1_000, "Kbps"),
    (1, "bps"),
];

/// Bit rate in bits per second, rendered as `"<n>[.<frac>] <unit>"`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitRate(pub u64);

impl BitRate {
    pub fn bps(value: u64) -> Self {
        Self(value)
    }

    pub fn kbps(value: u64) -> Self {
        Self(value.saturating_mul(1_000))
    }

    pub fn mbps(value: u64) -> Self {
        Self(value.saturating_mul(1_000_000))
    }
}

impl fmt::Display for BitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Largest unit that still renders exactly with at most three decimals
        for (scale, unit) in BITRATE_UNITS {
            if self.0 < scale {
                continue;
            }
            let step = (scale / 1_000).max(1);
            if self.0 % step != 0 {
                continue;
            }
            let whole = self.0 / scale;
            let frac = (self.0 % scale) / step;
            if frac == 0 || scale == 1 {
                return write!(f, "{whole} {unit}");
            }
            let frac = format!("{frac:03}");
            return write!(f, "{whole}.{} {unit}", frac.trim_end_matches('0'));
        }
        write!(f, "0 bps")
    }
}

impl FromStr for BitRate {
    type Err = MbsmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || MbsmfError::invalid("bitRate", format!("malformed bit rate '{s}'"));

        let (number, unit) = s.trim().split_once(' ').ok_or_else(bad)?;
        let scale = BITRATE_UNITS
            .iter()
            .find(|(_, u)| *u == unit)
            .map(|(scale, _)| *scale)
            .ok_or_else(bad)?;

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }

        let whole: u64 = whole.parse().map_err(|_| bad())?;
        let mut value = whole.checked_mul(scale).ok_or_else(bad)?;

        let mut place = scale;
        for digit in frac.chars() {
            place /= 10;
            if place == 0 {
                // Sub-bps precision is dropped
                break;
            }
            let d = digit.to_digit(10).ok_or_else(bad)? as u64;
            value = value.checked_add(d * place).ok_or_else(bad)?;
        }
        Ok(Self(value))
    }
}

impl Serialize for BitRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BitRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// SDF reservation priority, `PRIO_1` (highest) to `PRIO_16`
///
/// The unset value (0) is represented by the absence of the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReservPriority(u8);

impl ReservPriority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 16;

    /// `0` means unset and yields `Ok(None)`
    pub fn new(level: u8) -> MbsmfResult<Option<Self>> {
        match level {
            0 => Ok(None),
            Self::MIN..=Self::MAX => Ok(Some(Self(level))),
            _ => Err(MbsmfError::invalid(
                "mbsSdfResPrio",
                format!("priority {level} outside 1..=16"),
            )),
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ReservPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PRIO_{}", self.0)
    }
}

impl Serialize for ReservPriority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReservPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let level: u8 = s
            .strip_prefix("PRIO_")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| D::Error::custom(format!("invalid reservation priority '{s}'")))?;
        match ReservPriority::new(level) {
            Ok(Some(prio)) => Ok(prio),
            Ok(None) => Err(D::Error::custom("PRIO_0 is not a valid priority")),
            Err(e) => Err(D::Error::custom(e)),
        }
    }
}
