use anyhow::{Result, anyhow, bail};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const BINARY_SUFFIXES: [(&str, u64); 6] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

const DECIMAL_SUFFIXES: [(&str, u64); 6] = [
    ("E", 1_000_000_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("T", 1_000_000_000_000),
    ("G", 1_000_000_000),
    ("M", 1_000_000),
    ("k", 1_000),
];

/// A byte count in Kubernetes quantity notation.
///
/// Always rendered in binary-SI canonical form (`30Ki`, `2Mi`, plain bytes
/// when no power of 1024 divides the value), which is how both dump sizes
/// and quota limits are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn saturating_add(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0");
        }
        for (suffix, factor) in BINARY_SUFFIXES {
            if self.0 % factor == 0 {
                return write!(f, "{}{}", self.0 / factor, suffix);
            }
        }
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quantity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        if digits.is_empty() {
            bail!("invalid quantity '{}': expected a non-negative integer", s);
        }
        let value: u64 = digits
            .parse()
            .map_err(|e| anyhow!("invalid quantity '{}': {}", s, e))?;

        let factor = if suffix.is_empty() {
            1
        } else {
            BINARY_SUFFIXES
                .iter()
                .chain(DECIMAL_SUFFIXES.iter())
                .find(|(name, _)| *name == suffix)
                .map(|(_, factor)| *factor)
                .ok_or_else(|| anyhow!("invalid quantity '{}': unknown suffix '{}'", s, suffix))?
        };

        value
            .checked_mul(factor)
            .map(Quantity)
            .ok_or_else(|| anyhow!("quantity '{}' overflows 64 bits", s))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl Visitor<'_> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a quantity string such as \"10Mi\" or a byte count")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        v.parse().map_err(|e: anyhow::Error| E::custom(e))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        Ok(Quantity(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        u64::try_from(v)
            .map(Quantity)
            .map_err(|_| E::custom(format!("quantity must not be negative (got {})", v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_binary_suffixes() {
        assert_eq!(Quantity::from_bytes(0).to_string(), "0");
        assert_eq!(Quantity::from_bytes(100).to_string(), "100");
        assert_eq!(Quantity::from_bytes(1536).to_string(), "1536");
        assert_eq!(Quantity::from_bytes(30 * 1024).to_string(), "30Ki");
        assert_eq!(Quantity::from_bytes(2 << 20).to_string(), "2Mi");
        assert_eq!(Quantity::from_bytes(1 << 30).to_string(), "1Gi");
    }

    #[test]
    fn parse_suffixes() {
        assert_eq!("10".parse::<Quantity>().unwrap().bytes(), 10);
        assert_eq!("1Gi".parse::<Quantity>().unwrap().bytes(), 1 << 30);
        assert_eq!("4Ki".parse::<Quantity>().unwrap().bytes(), 4096);
        assert_eq!("2k".parse::<Quantity>().unwrap().bytes(), 2000);
        assert_eq!(" 3M ".parse::<Quantity>().unwrap().bytes(), 3_000_000);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("Ki".parse::<Quantity>().is_err());
        assert!("-1".parse::<Quantity>().is_err());
        assert!("1.5Gi".parse::<Quantity>().is_err());
        assert!("10Xi".parse::<Quantity>().is_err());
        assert!("99999999999Ei".parse::<Quantity>().is_err());
    }

    #[test]
    fn json_accepts_strings_and_integers() {
        let q: Quantity = serde_json::from_str("\"5Mi\"").unwrap();
        assert_eq!(q.bytes(), 5 << 20);
        let q: Quantity = serde_json::from_str("1024").unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"1Ki\"");
        assert!(serde_json::from_str::<Quantity>("-4").is_err());
    }

    #[test]
    fn arithmetic_saturates() {
        let a = Quantity::from_bytes(10);
        assert_eq!(a.saturating_sub(Quantity::from_bytes(15)), Quantity::ZERO);
        assert_eq!(Quantity::from_bytes(u64::MAX).checked_add(a), None);
    }
}
