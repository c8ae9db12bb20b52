//! Row identity.

use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::value::Value;

/// 128-bit row identifier.
///
/// Keys derived with [`Key::for_values`] are deterministic across runs, which
/// keeps join and flatten outputs reproducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub u128);

impl Key {
    /// Derive a key from an ordered list of values.
    pub fn for_values(values: &[Value]) -> Key {
        let mut hasher = Xxh3::new();
        hasher.update(&(values.len() as u64).to_le_bytes());
        for value in values {
            value.write_stable_bytes(&mut |bytes| hasher.update(bytes));
        }
        Key(hasher.digest128())
    }

    pub fn for_value(value: &Value) -> Key {
        Key::for_values(std::slice::from_ref(value))
    }

    /// Key for the `n`-th row of a static table.
    pub fn for_row(n: u64) -> Key {
        Key::for_values(&[Value::Int(n as i64)])
    }

    /// Uniform sample in `[0, 1)` derived from the key bits.
    pub fn unit_interval(&self) -> f64 {
        // 53 high bits fill an f64 mantissa exactly.
        ((self.0 >> 75) as f64) / ((1u64 << 53) as f64)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{:032X}", self.0)
    }
}
