//! Hierarchical tile addresses
//!
//! An address is a digit string: an optional page prefix (base-8 page index)
//! followed by one spatial digit per LOD level, coarsest first. Each spatial
//! digit interleaves one bit of the column and one bit of the row, so a
//! tile's address is always its parent's address plus one digit.

use std::fmt;

use crate::error::{Result, TilerError};

/// Children per group node
pub const BRANCHING: u32 = 8;

/// A tile or group address. The empty address is the document root.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Address with the last digit dropped; `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Address> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_string()))
        }
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Address) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Number of base-8 digits needed to name every page: `ceil(log8(page_count))`
#[must_use]
pub fn page_prefix_digits(page_count: usize) -> usize {
    let mut digits = 0;
    let mut capacity = 1usize;
    while capacity < page_count {
        capacity = capacity.saturating_mul(BRANCHING as usize);
        digits += 1;
    }
    digits
}

/// Base-8 page prefix, zero padded to `page_prefix_digits(page_count)`
#[must_use]
pub fn page_prefix(page: usize, page_count: usize) -> String {
    let digits = page_prefix_digits(page_count);
    if digits == 0 {
        String::new()
    } else {
        format!("{page:0digits$o}")
    }
}

/// Spatial digits carried by a tile at `depth` in a ladder of `levels` levels
#[must_use]
pub fn spatial_digits(levels: usize, depth: usize) -> usize {
    levels - depth
}

/// Address of tile `(i, j)` of `page` at `depth`.
///
/// Fails when `i` or `j` cannot be represented in the spatial digits available
/// at this depth, which would make two tiles share an address.
pub fn address(
    page: usize,
    page_count: usize,
    levels: usize,
    depth: usize,
    i: u32,
    j: u32,
) -> Result<Address> {
    if page >= page_count || depth >= levels {
        return Err(TilerError::AddressCollision {
            address: String::new(),
            detail: format!("page {page}/{page_count} depth {depth}/{levels} out of range"),
        });
    }

    let digits = spatial_digits(levels, depth);
    let prefix = page_prefix(page, page_count);
    let limit = 1u64 << digits.min(63);
    if u64::from(i) >= limit || u64::from(j) >= limit {
        return Err(TilerError::AddressCollision {
            address: prefix,
            detail: format!(
                "tile ({i}, {j}) of page {page} does not fit {digits} digits at depth {depth}"
            ),
        });
    }

    let mut s = String::with_capacity(prefix.len() + digits);
    s.push_str(&prefix);
    for k in (0..digits).rev() {
        let bit_i = bit(i, k);
        let bit_j = bit(j, k);
        s.push(char::from(b'0' + (bit_i | (bit_j << 1))));
    }
    Ok(Address(s))
}

fn bit(v: u32, k: usize) -> u8 {
    if k >= 32 { 0 } else { ((v >> k) & 1) as u8 }
}
