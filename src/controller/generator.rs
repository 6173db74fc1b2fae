//! # Random Value Generator
//!
//! Produces the random strings written into managed Secrets.
//!
//! Characters are drawn uniformly from a fixed charset: the 62 ASCII letters and
//! digits, optionally extended with the punctuation set in
//! [`SPECIAL_CHARSET`](crate::constants::SPECIAL_CHARSET). The source is
//! `rand::thread_rng()`, a CSPRNG reseeded from the operating system, since the
//! output is used as a credential.
//!
//! ## Usage
//!
//! ```rust
//! use random_secret_controller::controller::generator::generate;
//!
//! let value = generate(16, false);
//! assert_eq!(value.len(), 16);
//! assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
//!
//! assert_eq!(generate(0, true), "");
//! ```

use crate::constants::{ALPHANUMERIC_CHARSET, SPECIAL_CHARSET};
use rand::Rng;

/// Which characters a generated value may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// `a-z`, `A-Z`, `0-9`
    Alphanumeric,
    /// Alphanumeric plus punctuation
    AlphanumericWithSpecial,
}

impl Charset {
    /// Pick the charset for a special character flag
    #[must_use]
    pub fn from_special(include_special: bool) -> Self {
        if include_special {
            Self::AlphanumericWithSpecial
        } else {
            Self::Alphanumeric
        }
    }

    /// Characters belonging to this charset
    #[must_use]
    pub fn chars(self) -> Vec<u8> {
        match self {
            Self::Alphanumeric => ALPHANUMERIC_CHARSET.to_vec(),
            Self::AlphanumericWithSpecial => {
                [ALPHANUMERIC_CHARSET, SPECIAL_CHARSET].concat()
            }
        }
    }

    /// Whether `c` may appear in a value generated with this charset
    #[must_use]
    pub fn contains(self, c: char) -> bool {
        u8::try_from(c).is_ok_and(|b| self.chars().contains(&b))
    }
}

/// Generate `length` characters drawn uniformly from the charset
///
/// `length == 0` yields an empty string.
#[must_use]
pub fn generate(length: usize, include_special: bool) -> String {
    generate_with(length, Charset::from_special(include_special))
}

/// Generate `length` characters drawn uniformly from `charset`
#[must_use]
pub fn generate_with(length: usize, charset: Charset) -> String {
    let chars = charset.chars();
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(chars[rng.gen_range(0..chars.len())]))
        .collect()
}
