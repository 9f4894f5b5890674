//! User-chosen case names.

use std::fmt;

use crate::error::NameError;
use crate::sanitize::escape_control;

pub const MAX_NAME_LEN: usize = 255;

/// Device names Windows reserves regardless of case or extension. A case
/// directory with one of these names cannot be opened on that platform.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A validated directory name for a new case: `[A-Za-z0-9_-]{1,255}`, not a
/// reserved device name.
///
/// Because no separator or dot can appear, joining a `CaseName` onto a
/// contained directory always yields a direct child of that directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseName(String);

impl CaseName {
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        if raw.is_empty() {
            return Err(NameError::Empty);
        }
        if raw.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong {
                len: raw.len(),
                max: MAX_NAME_LEN,
            });
        }
        if !raw.bytes().all(is_name_byte) {
            return Err(NameError::InvalidCharacters {
                name: escape_control(raw).into_owned(),
            });
        }
        if is_reserved(raw) {
            return Err(NameError::Reserved {
                name: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}
