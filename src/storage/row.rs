//! The fixed-width row stored in every leaf cell.
//!
//! `Row` has exactly three columns — `id`, `username`, `email` — serialized as the
//! concatenation of fixed-width fields: `4 + 33 + 256 = 293` bytes (`ROW_SIZE`). There
//! is no variable-length encoding and no other schema; multi-column, multi-table support
//! is out of scope.

use crate::err;
use crate::errors::Error;

pub const USERNAME_MAX_LEN: usize = 32;
pub const EMAIL_MAX_LEN: usize = 255;

const ID_SIZE: usize = std::mem::size_of::<u32>();
const USERNAME_SIZE: usize = USERNAME_MAX_LEN + 1; // + NUL
const EMAIL_SIZE: usize = EMAIL_MAX_LEN + 1; // + NUL

const ID_OFFSET: usize = 0;
const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// Size in bytes of a row's serialized form.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Builds a row after checking the username/email length limits.
    pub fn new(id: u32, username: impl Into<String>, email: impl Into<String>) -> Result<Self, Error> {
        let username = username.into();
        let email = email.into();
        if username.len() >= USERNAME_MAX_LEN {
            return Err(err!(Syntax, "string is too long."));
        }
        if email.len() >= EMAIL_MAX_LEN {
            return Err(err!(Syntax, "string is too long."));
        }
        Ok(Row { id, username, email })
    }

    /// Serializes the row into a `ROW_SIZE`-byte buffer at the fixed field offsets.
    pub fn encode(&self) -> [u8; ROW_SIZE] {
        let mut buf = [0u8; ROW_SIZE];
        buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        write_fixed_str(&mut buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE], &self.username);
        write_fixed_str(&mut buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE], &self.email);
        buf
    }

    /// Parses a row out of a `ROW_SIZE`-byte buffer produced by `encode`.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != ROW_SIZE {
            return Err(err!(
                Storage,
                "row buffer has {} bytes, expected {}",
                buf.len(),
                ROW_SIZE
            ));
        }
        let id = u32::from_le_bytes(buf[ID_OFFSET..ID_OFFSET + ID_SIZE].try_into().map_err(
            |e| err!(Storage, "failed to decode row id: {:?}", e),
        )?);
        let username = read_fixed_str(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE])?;
        let email = read_fixed_str(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE])?;
        Ok(Row { id, username, email })
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

fn write_fixed_str(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0; // NUL terminator, rest is already zeroed
}

fn read_fixed_str(src: &[u8]) -> Result<String, Error> {
    let nul = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8(src[..nul].to_vec())
        .map_err(|e| err!(Storage, "row field is not valid UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_size_is_293_bytes() {
        assert_eq!(ROW_SIZE, 293);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let row = Row::new(7, "alice", "a@x").unwrap();
        let decoded = Row::decode(&row.encode()).unwrap();
        assert_eq!(row, decoded);
    }

    #[test]
    fn username_at_limit_is_accepted_over_limit_rejected() {
        let ok = "a".repeat(USERNAME_MAX_LEN - 1);
        assert!(Row::new(1, ok, "e").is_ok());
        let too_long = "a".repeat(USERNAME_MAX_LEN);
        assert!(Row::new(1, too_long, "e").is_err());
    }

    #[test]
    fn email_at_limit_is_accepted_over_limit_rejected() {
        let ok = "a".repeat(EMAIL_MAX_LEN - 1);
        assert!(Row::new(1, "u", ok).is_ok());
        let too_long = "a".repeat(EMAIL_MAX_LEN);
        assert!(Row::new(1, "u", too_long).is_err());
    }

    #[test]
    fn display_matches_select_format() {
        let row = Row::new(1, "alice", "a@x").unwrap();
        assert_eq!(row.to_string(), "(1, alice, a@x)");
    }
}
