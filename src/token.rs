// File: token.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Byte-level recognition of the two tokens the harness cares about: the
//! HTTP/1.1 status line prefix and the `X-Desync-Id` marker header.

pub const STATUS_PREFIX: &[u8] = b"HTTP/1.1 ";
pub const MARKER_PREFIX: &[u8] = b"X-Desync-Id:";

/// Length of the longest token prefix.
pub const MAX_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Status,
    Marker,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Status, TokenKind::Marker];

    pub fn prefix(self) -> &'static [u8] {
        match self {
            TokenKind::Status => STATUS_PREFIX,
            TokenKind::Marker => MARKER_PREFIX,
        }
    }

    /// Marker values may carry a sign, status codes never do.
    pub fn signed(self) -> bool {
        matches!(self, TokenKind::Marker)
    }

    fn byte_eq(self, a: u8, b: u8) -> bool {
        match self {
            TokenKind::Status => a == b,
            TokenKind::Marker => a.eq_ignore_ascii_case(&b),
        }
    }

    /// True when the full prefix starts at `pos`.
    pub fn matches_at(self, data: &[u8], pos: usize) -> bool {
        let prefix = self.prefix();
        data.len() >= pos + prefix.len()
            && data[pos..pos + prefix.len()]
                .iter()
                .zip(prefix)
                .all(|(a, b)| self.byte_eq(*a, *b))
    }

    /// True when `tail` is a non-empty proper prefix of the token prefix,
    /// i.e. the token may continue in the next read.
    pub fn is_partial(self, tail: &[u8]) -> bool {
        let prefix = self.prefix();
        !tail.is_empty()
            && tail.len() < prefix.len()
            && tail.iter().zip(prefix).all(|(a, b)| self.byte_eq(*a, *b))
    }
}

/// Earliest token occurrence at or after `from`.
pub fn find_next(data: &[u8], from: usize) -> Option<(usize, TokenKind)> {
    (from..data.len()).find_map(|pos| {
        TokenKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.matches_at(data, pos))
            .map(|kind| (pos, kind))
    })
}

/// Start of the longest suffix of `data` that could grow into a token prefix.
pub fn partial_suffix_start(data: &[u8]) -> Option<usize> {
    let first = data.len().saturating_sub(MAX_PREFIX_LEN - 1);
    (first..data.len()).find(|start| {
        TokenKind::ALL
            .iter()
            .any(|kind| kind.is_partial(&data[*start..]))
    })
}

/// Outcome of reading the number that follows a token prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueParse {
    /// Digits ended before the end of the data; `end` is one past the last digit.
    Number { value: i64, end: usize },
    /// Something other than a number follows; `end` is where scanning resumes.
    NoDigits { end: usize },
    /// The data ran out before the value was known to be complete. Holds the
    /// digits seen so far, if any.
    Truncated { partial: Option<i64> },
}

/// Parses the decimal value starting at `start`: blanks, an optional sign
/// when `signed`, then a run of digits. Never fails: overlong numbers
/// saturate.
pub fn parse_value(data: &[u8], start: usize, signed: bool) -> ValueParse {
    let mut pos = start;
    while pos < data.len() && matches!(data[pos], b' ' | b'\t') {
        pos += 1;
    }
    if pos == data.len() {
        return ValueParse::Truncated { partial: None };
    }

    let mut negative = false;
    if signed && matches!(data[pos], b'-' | b'+') {
        negative = data[pos] == b'-';
        pos += 1;
        if pos == data.len() {
            return ValueParse::Truncated { partial: None };
        }
    }

    if !data[pos].is_ascii_digit() {
        return ValueParse::NoDigits { end: pos };
    }

    let mut value: i64 = 0;
    while pos < data.len() && data[pos].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(data[pos] - b'0'));
        pos += 1;
    }
    if negative {
        value = -value;
    }

    if pos == data.len() {
        ValueParse::Truncated {
            partial: Some(value),
        }
    } else {
        ValueParse::Number { value, end: pos }
    }
}

/// Digits kept for a value carried across reads. Twelve digits already
/// exceed both field widths, so any longer run clamps to the same result.
pub const CARRIED_DIGITS: usize = 12;

/// Compact stand-in for a token whose value runs into the end of `data`.
///
/// Keeps the prefix, one blank if any were seen, the sign and the
/// significant digits. Parsing it joined with the following bytes gives the
/// same value as parsing the raw tail would.
pub fn pending_fragment(kind: TokenKind, data: &[u8], value_start: usize) -> Vec<u8> {
    let mut fragment = kind.prefix().to_vec();
    let mut pos = value_start;

    let blanks = data[pos..]
        .iter()
        .take_while(|b| matches!(**b, b' ' | b'\t'))
        .count();
    if blanks > 0 {
        fragment.push(b' ');
        pos += blanks;
    }

    if kind.signed() && pos < data.len() && matches!(data[pos], b'-' | b'+') {
        fragment.push(data[pos]);
        pos += 1;
    }

    let digits = &data[pos..];
    let significant = match digits.iter().position(|b| *b != b'0') {
        Some(first) => &digits[first..],
        None => &digits[digits.len().saturating_sub(1)..],
    };
    if significant.len() > CARRIED_DIGITS {
        fragment.extend(std::iter::repeat(b'9').take(CARRIED_DIGITS));
    } else {
        fragment.extend_from_slice(significant);
    }
    fragment
}

pub fn clamp_status(value: i64) -> i16 {
    value.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

pub fn clamp_order(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Value of the first marker header in a complete message, if any.
pub fn extract_marker(message: &[u8]) -> Option<i32> {
    let mut from = 0;
    while let Some((pos, kind)) = find_next(message, from) {
        let value_start = pos + kind.prefix().len();
        if kind == TokenKind::Marker {
            return match parse_value(message, value_start, true) {
                ValueParse::Number { value, .. } => Some(clamp_order(value)),
                ValueParse::Truncated {
                    partial: Some(value),
                } => Some(clamp_order(value)),
                _ => None,
            };
        }
        from = value_start;
    }
    None
}
