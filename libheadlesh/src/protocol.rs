// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The request envelope wire format: `<out>\n<err>\n<status>\n<script>`.
//! Parsing works over raw byte slices throughout; nothing here assumes
//! a null terminator or a bounded stack buffer.

use crate::consts::PATH_FIELD_MAX;

const SEP: u8 = b'\n';

/// A parsed request envelope. The three path fields are validated
/// (absolute, no control bytes, within `PATH_FIELD_MAX`) by `parse`;
/// `script` is the remaining bytes, unvalidated.
#[derive(Debug, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub out_path: &'a [u8],
    pub err_path: &'a [u8],
    pub status_path: &'a [u8],
    pub script: &'a [u8],
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    MissingSeparator,
    PathTooLong,
    PathNotAbsolute,
    PathHasControlByte,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingSeparator => write!(f, "envelope is missing a field separator"),
            ParseError::PathTooLong => write!(f, "a path field exceeds PATH_FIELD_MAX"),
            ParseError::PathNotAbsolute => write!(f, "a path field is not an absolute path"),
            ParseError::PathHasControlByte => write!(f, "a path field contains a control byte"),
        }
    }
}

/// Parses a raw buffer into an `Envelope`, validating the three path
/// fields per `spec.md` §9's "simple policy": absolute, no control
/// bytes, length at most `PATH_FIELD_MAX`.
pub fn parse(buf: &[u8]) -> Result<Envelope<'_>, ParseError> {
    let (out_path, rest) = split_field(buf)?;
    let (err_path, rest) = split_field(rest)?;
    let (status_path, script) = split_field(rest)?;

    for field in [out_path, err_path, status_path] {
        validate_path_field(field)?;
    }

    Ok(Envelope { out_path, err_path, status_path, script })
}

fn split_field(buf: &[u8]) -> Result<(&[u8], &[u8]), ParseError> {
    let pos = buf.iter().position(|&b| b == SEP).ok_or(ParseError::MissingSeparator)?;
    Ok((&buf[..pos], &buf[pos + 1..]))
}

fn validate_path_field(field: &[u8]) -> Result<(), ParseError> {
    if field.len() > PATH_FIELD_MAX {
        return Err(ParseError::PathTooLong);
    }
    if !field.starts_with(b"/") {
        return Err(ParseError::PathNotAbsolute);
    }
    if field.iter().any(|&b| b < 0x20 || b == 0x7f) {
        return Err(ParseError::PathHasControlByte);
    }
    Ok(())
}

/// Builds the wire bytes for a request envelope.
pub fn encode(out_path: &[u8], err_path: &[u8], status_path: &[u8], script: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(out_path.len() + err_path.len() + status_path.len() + script.len() + 3);
    buf.extend_from_slice(out_path);
    buf.push(SEP);
    buf.extend_from_slice(err_path);
    buf.push(SEP);
    buf.extend_from_slice(status_path);
    buf.push(SEP);
    buf.extend_from_slice(script);
    buf
}

pub fn is_exit_sentinel(script: &[u8]) -> bool {
    script == crate::consts::EXIT_SENTINEL
}

/// Parses the status channel's content: leading decimal digits, then
/// optional trailing whitespace, then nothing else. Returns the parsed
/// value truncated to `u8`, per `spec.md` §6 ("Values outside [0,255]
/// ... truncated to a uint8").
pub fn parse_status(buf: &[u8]) -> Option<u8> {
    let mut digits_end = 0;
    while digits_end < buf.len() && buf[digits_end].is_ascii_digit() {
        digits_end += 1;
    }
    if digits_end == 0 {
        return None;
    }
    if buf[digits_end..].iter().any(|b| !b.is_ascii_whitespace()) {
        return None;
    }
    let digits = std::str::from_utf8(&buf[..digits_end]).ok()?;
    let value: u64 = digits.parse().ok()?;
    Some((value % 256) as u8)
}
