//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use regex::Regex;

use crate::YangSpec;

/// A YANG leaf type with its restrictions.
///
/// Values are carried as canonical text throughout the tree; a `TypeSpec`
/// decides whether a given text is acceptable. Leafref referential
/// integrity is checked by the validator against the data tree, not here.
#[derive(Clone, Debug)]
pub enum TypeSpec {
    Int {
        width: IntWidth,
        range: Vec<(i64, i64)>,
    },
    Uint {
        width: IntWidth,
        range: Vec<(u64, u64)>,
    },
    Decimal64 {
        fraction_digits: u8,
        // Range bounds scaled by 10^fraction-digits.
        range: Vec<(i64, i64)>,
    },
    Boolean,
    Empty,
    String {
        length: Vec<(u64, u64)>,
        patterns: Vec<String>,
    },
    Binary {
        length: Vec<(u64, u64)>,
    },
    Enumeration {
        names: Vec<String>,
    },
    Bits {
        names: Vec<String>,
    },
    IdentityRef {
        base: String,
    },
    LeafRef {
        path: String,
    },
    Union {
        members: Vec<TypeSpec>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

// ===== impl IntWidth =====

impl IntWidth {
    fn signed_bounds(&self) -> (i64, i64) {
        match self {
            IntWidth::W8 => (i8::MIN as i64, i8::MAX as i64),
            IntWidth::W16 => (i16::MIN as i64, i16::MAX as i64),
            IntWidth::W32 => (i32::MIN as i64, i32::MAX as i64),
            IntWidth::W64 => (i64::MIN, i64::MAX),
        }
    }

    fn unsigned_bounds(&self) -> (u64, u64) {
        match self {
            IntWidth::W8 => (0, u8::MAX as u64),
            IntWidth::W16 => (0, u16::MAX as u64),
            IntWidth::W32 => (0, u32::MAX as u64),
            IntWidth::W64 => (0, u64::MAX),
        }
    }
}

// ===== impl TypeSpec =====

impl TypeSpec {
    pub fn int8() -> TypeSpec {
        TypeSpec::Int {
            width: IntWidth::W8,
            range: vec![],
        }
    }

    pub fn int16() -> TypeSpec {
        TypeSpec::Int {
            width: IntWidth::W16,
            range: vec![],
        }
    }

    pub fn int32() -> TypeSpec {
        TypeSpec::Int {
            width: IntWidth::W32,
            range: vec![],
        }
    }

    pub fn int64() -> TypeSpec {
        TypeSpec::Int {
            width: IntWidth::W64,
            range: vec![],
        }
    }

    pub fn uint8() -> TypeSpec {
        TypeSpec::Uint {
            width: IntWidth::W8,
            range: vec![],
        }
    }

    pub fn uint16() -> TypeSpec {
        TypeSpec::Uint {
            width: IntWidth::W16,
            range: vec![],
        }
    }

    pub fn uint32() -> TypeSpec {
        TypeSpec::Uint {
            width: IntWidth::W32,
            range: vec![],
        }
    }

    pub fn uint64() -> TypeSpec {
        TypeSpec::Uint {
            width: IntWidth::W64,
            range: vec![],
        }
    }

    pub fn decimal64(fraction_digits: u8) -> TypeSpec {
        TypeSpec::Decimal64 {
            fraction_digits,
            range: vec![],
        }
    }

    pub fn string() -> TypeSpec {
        TypeSpec::String {
            length: vec![],
            patterns: vec![],
        }
    }

    pub fn binary() -> TypeSpec {
        TypeSpec::Binary { length: vec![] }
    }

    pub fn enumeration(names: &[&str]) -> TypeSpec {
        TypeSpec::Enumeration {
            names: names.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    pub fn bits(names: &[&str]) -> TypeSpec {
        TypeSpec::Bits {
            names: names.iter().map(|name| (*name).to_owned()).collect(),
        }
    }

    pub fn identityref(base: &str) -> TypeSpec {
        TypeSpec::IdentityRef {
            base: base.to_owned(),
        }
    }

    pub fn leafref(path: &str) -> TypeSpec {
        TypeSpec::LeafRef {
            path: path.to_owned(),
        }
    }

    pub fn union(members: Vec<TypeSpec>) -> TypeSpec {
        TypeSpec::Union { members }
    }

    #[must_use]
    pub fn with_signed_range(mut self, min: i64, max: i64) -> TypeSpec {
        match &mut self {
            TypeSpec::Int { range, .. } | TypeSpec::Decimal64 { range, .. } => {
                range.push((min, max));
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn with_unsigned_range(mut self, min: u64, max: u64) -> TypeSpec {
        if let TypeSpec::Uint { range, .. } = &mut self {
            range.push((min, max));
        }
        self
    }

    #[must_use]
    pub fn with_length(mut self, min: u64, max: u64) -> TypeSpec {
        match &mut self {
            TypeSpec::String { length, .. }
            | TypeSpec::Binary { length, .. } => {
                length.push((min, max));
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> TypeSpec {
        if let TypeSpec::String { patterns, .. } = &mut self {
            patterns.push(pattern.to_owned());
        }
        self
    }

    /// Checks a text value against the type and its restrictions. Returns
    /// a human-readable reason on rejection.
    pub fn check_value(
        &self,
        spec: &YangSpec,
        value: &str,
    ) -> Result<(), String> {
        match self {
            TypeSpec::Int { width, range } => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| format!("\"{value}\" is not an integer"))?;
                let (min, max) = width.signed_bounds();
                if parsed < min || parsed > max {
                    return Err(format!("{parsed} is out of range [{min}, {max}]"));
                }
                if !range.is_empty()
                    && !range.iter().any(|&(lo, hi)| parsed >= lo && parsed <= hi)
                {
                    return Err(format!("{parsed} is outside the allowed range"));
                }
                Ok(())
            }
            TypeSpec::Uint { width, range } => {
                let parsed = value.parse::<u64>().map_err(|_| {
                    format!("\"{value}\" is not an unsigned integer")
                })?;
                let (min, max) = width.unsigned_bounds();
                if parsed < min || parsed > max {
                    return Err(format!("{parsed} is out of range [{min}, {max}]"));
                }
                if !range.is_empty()
                    && !range.iter().any(|&(lo, hi)| parsed >= lo && parsed <= hi)
                {
                    return Err(format!("{parsed} is outside the allowed range"));
                }
                Ok(())
            }
            TypeSpec::Decimal64 {
                fraction_digits,
                range,
            } => {
                let scaled = parse_decimal64(value, *fraction_digits)?;
                if !range.is_empty()
                    && !range.iter().any(|&(lo, hi)| scaled >= lo && scaled <= hi)
                {
                    return Err(format!("{value} is outside the allowed range"));
                }
                Ok(())
            }
            TypeSpec::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(format!("\"{value}\" is not a boolean")),
            },
            TypeSpec::Empty => {
                if value.is_empty() {
                    Ok(())
                } else {
                    Err("empty type cannot carry a value".to_owned())
                }
            }
            TypeSpec::String { length, patterns } => {
                let chars = value.chars().count() as u64;
                if !length.is_empty()
                    && !length.iter().any(|&(lo, hi)| chars >= lo && chars <= hi)
                {
                    return Err(format!(
                        "string length {chars} is outside the allowed range"
                    ));
                }
                for pattern in patterns {
                    let anchored = format!("^(?:{pattern})$");
                    let regex = Regex::new(&anchored).map_err(|error| {
                        format!("invalid pattern \"{pattern}\": {error}")
                    })?;
                    if !regex.is_match(value) {
                        return Err(format!(
                            "\"{value}\" does not match pattern \"{pattern}\""
                        ));
                    }
                }
                Ok(())
            }
            TypeSpec::Binary { length } => {
                let decoded = BASE64_STANDARD.decode(value).map_err(|_| {
                    format!("\"{value}\" is not valid base64")
                })?;
                let len = decoded.len() as u64;
                if !length.is_empty()
                    && !length.iter().any(|&(lo, hi)| len >= lo && len <= hi)
                {
                    return Err(format!(
                        "binary length {len} is outside the allowed range"
                    ));
                }
                Ok(())
            }
            TypeSpec::Enumeration { names } => {
                if names.iter().any(|name| name == value) {
                    Ok(())
                } else {
                    Err(format!("\"{value}\" is not a valid enum value"))
                }
            }
            TypeSpec::Bits { names } => {
                for bit in value.split_whitespace() {
                    if !names.iter().any(|name| name == bit) {
                        return Err(format!("unknown bit \"{bit}\""));
                    }
                }
                Ok(())
            }
            TypeSpec::IdentityRef { base } => {
                if spec.identity_derived_from(value, base) {
                    Ok(())
                } else {
                    Err(format!(
                        "\"{value}\" is not derived from identity \"{base}\""
                    ))
                }
            }
            // Referential integrity is the validator's concern; any text is
            // type-acceptable here.
            TypeSpec::LeafRef { .. } => Ok(()),
            TypeSpec::Union { members } => {
                for member in members {
                    if member.check_value(spec, value).is_ok() {
                        return Ok(());
                    }
                }
                Err(format!(
                    "\"{value}\" does not match any union member type"
                ))
            }
        }
    }
}

// ===== helper functions =====

// Parses a decimal64 text into its value scaled by 10^fraction-digits.
fn parse_decimal64(value: &str, fraction_digits: u8) -> Result<i64, String> {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, value),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (digits, ""),
    };
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("\"{value}\" is not a decimal number"));
    }
    if frac_part.len() > fraction_digits as usize {
        return Err(format!(
            "\"{value}\" exceeds {fraction_digits} fraction digits"
        ));
    }

    let mut scaled = int_part
        .parse::<i64>()
        .map_err(|_| format!("\"{value}\" is out of range"))?;
    scaled = scaled
        .checked_mul(10i64.pow(fraction_digits as u32))
        .ok_or_else(|| format!("\"{value}\" is out of range"))?;
    if !frac_part.is_empty() {
        let mut frac = frac_part.parse::<i64>().unwrap();
        frac *= 10i64.pow((fraction_digits as usize - frac_part.len()) as u32);
        scaled += frac;
    }
    Ok(sign * scaled)
}
