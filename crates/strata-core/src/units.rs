//! # Unit Expressions
//!
//! Physical units as products of named base units with integer
//! exponents, plus the expression parser used to rebuild a unit from its
//! persisted string form.
//!
//! Grammar:
//!
//! ```text
//! expr := term (('*' | '/') term)*
//! term := base ('**' int)?
//! base := ident | '(' expr ')'
//! ```
//!
//! `dimensionless` is the empty unit. A denominator-only unit renders
//! with a leading `/` (e.g. `/second` for inverse time); the parser
//! itself rejects a leading `/`, so [`Unit::from_stored`] wraps such a
//! string as `(rest)**-1` before parsing.

use crate::types::StrataError;
use std::collections::BTreeMap;

// =============================================================================
// UNIT
// =============================================================================

/// A physical unit: named base units raised to non-zero integer
/// exponents. Two units are equal when every base exponent matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    terms: BTreeMap<String, i32>,
}

impl Unit {
    /// The empty (dimensionless) unit.
    pub fn dimensionless() -> Self {
        Self {
            terms: BTreeMap::new(),
        }
    }

    /// A single base unit with exponent 1.
    pub fn base(name: impl Into<String>) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1);
        Self { terms }
    }

    /// Whether the unit has no base terms.
    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    /// Raise the unit to an integer power.
    pub fn pow(mut self, exponent: i32) -> Self {
        if exponent == 0 {
            self.terms.clear();
            return self;
        }
        for value in self.terms.values_mut() {
            *value *= exponent;
        }
        self
    }

    /// Multiply by another unit, summing exponents.
    pub fn mul(mut self, other: &Self) -> Self {
        for (name, exponent) in &other.terms {
            let entry = self.terms.entry(name.clone()).or_insert(0);
            *entry += exponent;
            if *entry == 0 {
                self.terms.remove(name);
            }
        }
        self
    }

    /// Divide by another unit, subtracting exponents.
    pub fn div(self, other: &Self) -> Self {
        self.mul(&other.clone().pow(-1))
    }

    /// Parse a unit expression.
    ///
    /// Fails with `InvalidArgument` on malformed input, including a
    /// leading `/`.
    pub fn parse(expression: &str) -> Result<Self, StrataError> {
        let mut parser = Parser::new(expression);
        let unit = parser.expr()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("trailing input"));
        }
        Ok(unit)
    }

    /// Rebuild a unit from its persisted string form.
    ///
    /// A stored string beginning with `/` is a denominator-only unit;
    /// it is wrapped as `(rest)**-1` before parsing because the parser
    /// cannot interpret a leading `/`.
    pub fn from_stored(stored: &str) -> Result<Self, StrataError> {
        if let Some(rest) = stored.strip_prefix('/') {
            Self::parse(&format!("({rest})**-1"))
        } else {
            Self::parse(stored)
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("dimensionless");
        }
        let negatives = self.terms.values().filter(|&&e| e < 0).count();
        // A pure denominator with several terms renders as one inverted
        // group; `/a/b` would re-parse with every sign after the first
        // flipped.
        if negatives == self.terms.len() && negatives > 1 {
            f.write_str("/(")?;
            let mut first = true;
            for (name, &exponent) in &self.terms {
                if !first {
                    f.write_str("*")?;
                }
                first = false;
                if -exponent == 1 {
                    write!(f, "{name}")?;
                } else {
                    write!(f, "{name}**{}", -exponent)?;
                }
            }
            return f.write_str(")");
        }
        let mut wrote_numerator = false;
        for (name, &exponent) in &self.terms {
            if exponent > 0 {
                if wrote_numerator {
                    f.write_str("*")?;
                }
                wrote_numerator = true;
                if exponent == 1 {
                    write!(f, "{name}")?;
                } else {
                    write!(f, "{name}**{exponent}")?;
                }
            }
        }
        for (name, &exponent) in &self.terms {
            if exponent < 0 {
                if -exponent == 1 {
                    write!(f, "/{name}")?;
                } else {
                    write!(f, "/{name}**{}", -exponent)?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> StrataError {
        StrataError::InvalidArgument(format!(
            "invalid unit expression '{}' at offset {}: {}",
            self.input, self.pos, message
        ))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> Result<Unit, StrataError> {
        let mut unit = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    unit = unit.mul(&rhs);
                }
                Some(b'/') => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    unit = unit.div(&rhs);
                }
                _ => return Ok(unit),
            }
        }
    }

    fn term(&mut self) -> Result<Unit, StrataError> {
        let base = self.base()?;
        self.skip_ws();
        if self.peek() == Some(b'*') && self.bytes.get(self.pos + 1) == Some(&b'*') {
            self.pos += 2;
            let exponent = self.integer()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn base(&mut self) -> Result<Unit, StrataError> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
                {
                    self.pos += 1;
                }
                let name = &self.input[start..self.pos];
                if name == "dimensionless" {
                    Ok(Unit::dimensionless())
                } else {
                    Ok(Unit::base(name))
                }
            }
            _ => Err(self.error("expected a unit name or '('")),
        }
    }

    fn integer(&mut self) -> Result<i32, StrataError> {
        self.skip_ws();
        let negative = if self.peek() == Some(b'-') {
            self.pos += 1;
            true
        } else {
            false
        };
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected an integer exponent"));
        }
        let digits = &self.input[start..self.pos];
        let magnitude: i32 = digits
            .parse()
            .map_err(|_| self.error("exponent out of range"))?;
        Ok(if negative { -magnitude } else { magnitude })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_base() {
        assert_eq!(Unit::parse("kelvin").expect("parse"), Unit::base("kelvin"));
    }

    #[test]
    fn parse_ratio() {
        let unit = Unit::parse("kilocalorie/mole").expect("parse");
        assert_eq!(
            unit,
            Unit::base("kilocalorie").div(&Unit::base("mole"))
        );
        assert_eq!(unit.to_string(), "kilocalorie/mole");
    }

    #[test]
    fn parse_exponent() {
        let unit = Unit::parse("nanometer**2").expect("parse");
        assert_eq!(unit, Unit::base("nanometer").pow(2));
        assert_eq!(unit.to_string(), "nanometer**2");
    }

    #[test]
    fn parse_parenthesized_inverse() {
        let unit = Unit::parse("(second)**-1").expect("parse");
        assert_eq!(unit, Unit::base("second").pow(-1));
        assert_eq!(unit.to_string(), "/second");
    }

    #[test]
    fn leading_slash_rejected_by_parser() {
        assert!(Unit::parse("/second").is_err());
    }

    #[test]
    fn from_stored_wraps_leading_slash() {
        let unit = Unit::from_stored("/second").expect("from_stored");
        assert_eq!(unit, Unit::base("second").pow(-1));
    }

    #[test]
    fn multi_term_denominator_roundtrip() {
        let unit = Unit::base("kelvin")
            .pow(-1)
            .mul(&Unit::base("kilogram").pow(-1));
        assert_eq!(unit.to_string(), "/(kelvin*kilogram)");
        assert_eq!(Unit::from_stored(&unit.to_string()).expect("reparse"), unit);

        let unit = Unit::base("mole").pow(-2).mul(&Unit::base("second").pow(-1));
        assert_eq!(unit.to_string(), "/(mole**2*second)");
        assert_eq!(Unit::from_stored(&unit.to_string()).expect("reparse"), unit);
    }

    #[test]
    fn display_parse_agreement() {
        let unit = Unit::base("kilogram")
            .mul(&Unit::base("meter").pow(2))
            .div(&Unit::base("second").pow(2));
        let rendered = unit.to_string();
        assert_eq!(Unit::from_stored(&rendered).expect("reparse"), unit);
    }

    #[test]
    fn dimensionless_roundtrip() {
        let unit = Unit::dimensionless();
        assert_eq!(unit.to_string(), "dimensionless");
        assert_eq!(Unit::parse("dimensionless").expect("parse"), unit);
    }

    #[test]
    fn cancelling_terms_vanish() {
        let unit = Unit::base("second").div(&Unit::base("second"));
        assert!(unit.is_dimensionless());
    }

    #[test]
    fn malformed_expressions_rejected() {
        assert!(Unit::parse("").is_err());
        assert!(Unit::parse("second**").is_err());
        assert!(Unit::parse("(second").is_err());
        assert!(Unit::parse("second meter").is_err());
    }
}
