//! Offset translation between Unicode code points and UTF-16 code units.
//!
//! Wire patches count code points so that peers agree regardless of their
//! string encoding. Local text is spliced in UTF-16 code units. A code unit
//! in the high-surrogate range starts a two-unit character; every other
//! unit is a character on its own.

use crate::error::{ProtocolError, ProtocolResult};
use std::ops::Range;

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

/// Resumable cursor over one string's UTF-16 code units.
///
/// The cursor only moves forward. Translating the ranges of a sorted patch
/// batch therefore costs a single pass over the text.
#[derive(Debug, Clone)]
pub struct PositionTranslator<'a> {
    units: &'a [u16],
    unit: usize,
    point: usize,
}

impl<'a> PositionTranslator<'a> {
    /// Creates a cursor at the start of `units`.
    pub fn new(units: &'a [u16]) -> Self {
        Self {
            units,
            unit: 0,
            point: 0,
        }
    }

    /// Returns the current `(code unit, code point)` position.
    pub fn cursor(&self) -> (usize, usize) {
        (self.unit, self.point)
    }

    fn step(&mut self) {
        let width = if is_high_surrogate(self.units[self.unit]) { 2 } else { 1 };
        self.unit = (self.unit + width).min(self.units.len());
        self.point += 1;
    }

    /// Advances to code point `point` and returns its code-unit offset.
    pub fn point_to_unit(&mut self, point: usize) -> ProtocolResult<usize> {
        if point < self.point {
            return Err(ProtocolError::NonMonotonic {
                requested: point,
                cursor: self.point,
            });
        }
        while self.point < point {
            if self.unit >= self.units.len() {
                return Err(ProtocolError::OutOfBounds {
                    offset: point,
                    len: self.point,
                });
            }
            self.step();
        }
        Ok(self.unit)
    }

    /// Advances to code unit `unit` and returns its code-point offset.
    pub fn unit_to_point(&mut self, unit: usize) -> ProtocolResult<usize> {
        if unit > self.units.len() {
            return Err(ProtocolError::OutOfBounds {
                offset: unit,
                len: self.units.len(),
            });
        }
        if unit < self.unit {
            return Err(ProtocolError::NonMonotonic {
                requested: unit,
                cursor: self.unit,
            });
        }
        while self.unit < unit {
            self.step();
        }
        if self.unit != unit {
            return Err(ProtocolError::SplitSurrogate { offset: unit });
        }
        Ok(self.point)
    }

    /// Translates a code-point range into code units.
    pub fn points_to_units(&mut self, range: Range<usize>) -> ProtocolResult<Range<usize>> {
        let start = self.point_to_unit(range.start)?;
        let end = self.point_to_unit(range.end)?;
        Ok(start..end)
    }

    /// Translates a code-unit range into code points.
    pub fn units_to_points(&mut self, range: Range<usize>) -> ProtocolResult<Range<usize>> {
        let start = self.unit_to_point(range.start)?;
        let end = self.unit_to_point(range.end)?;
        Ok(start..end)
    }
}

/// Returns the code-unit offset of code point `point` in `text`.
pub fn point_to_unit(text: &str, point: usize) -> ProtocolResult<usize> {
    let units: Vec<u16> = text.encode_utf16().collect();
    PositionTranslator::new(&units).point_to_unit(point)
}

/// Returns the code-point offset of code unit `unit` in `text`.
pub fn unit_to_point(text: &str, unit: usize) -> ProtocolResult<usize> {
    let units: Vec<u16> = text.encode_utf16().collect();
    PositionTranslator::new(&units).unit_to_point(unit)
}

/// Counts the code points in `text`.
pub fn count_code_points(text: &str) -> usize {
    text.chars().count()
}
