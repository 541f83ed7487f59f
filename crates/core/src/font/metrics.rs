//! Approximate metrics for the standard 14 fonts.
//!
//! Only the printable ASCII range carries real widths; other codes use the
//! family's average width. Bold and oblique faces share the regular
//! face's table.

/// Helvetica widths for codes 32..=126.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 222, 333, 333, 389, 584, 278, 333, 278, 278, // space ../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0 .. ?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @ .. O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P .. _
    222, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // ` .. o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p .. ~
];

/// Times-Roman widths for codes 32..=126.
const TIMES: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 333, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, //
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, //
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, //
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, //
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Helvetica,
    Times,
    Courier,
    Symbol,
}

/// Metrics of one standard font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardMetrics {
    family: Family,
    pub ascent: f64,
    pub descent: f64,
}

impl StandardMetrics {
    /// Metrics for a `BaseFont` name, ignoring subset prefixes and style
    /// suffixes. Unknown names fall back to Helvetica.
    pub fn lookup(base_font: &str) -> Self {
        let name = base_font.split_once('+').map_or(base_font, |(_, rest)| rest);
        let lower = name.to_ascii_lowercase();
        let family = if lower.contains("courier") || lower.contains("mono") {
            Family::Courier
        } else if lower.contains("times") || (lower.contains("serif") && !lower.contains("sans")) {
            Family::Times
        } else if lower.contains("symbol") || lower.contains("dingbat") {
            Family::Symbol
        } else {
            Family::Helvetica
        };
        let (ascent, descent) = match family {
            Family::Helvetica => (0.718, -0.207),
            Family::Times => (0.683, -0.217),
            Family::Courier => (0.629, -0.157),
            Family::Symbol => (0.8, -0.2),
        };
        Self {
            family,
            ascent,
            descent,
        }
    }

    /// Width of `code` in glyph units (1/1000 em).
    pub fn width(&self, code: u32) -> f64 {
        let table = match self.family {
            Family::Courier => return 600.0,
            Family::Symbol => return 500.0,
            Family::Helvetica => &HELVETICA,
            Family::Times => &TIMES,
        };
        match code {
            32..=126 => f64::from(table[(code - 32) as usize]),
            _ => match self.family {
                Family::Times => 500.0,
                _ => 556.0,
            },
        }
    }

    pub fn is_fixed_pitch(&self) -> bool {
        self.family == Family::Courier
    }

    pub fn is_serif(&self) -> bool {
        matches!(self.family, Family::Times | Family::Courier)
    }
}
