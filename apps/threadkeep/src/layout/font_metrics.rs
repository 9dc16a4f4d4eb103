//! Static font-metric table for the document font, plus the page geometry.
//!
//! Character widths are in em units (relative to font size), taken from the
//! standard Helvetica AFM widths divided by 1000. The PDF backend draws with the
//! built-in Helvetica font, so these tables match what ends up on the page.
//! All tables cover ASCII 0x20..=0x7E (95 printable characters).
//! Index = (char as usize) - 32.

use serde::{Deserialize, Serialize};

/// Millimetres per PostScript point.
pub const MM_PER_PT: f32 = 25.4 / 72.0;

// ────────────────────────────────────────────────────────────────────────────
// Page configuration
// ────────────────────────────────────────────────────────────────────────────

/// Layout parameters for one exported document. All lengths are millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    /// Applied on all four sides.
    pub margin_mm: f32,
    pub font_size_pt: f32,
    /// Vertical advance per wrapped text line.
    pub line_height_mm: f32,
    /// Gap after a text block.
    pub block_spacing_mm: f32,
    /// Gap between images in a row, between rows, and after the last row.
    pub image_spacing_mm: f32,
    /// Images taller than this are scaled down, keeping their aspect ratio.
    pub max_image_height_mm: f32,
    /// A separator is never drawn closer than this to the bottom edge of the page.
    pub separator_clearance_mm: f32,
    /// Vertical advance after a separator.
    pub separator_gap_mm: f32,
    /// Gray level (0 = black, 255 = white) used for separators.
    pub separator_gray: u8,
}

impl PageConfig {
    pub fn content_width_mm(&self) -> f32 {
        self.page_width_mm - 2.0 * self.margin_mm
    }
}

/// A4 portrait, 10mm margins, 12pt text.
pub fn default_page_config() -> PageConfig {
    PageConfig {
        page_width_mm: 210.0,
        page_height_mm: 297.0,
        margin_mm: 10.0,
        font_size_pt: 12.0,
        line_height_mm: 5.0,
        block_spacing_mm: 5.0,
        image_spacing_mm: 5.0,
        max_image_height_mm: 50.0,
        separator_clearance_mm: 20.0,
        separator_gap_mm: 5.0,
        separator_gray: 200,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Font metric table
// ────────────────────────────────────────────────────────────────────────────

/// Static character-width table.
///
/// `widths[i]` = width of ASCII character `(i + 32)`, covering 0x20 (space) through 0x7E (~).
pub struct FontMetricTable {
    widths: [f32; 95],
    /// Fallback width for non-ASCII characters (codepoints > 0x7E).
    pub average_char_width: f32,
    pub space_width: f32,
}

impl FontMetricTable {
    /// Measures the rendered width of a string in em units.
    ///
    /// Non-ASCII characters fall back to `average_char_width`.
    pub fn measure_str(&self, s: &str) -> f32 {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    pub fn char_width(&self, c: char) -> f32 {
        let code = c as usize;
        if (32..=126).contains(&code) {
            self.widths[code - 32]
        } else {
            self.average_char_width
        }
    }

    /// Width of `s` in millimetres at `font_size_pt`.
    pub fn width_mm(&self, s: &str, font_size_pt: f32) -> f32 {
        self.measure_str(s) * em_to_mm(font_size_pt)
    }
}

/// Length of one em in millimetres at the given font size.
pub fn em_to_mm(font_size_pt: f32) -> f32 {
    font_size_pt * MM_PER_PT
}

/// Helvetica, the document font.
static HELVETICA_TABLE: FontMetricTable = FontMetricTable {
    #[rustfmt::skip]
    widths: [
        // sp     !      "      #      $      %      &      '      (      )      *      +      ,      -      .      /
        0.278, 0.278, 0.355, 0.556, 0.556, 0.889, 0.667, 0.191, 0.333, 0.333, 0.389, 0.584, 0.278, 0.333, 0.278, 0.278,
        // 0      1      2      3      4      5      6      7      8      9
        0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556, 0.556,
        // :      ;      <      =      >      ?      @
        0.278, 0.278, 0.584, 0.584, 0.584, 0.556, 1.015,
        // A      B      C      D      E      F      G      H      I      J      K      L      M
        0.667, 0.667, 0.722, 0.722, 0.667, 0.611, 0.778, 0.722, 0.278, 0.500, 0.667, 0.556, 0.833,
        // N      O      P      Q      R      S      T      U      V      W      X      Y      Z
        0.722, 0.778, 0.667, 0.778, 0.722, 0.667, 0.611, 0.722, 0.667, 0.944, 0.667, 0.667, 0.611,
        // [      \      ]      ^      _      `
        0.278, 0.278, 0.278, 0.469, 0.556, 0.333,
        // a      b      c      d      e      f      g      h      i      j      k      l      m
        0.556, 0.556, 0.500, 0.556, 0.556, 0.278, 0.556, 0.556, 0.222, 0.222, 0.500, 0.222, 0.833,
        // n      o      p      q      r      s      t      u      v      w      x      y      z
        0.556, 0.556, 0.556, 0.556, 0.333, 0.500, 0.278, 0.556, 0.500, 0.722, 0.500, 0.500, 0.500,
        // {      |      }      ~
        0.334, 0.260, 0.334, 0.584,
    ],
    average_char_width: 0.556,
    space_width: 0.278,
};

/// Returns the metric table of the document font.
pub fn get_metrics() -> &'static FontMetricTable {
    &HELVETICA_TABLE
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
