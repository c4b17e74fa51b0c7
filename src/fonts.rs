//! Font registry and text measurement using `ttf-parser`.
//!
//! Faces are registered per (family, bold, italic). Without real font bytes
//! we fall back to synthetic Helvetica/Times/Courier metrics so layout stays
//! deterministic in tests. Metrics and word widths are memoised per
//! [`FontManager`]; the cache is append-only since a face never changes
//! once registered.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Family used when nothing in a `font-family` list is available.
pub const FALLBACK_FAMILY: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    /// `bold`, `bolder` and numeric weights of 600 and up are bold.
    pub fn from_css(value: &str) -> Self {
        let value = value.trim();
        let bold = match value {
            "bold" | "bolder" => true,
            _ => value.parse::<u32>().map(|w| w >= 600).unwrap_or(false),
        };
        if bold {
            FontWeight::Bold
        } else {
            FontWeight::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    Roman,
    Italic,
}

impl FontStyle {
    pub fn from_css(value: &str) -> Self {
        match value.trim() {
            "italic" | "oblique" => FontStyle::Italic,
            _ => FontStyle::Roman,
        }
    }
}

/// A concrete font request: resolved family, pixel size, weight and slant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    pub weight: FontWeight,
    pub style: FontStyle,
}

impl FontSpec {
    fn key(&self) -> FontKey {
        FontKey {
            family: self.family.clone(),
            bold: self.weight == FontWeight::Bold,
            italic: self.style == FontStyle::Italic,
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            face: self.key(),
            size_bits: self.size.to_bits(),
        }
    }
}

/// Vertical metrics in pixels. `descent` is positive below the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub ascent: f32,
    pub descent: f32,
    pub linespace: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    face: FontKey,
    /// Exact size, so every cached value belongs to exactly one size.
    size_bits: u32,
}

/// A registered face.
#[derive(Clone)]
struct FontData {
    /// Raw font bytes; empty for synthetic faces.
    bytes: Vec<u8>,
    units_per_em: f32,
    ascender: f32,
    descender: f32,
    line_gap: f32,
    /// Average advance as a fraction of the em, used when `bytes` is empty.
    avg_advance: f32,
}

impl FontData {
    fn synthetic(avg_advance: f32) -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
            line_gap: 0.0,
            avg_advance,
        }
    }
}

/// Manages loaded fonts and memoised measurements.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// Generic family name → registered family.
    generics: HashMap<String, String>,
    metrics_cache: RefCell<HashMap<CacheKey, FontMetrics>>,
    width_cache: RefCell<HashMap<(String, CacheKey), f32>>,
}

impl FontManager {
    /// An empty registry. Call [`FontManager::ensure_default`] or load fonts
    /// before measuring.
    pub fn new() -> Self {
        let generics = [
            ("sans-serif", "Helvetica"),
            ("system-ui", "Helvetica"),
            ("serif", "Times"),
            ("monospace", "Courier"),
        ]
        .into_iter()
        .map(|(g, f)| (g.to_string(), f.to_string()))
        .collect();
        Self {
            fonts: HashMap::new(),
            generics,
            metrics_cache: RefCell::new(HashMap::new()),
            width_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) -> Result<()> {
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| Error::FontParse {
            family: family.to_string(),
            reason: e.to_string(),
        })?;

        let data = FontData {
            units_per_em: f32::from(face.units_per_em()),
            ascender: f32::from(face.ascender()),
            descender: f32::from(face.descender()),
            line_gap: f32::from(face.line_gap()),
            avg_advance: 0.5,
            bytes,
        };

        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        log::debug!("registered font {key:?}");
        // A new face may shadow a synthetic one: forget what we measured.
        self.metrics_cache.borrow_mut().clear();
        self.width_cache.borrow_mut().clear();
        self.fonts.insert(key, data);
        Ok(())
    }

    /// Register synthetic Helvetica, Times and Courier faces for any family
    /// that has no real font.
    pub fn ensure_default(&mut self) {
        for (family, regular, bold) in [
            ("Helvetica", 0.5, 0.55),
            ("Times", 0.45, 0.5),
            ("Courier", 0.6, 0.6),
        ] {
            for italic in [false, true] {
                for (is_bold, advance) in [(false, regular), (true, bold)] {
                    let key = FontKey {
                        family: family.to_string(),
                        bold: is_bold,
                        italic,
                    };
                    self.fonts
                        .entry(key)
                        .or_insert_with(|| FontData::synthetic(advance));
                }
            }
        }
    }

    pub fn has_family(&self, family: &str) -> bool {
        self.fonts
            .keys()
            .any(|k| k.family.eq_ignore_ascii_case(family))
    }

    /// Pick the first available family from a comma-separated CSS list.
    pub fn resolve_family(&self, list: &str) -> String {
        for candidate in list.split(',') {
            let name = candidate.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
            if name.is_empty() {
                continue;
            }
            if let Some(key) = self.fonts.keys().find(|k| k.family.eq_ignore_ascii_case(name)) {
                return key.family.clone();
            }
            if let Some(concrete) = self.generics.get(&name.to_ascii_lowercase()) {
                if self.has_family(concrete) {
                    return concrete.clone();
                }
            }
        }
        FALLBACK_FAMILY.to_string()
    }

    /// Face for a key: exact match, else the family's regular face, else
    /// the fallback family, else any face (by name, for determinism).
    fn face(&self, key: &FontKey) -> Option<&FontData> {
        self.fonts
            .get(key)
            .or_else(|| {
                self.fonts.get(&FontKey {
                    family: key.family.clone(),
                    bold: false,
                    italic: false,
                })
            })
            .or_else(|| {
                self.fonts.get(&FontKey {
                    family: FALLBACK_FAMILY.to_string(),
                    bold: key.bold,
                    italic: key.italic,
                })
            })
            .or_else(|| {
                self.fonts
                    .iter()
                    .min_by_key(|(k, _)| (k.family.clone(), k.bold, k.italic))
                    .map(|(_, d)| d)
            })
    }

    /// Vertical metrics for a font, memoised.
    pub fn metrics(&self, spec: &FontSpec) -> FontMetrics {
        let key = spec.cache_key();
        if let Some(m) = self.metrics_cache.borrow().get(&key) {
            return *m;
        }
        let data = self
            .face(&key.face)
            .cloned()
            .unwrap_or_else(|| FontData::synthetic(0.5));
        let scale = spec.size / data.units_per_em;
        let ascent = data.ascender * scale;
        let descent = -data.descender * scale;
        let metrics = FontMetrics {
            ascent,
            descent,
            linespace: ascent + descent + data.line_gap * scale,
        };
        self.metrics_cache.borrow_mut().insert(key, metrics);
        metrics
    }

    /// Width of `text` in pixels, memoised per (text, font).
    ///
    /// With real font bytes we sum glyph advances; otherwise each character
    /// counts as the face's average advance (pictographs as a full em).
    pub fn measure(&self, text: &str, spec: &FontSpec) -> f32 {
        let key = (text.to_string(), spec.cache_key());
        if let Some(w) = self.width_cache.borrow().get(&key) {
            return *w;
        }
        let width = match self.face(&key.1.face) {
            Some(data) => measure_with(data, text, spec.size),
            None => text.chars().count() as f32 * spec.size * 0.5,
        };
        self.width_cache.borrow_mut().insert(key, width);
        width
    }

    /// Can the font draw `ch` itself?
    pub fn covers(&self, spec: &FontSpec, ch: char) -> bool {
        match self.face(&spec.key()) {
            Some(data) if !data.bytes.is_empty() => ttf_parser::Face::parse(&data.bytes, 0)
                .map(|face| face.glyph_index(ch).is_some())
                .unwrap_or(false),
            _ => !is_pictographic(ch),
        }
    }
}

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

fn measure_with(data: &FontData, text: &str, font_size: f32) -> f32 {
    if data.bytes.is_empty() {
        return text
            .chars()
            .map(|c| {
                if is_pictographic(c) {
                    font_size
                } else if is_zero_width(c) {
                    0.0
                } else {
                    font_size * data.avg_advance
                }
            })
            .sum();
    }

    // Parse the font and sum horizontal advances
    match ttf_parser::Face::parse(&data.bytes, 0) {
        Ok(face) => {
            let scale = font_size / data.units_per_em;
            text.chars()
                .map(|ch| match face.glyph_index(ch) {
                    Some(gid) => f32::from(face.glyph_hor_advance(gid).unwrap_or(0)) * scale,
                    None => font_size * 0.5,
                })
                .sum()
        }
        Err(_) => text.chars().count() as f32 * font_size * 0.5,
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FE0F}')
}

// ---------------------------------------------------------------------------
// Pictographs
// ---------------------------------------------------------------------------

/// Emoji and other pictographic code points a text font usually lacks.
pub fn is_pictographic(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0x1FC00..=0x1FFFD
    )
}

/// Is `text` one pictographic character, possibly joined into a sequence
/// with ZWJ, variation selectors or skin-tone modifiers?
pub fn is_single_pictograph(text: &str) -> bool {
    let mut base = 0;
    for c in text.chars() {
        if is_pictographic(c) {
            base += 1;
        } else if !matches!(c, '\u{200D}' | '\u{FE0E}' | '\u{FE0F}') {
            return false;
        }
    }
    base >= 1 && (base == 1 || text.contains('\u{200D}'))
}

/// Image identifier for a pictograph: uppercase code points joined by `-`.
pub fn glyph_id(text: &str) -> String {
    text.chars()
        .map(|c| format!("{:04X}", u32::from(c)))
        .collect::<Vec<_>>()
        .join("-")
}
