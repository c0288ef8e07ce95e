// src/font/ttf.rs

//! TrueType/OpenType loading via `ttf-parser`.
//!
//! Only the interface the atlases need is extracted: family and face names,
//! vertical metrics and one outline per requested character.

use super::{Font, FontMetrics, GlyphBounds, GlyphOutline, OutlineCommand};
use crate::geometry::Vec2;
use log::{debug, info};
use thiserror::Error;
use ttf_parser::{name_id, Face, FaceParsingError, OutlineBuilder};

/// Errors that can occur when parsing a font.
#[derive(Error, Debug)]
pub enum FontError {
    #[error("Failed to parse font: {0}")]
    ParseError(#[from] FaceParsingError),
    #[error("Font reports zero units per em")]
    InvalidUnitsPerEm,
}

/// Printable ASCII plus Latin-1, loaded when the caller does not name a charset.
pub fn default_charset() -> impl Iterator<Item = char> {
    (' '..='~').chain('\u{a0}'..='\u{ff}')
}

/// Parses `data` and extracts the outline of every character in `charset`
/// that the font maps. Unmapped characters are skipped.
///
/// # Arguments
///
/// * `data` - The raw font file.
/// * `charset` - The characters to extract.
///
/// # Returns
///
/// The loaded [`Font`], or a [`FontError`] if the face cannot be parsed.
pub fn load_font(
    data: &[u8],
    charset: impl IntoIterator<Item = char>,
) -> Result<Font, FontError> {
    let face = Face::parse(data, 0)?;
    if face.units_per_em() == 0 {
        return Err(FontError::InvalidUnitsPerEm);
    }

    let family = face_name(&face, name_id::FAMILY).unwrap_or_else(|| "Unknown".to_string());
    let face_label = face_name(&face, name_id::FULL_NAME)
        .or_else(|| face_name(&face, name_id::POST_SCRIPT_NAME))
        .or_else(|| face_name(&face, name_id::SUBFAMILY).map(|sub| format!("{} {}", family, sub)))
        .unwrap_or_else(|| family.clone());

    let metrics = FontMetrics {
        units_per_em: face.units_per_em(),
        ascender: face.ascender() as f32,
        descender: face.descender() as f32,
        line_gap: face.line_gap() as f32,
    };
    let mut font = Font::new(family, metrics).with_face(face_label);

    let mut missing = 0usize;
    for ch in charset {
        let Some(id) = face.glyph_index(ch) else {
            missing += 1;
            continue;
        };
        let mut builder = CommandBuilder::default();
        let bbox = face.outline_glyph(id, &mut builder);
        let advance_width = face.glyph_hor_advance(id).unwrap_or(0) as f32;
        let bounds = bbox
            .map(|r| GlyphBounds {
                x_min: r.x_min as f32,
                y_min: r.y_min as f32,
                x_max: r.x_max as f32,
                y_max: r.y_max as f32,
            })
            .unwrap_or_default();
        let left_bearing = face
            .glyph_hor_side_bearing(id)
            .map(|b| b as f32)
            .unwrap_or(bounds.x_min);

        font.insert_glyph(
            ch,
            GlyphOutline {
                commands: builder.commands,
                advance_width,
                left_bearing,
                bounds,
            },
        );
    }

    if missing > 0 {
        debug!("FontLoader: {} requested characters not mapped by the font", missing);
    }
    info!(
        "FontLoader: Loaded '{}' ({} glyphs, {} units per em)",
        font.face(),
        font.glyph_count(),
        metrics.units_per_em
    );
    Ok(font)
}

/// The first Unicode entry of the name table with `id`.
fn face_name(face: &Face<'_>, id: u16) -> Option<String> {
    face.names()
        .into_iter()
        .find(|name| name.name_id == id && name.is_unicode())
        .and_then(|name| name.to_string())
}

#[derive(Default)]
struct CommandBuilder {
    commands: Vec<OutlineCommand>,
}

impl OutlineBuilder for CommandBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.commands.push(OutlineCommand::MoveTo(Vec2::new(x, y)));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.commands.push(OutlineCommand::LineTo(Vec2::new(x, y)));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.commands
            .push(OutlineCommand::QuadTo(Vec2::new(x1, y1), Vec2::new(x, y)));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.commands.push(OutlineCommand::CubicTo(
            Vec2::new(x1, y1),
            Vec2::new(x2, y2),
            Vec2::new(x, y),
        ));
    }

    fn close(&mut self) {
        self.commands.push(OutlineCommand::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_data_is_a_parse_error() {
        let result = load_font(&[0u8; 16], default_charset());
        assert!(matches!(result, Err(FontError::ParseError(_))));
    }

    #[test]
    fn builder_records_commands_in_order() {
        let mut builder = CommandBuilder::default();
        builder.move_to(0.0, 0.0);
        builder.quad_to(1.0, 2.0, 3.0, 0.0);
        builder.close();
        assert_eq!(
            builder.commands,
            vec![
                OutlineCommand::MoveTo(Vec2::new(0.0, 0.0)),
                OutlineCommand::QuadTo(Vec2::new(1.0, 2.0), Vec2::new(3.0, 0.0)),
                OutlineCommand::Close,
            ]
        );
    }

    #[test]
    fn default_charset_covers_ascii_and_latin1() {
        let chars: Vec<char> = default_charset().collect();
        assert_eq!(chars.first(), Some(&' '));
        assert!(chars.contains(&'A'));
        assert!(chars.contains(&'\u{e9}'));
    }
}
