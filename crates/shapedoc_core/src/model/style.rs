//! Style domain model.
//!
//! # Responsibility
//! - Define the five style variants owned by designs.
//! - Expose style-to-style references for in-use tracking.
//!
//! # Invariants
//! - A style belongs to exactly one design (recorded by the repository).
//! - `name` is unique per design by convention; the repository does not enforce it.

use crate::error::{RepoError, RepoResult};
use crate::model::EntityId;
use serde::{Deserialize, Serialize};

/// RGBA color value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// Text alignment inside a shape's layout rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAlignment {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl ContentAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top_left",
            Self::TopCenter => "top_center",
            Self::TopRight => "top_right",
            Self::MiddleLeft => "middle_left",
            Self::MiddleCenter => "middle_center",
            Self::MiddleRight => "middle_right",
            Self::BottomLeft => "bottom_left",
            Self::BottomCenter => "bottom_center",
            Self::BottomRight => "bottom_right",
        }
    }

    /// Parses a stored alignment label.
    ///
    /// # Errors
    /// - `UnsupportedValue` for labels with no mapped alignment.
    pub fn parse(value: &str) -> RepoResult<Self> {
        let alignment = match value.trim() {
            "top_left" => Self::TopLeft,
            "top_center" => Self::TopCenter,
            "top_right" => Self::TopRight,
            "middle_left" => Self::MiddleLeft,
            "middle_center" => Self::MiddleCenter,
            "middle_right" => Self::MiddleRight,
            "bottom_left" => Self::BottomLeft,
            "bottom_center" => Self::BottomCenter,
            "bottom_right" => Self::BottomRight,
            other => {
                return Err(RepoError::UnsupportedValue {
                    what: "content alignment",
                    value: other.to_string(),
                })
            }
        };
        Ok(alignment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    Solid,
    Gradient,
    Pattern,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorStyle {
    pub color: Rgba,
    /// Percent, 0..=100.
    pub transparency: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStyle {
    pub line_width: u16,
    pub color_style: Option<EntityId>,
    pub dash_pattern: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillStyle {
    pub base_color_style: Option<EntityId>,
    pub additional_color_style: Option<EntityId>,
    pub fill_mode: FillMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStyle {
    pub font_family: String,
    /// Size in tenths of a point.
    pub size_decipoints: u16,
    pub color_style: Option<EntityId>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphStyle {
    pub alignment: ContentAlignment,
    pub padding: u16,
    pub word_wrap: bool,
    pub trimming: bool,
}

/// Variant payload of a style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StyleKind {
    Color(ColorStyle),
    Line(LineStyle),
    Fill(FillStyle),
    Character(CharacterStyle),
    Paragraph(ParagraphStyle),
}

/// Style owned by a design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub id: Option<EntityId>,
    pub name: String,
    pub title: String,
    pub kind: StyleKind,
}

impl Style {
    pub fn new(name: impl Into<String>, kind: StyleKind) -> Self {
        let name = name.into();
        Self {
            id: None,
            title: name.clone(),
            name,
            kind,
        }
    }

    pub fn color(name: impl Into<String>, color: Rgba) -> Self {
        Self::new(
            name,
            StyleKind::Color(ColorStyle {
                color,
                transparency: 0,
            }),
        )
    }

    pub fn line(name: impl Into<String>, line_width: u16, color_style: Option<EntityId>) -> Self {
        Self::new(
            name,
            StyleKind::Line(LineStyle {
                line_width,
                color_style,
                dash_pattern: Vec::new(),
            }),
        )
    }

    pub fn paragraph(name: impl Into<String>, alignment: ContentAlignment) -> Self {
        Self::new(
            name,
            StyleKind::Paragraph(ParagraphStyle {
                alignment,
                padding: 2,
                word_wrap: true,
                trimming: false,
            }),
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StyleKind::Color(_) => "color",
            StyleKind::Line(_) => "line",
            StyleKind::Fill(_) => "fill",
            StyleKind::Character(_) => "character",
            StyleKind::Paragraph(_) => "paragraph",
        }
    }

    /// Other styles this style depends on.
    pub fn referenced_styles(&self) -> Vec<EntityId> {
        match &self.kind {
            StyleKind::Line(style) => style.color_styles(),
            StyleKind::Fill(style) => style.color_styles(),
            StyleKind::Character(style) => style.color_styles(),
            StyleKind::Color(_) | StyleKind::Paragraph(_) => Vec::new(),
        }
    }
}

/// Styles that draw with one or more color styles.
pub trait HasColor {
    fn color_styles(&self) -> Vec<EntityId>;
}

impl HasColor for LineStyle {
    fn color_styles(&self) -> Vec<EntityId> {
        self.color_style.into_iter().collect()
    }
}

impl HasColor for FillStyle {
    fn color_styles(&self) -> Vec<EntityId> {
        [self.base_color_style, self.additional_color_style]
            .into_iter()
            .flatten()
            .collect()
    }
}

impl HasColor for CharacterStyle {
    fn color_styles(&self) -> Vec<EntityId> {
        self.color_style.into_iter().collect()
    }
}

/// Styles that position content.
pub trait HasAlignment {
    fn alignment(&self) -> ContentAlignment;
}

impl HasAlignment for ParagraphStyle {
    fn alignment(&self) -> ContentAlignment {
        self.alignment
    }
}
