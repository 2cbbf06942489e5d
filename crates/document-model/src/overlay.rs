//! Overlay text items.
//!
//! Items sit between the background and the subject. Positions are native
//! pixels; z-order is insertion order with the most recent item on top.

use serde::{Deserialize, Serialize};

use layercut_common::config::OverlayDefaults;
use layercut_common::error::{LayercutError, LayercutResult};

use crate::color::parse_color;
use crate::viewport::Point2D;

/// Stable identifier of an overlay item. Never reused within a store.
pub type OverlayId = u64;

/// Largest accepted font size, in native pixels.
pub const MAX_FONT_SIZE: f64 = 2048.0;

/// Largest accepted shadow blur radius, in native pixels.
pub const MAX_SHADOW_BLUR: f64 = 512.0;

/// Largest accepted shadow offset on either axis, in native pixels.
pub const MAX_SHADOW_OFFSET: f64 = 4096.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Horizontal alignment relative to the item position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Drop shadow drawn under the glyphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShadow {
    pub color: String,
    /// Blur radius in native pixels.
    pub blur: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Full style of an overlay item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Text to draw; `\n` starts a new line.
    pub content: String,
    /// Family name or comma-separated CSS family list.
    pub font_family: String,
    /// Em size in native pixels.
    pub font_size: f64,
    /// CSS weight, 1..=1000.
    pub font_weight: u16,
    #[serde(default)]
    pub font_style: FontStyle,
    pub color: String,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub shadow: Option<TextShadow>,
}

impl TextStyle {
    /// The placeholder style for a document `width` pixels wide.
    pub fn default_for(width: u32, defaults: &OverlayDefaults) -> Self {
        let font_size = (width as f64 * defaults.font_size_ratio)
            .max(defaults.min_font_size)
            .min(MAX_FONT_SIZE);
        Self {
            content: defaults.content.clone(),
            font_family: defaults.font_family.clone(),
            font_size,
            font_weight: defaults.font_weight,
            font_style: FontStyle::Normal,
            color: defaults.color.clone(),
            align: TextAlign::Center,
            shadow: defaults.shadow_color.as_ref().map(|color| TextShadow {
                color: color.clone(),
                blur: defaults.shadow_blur,
                offset_x: defaults.shadow_offset,
                offset_y: defaults.shadow_offset,
            }),
        }
    }

    pub fn validate(&self) -> LayercutResult<()> {
        if self.font_family.trim().is_empty() {
            return Err(LayercutError::invalid_input("font family is empty"));
        }
        if !(self.font_size.is_finite() && self.font_size > 0.0 && self.font_size <= MAX_FONT_SIZE) {
            return Err(LayercutError::invalid_input(format!(
                "font size must be within (0, {MAX_FONT_SIZE}] (got {})",
                self.font_size
            )));
        }
        if !(1..=1000).contains(&self.font_weight) {
            return Err(LayercutError::invalid_input(format!(
                "font weight must be within 1..=1000 (got {})",
                self.font_weight
            )));
        }
        if parse_color(&self.color).is_none() {
            return Err(LayercutError::invalid_input(format!(
                "bad text color {:?}",
                self.color
            )));
        }
        if let Some(shadow) = &self.shadow {
            if parse_color(&shadow.color).is_none() {
                return Err(LayercutError::invalid_input(format!(
                    "bad shadow color {:?}",
                    shadow.color
                )));
            }
            let finite = shadow.blur.is_finite()
                && shadow.offset_x.is_finite()
                && shadow.offset_y.is_finite();
            if !finite || shadow.blur < 0.0 {
                return Err(LayercutError::invalid_input("shadow values must be finite, blur >= 0"));
            }
            if shadow.blur > MAX_SHADOW_BLUR
                || shadow.offset_x.abs() > MAX_SHADOW_OFFSET
                || shadow.offset_y.abs() > MAX_SHADOW_OFFSET
            {
                return Err(LayercutError::invalid_input(format!(
                    "shadow blur must be at most {MAX_SHADOW_BLUR} and offsets at most {MAX_SHADOW_OFFSET}"
                )));
            }
        }
        Ok(())
    }

    /// True for weights of 600 and up.
    pub fn is_bold(&self) -> bool {
        self.font_weight >= 600
    }

    fn apply(&mut self, patch: TextStylePatch) {
        let TextStylePatch {
            content,
            font_family,
            font_size,
            font_weight,
            font_style,
            color,
            align,
            shadow,
        } = patch;
        if let Some(v) = content {
            self.content = v;
        }
        if let Some(v) = font_family {
            self.font_family = v;
        }
        if let Some(v) = font_size {
            self.font_size = v;
        }
        if let Some(v) = font_weight {
            self.font_weight = v;
        }
        if let Some(v) = font_style {
            self.font_style = v;
        }
        if let Some(v) = color {
            self.color = v;
        }
        if let Some(v) = align {
            self.align = v;
        }
        if let Some(v) = shadow {
            self.shadow = v;
        }
    }
}

/// Partial style update; `None` fields are left unchanged.
///
/// `shadow: Some(None)` removes the shadow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStylePatch {
    pub content: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub font_weight: Option<u16>,
    pub font_style: Option<FontStyle>,
    pub color: Option<String>,
    pub align: Option<TextAlign>,
    pub shadow: Option<Option<TextShadow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayItem {
    pub id: OverlayId,
    /// Anchor in native pixels. Alignment picks the horizontal anchor edge;
    /// the text block is centred vertically on it.
    pub position: Point2D,
    pub style: TextStyle,
}

/// Ordered overlay list, bottom first.
#[derive(Debug, Clone)]
pub struct OverlayStack {
    items: Vec<OverlayItem>,
    next_id: OverlayId,
}

impl OverlayStack {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a validated item on top of the stack.
    pub fn push(&mut self, position: Point2D, style: TextStyle) -> LayercutResult<OverlayId> {
        check_position(position)?;
        style.validate()?;
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(OverlayItem {
            id,
            position,
            style,
        });
        Ok(id)
    }

    /// Apply a patch atomically: an invalid result leaves the item untouched.
    pub fn update(&mut self, id: OverlayId, patch: TextStylePatch) -> LayercutResult<&OverlayItem> {
        let item = self.get_mut(id)?;
        let mut style = item.style.clone();
        style.apply(patch);
        style.validate()?;
        item.style = style;
        Ok(item)
    }

    pub fn move_to(&mut self, id: OverlayId, position: Point2D) -> LayercutResult<&OverlayItem> {
        check_position(position)?;
        let item = self.get_mut(id)?;
        item.position = position;
        Ok(item)
    }

    pub fn remove(&mut self, id: OverlayId) -> LayercutResult<OverlayItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| LayercutError::not_found(id))?;
        Ok(self.items.remove(index))
    }

    pub fn get(&self, id: OverlayId) -> LayercutResult<&OverlayItem> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .ok_or_else(|| LayercutError::not_found(id))
    }

    fn get_mut(&mut self, id: OverlayId) -> LayercutResult<&mut OverlayItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| LayercutError::not_found(id))
    }

    /// Items in paint order.
    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item. Ids keep counting so stale handles never alias.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for OverlayStack {
    fn default() -> Self {
        Self::new()
    }
}

fn check_position(position: Point2D) -> LayercutResult<()> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(LayercutError::invalid_input("overlay position must be finite"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> TextStyle {
        TextStyle::default_for(400, &OverlayDefaults::default())
    }

    #[test]
    fn test_patch_from_partial_json() {
        let patch: TextStylePatch =
            serde_json::from_str(r#"{"content": "Hi", "align": "right"}"#).unwrap();
        assert_eq!(patch.content.as_deref(), Some("Hi"));
        assert_eq!(patch.align, Some(TextAlign::Right));
        assert_eq!(patch.font_size, None);
        assert_eq!(patch.shadow, None);
    }

    #[test]
    fn test_oversized_text_and_shadow_rejected() {
        let mut s = style();
        s.font_size = 1e9;
        assert!(matches!(s.validate(), Err(LayercutError::InvalidInput { .. })));
        s.font_size = MAX_FONT_SIZE;
        assert!(s.validate().is_ok());

        let mut s = style();
        if let Some(shadow) = s.shadow.as_mut() {
            shadow.blur = 1e12;
        }
        assert!(matches!(s.validate(), Err(LayercutError::InvalidInput { .. })));

        let mut s = style();
        s.shadow = Some(TextShadow {
            color: "#000".into(),
            blur: MAX_SHADOW_BLUR,
            offset_x: -MAX_SHADOW_OFFSET - 1.0,
            offset_y: 0.0,
        });
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_default_size_is_capped_for_huge_documents() {
        let s = TextStyle::default_for(100_000, &OverlayDefaults::default());
        assert_eq!(s.font_size, MAX_FONT_SIZE);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_default_style_scales_with_width() {
        let defaults = OverlayDefaults::default();
        assert_eq!(TextStyle::default_for(200, &defaults).font_size, 40.0);
        assert_eq!(TextStyle::default_for(800, &defaults).font_size, 100.0);

        let s = TextStyle::default_for(800, &defaults);
        assert_eq!(s.content, "Your Text Here");
        assert!(s.is_bold());
        assert_eq!(s.shadow.as_ref().map(|sh| sh.blur), Some(15.0));
    }

    #[test]
    fn test_ids_are_insertion_ordered_and_unique() {
        let mut stack = OverlayStack::new();
        let a = stack.push(Point2D::new(0.0, 0.0), style()).unwrap();
        let b = stack.push(Point2D::new(1.0, 1.0), style()).unwrap();
        assert!(b > a);
        stack.remove(b).unwrap();
        stack.clear();
        let c = stack.push(Point2D::new(0.0, 0.0), style()).unwrap();
        assert!(c > b);
        assert_eq!(stack.items().last().map(|i| i.id), Some(c));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let mut stack = OverlayStack::new();
        assert!(matches!(
            stack.update(42, TextStylePatch::default()),
            Err(LayercutError::NotFound { id: 42 })
        ));
        assert!(matches!(stack.remove(7), Err(LayercutError::NotFound { id: 7 })));
        assert!(stack.get(1).is_err());
    }

    #[test]
    fn test_partial_update() {
        let mut stack = OverlayStack::new();
        let id = stack.push(Point2D::new(10.0, 10.0), style()).unwrap();
        let item = stack
            .update(
                id,
                TextStylePatch {
                    content: Some("Hello".into()),
                    shadow: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(item.style.content, "Hello");
        assert!(item.style.shadow.is_none());
        assert_eq!(item.style.font_weight, 700);
    }

    #[test]
    fn test_invalid_update_leaves_item_untouched() {
        let mut stack = OverlayStack::new();
        let id = stack.push(Point2D::new(10.0, 10.0), style()).unwrap();
        let before = stack.get(id).unwrap().clone();

        for patch in [
            TextStylePatch {
                font_size: Some(0.0),
                content: Some("changed".into()),
                ..Default::default()
            },
            TextStylePatch {
                font_weight: Some(1200),
                ..Default::default()
            },
            TextStylePatch {
                color: Some("not-a-color".into()),
                ..Default::default()
            },
            TextStylePatch {
                font_family: Some("  ".into()),
                ..Default::default()
            },
        ] {
            let err = stack.update(id, patch).unwrap_err();
            assert!(matches!(err, LayercutError::InvalidInput { .. }));
        }
        assert_eq!(stack.get(id).unwrap(), &before);
    }

    #[test]
    fn test_move_rejects_non_finite() {
        let mut stack = OverlayStack::new();
        let id = stack.push(Point2D::new(0.0, 0.0), style()).unwrap();
        assert!(stack.move_to(id, Point2D::new(f64::NAN, 0.0)).is_err());
        let moved = stack.move_to(id, Point2D::new(-20.0, 500.0)).unwrap();
        assert_eq!(moved.position, Point2D::new(-20.0, 500.0));
    }
}
