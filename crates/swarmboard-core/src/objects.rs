//! Drawable object definitions for the shared whiteboard document.

use kurbo::Rect;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for document objects.
pub type ObjectId = Uuid;

/// Unique identifier for peers.
pub type PeerId = Uuid;

/// Default hit-test tolerance in document units.
pub const HIT_TOLERANCE: f64 = 4.0;

/// Estimated glyph width used for text bounds.
const TEXT_GLYPH_WIDTH: f64 = 8.0;
/// Estimated line height used for text bounds.
const TEXT_LINE_HEIGHT: f64 = 16.0;

/// A 2D point in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for kurbo::Point {
    fn from(p: Point) -> Self {
        kurbo::Point::new(p.x, p.y)
    }
}

impl From<kurbo::Point> for Point {
    fn from(p: kurbo::Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

/// Type-specific geometry of a drawable object.
///
/// Strokes carry a point list, shapes an origin plus extent, text an
/// origin plus its payload. Width/height may be negative while a shape
/// is being dragged out; bounds normalize them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Geometry {
    FreehandStroke { points: Vec<Point> },
    EraserStroke { points: Vec<Point> },
    Line { x: f64, y: f64, w: f64, h: f64 },
    Rectangle { x: f64, y: f64, w: f64, h: f64 },
    Ellipse { x: f64, y: f64, w: f64, h: f64 },
    Diamond { x: f64, y: f64, w: f64, h: f64 },
    Text { x: f64, y: f64, text: String },
}

/// A single element of the shared document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawableObject {
    /// Unique identifier, assigned by the creating peer. Immutable.
    pub id: ObjectId,
    #[serde(flatten)]
    pub geometry: Geometry,
    /// Stroke color as a CSS hex string. Stored, never interpreted.
    pub color: String,
    #[serde(rename = "strokeWidth")]
    pub stroke_width: f64,
    pub opacity: f64,
    /// Peer that authored this object.
    #[serde(rename = "createdBy")]
    pub created_by: PeerId,
    /// Per-object monotonic counter. The sole conflict-resolution signal.
    pub revision: u64,
}

impl DrawableObject {
    /// Create a new object with a fresh id and revision 0.
    pub fn new(geometry: Geometry, created_by: PeerId) -> Self {
        Self {
            id: Uuid::new_v4(),
            geometry,
            color: "#000000".to_string(),
            stroke_width: 2.0,
            opacity: 1.0,
            created_by,
            revision: 0,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_stroke_width(mut self, width: f64) -> Self {
        self.stroke_width = width;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// Bounding box in document coordinates.
    pub fn bounds(&self) -> Rect {
        match &self.geometry {
            Geometry::FreehandStroke { points } | Geometry::EraserStroke { points } => {
                let mut rect: Option<Rect> = None;
                for p in points {
                    let kp = kurbo::Point::from(*p);
                    let pr = Rect::from_points(kp, kp);
                    rect = Some(match rect {
                        Some(r) => r.union(pr),
                        None => pr,
                    });
                }
                rect.unwrap_or(Rect::ZERO)
                    .inflate(self.stroke_width / 2.0, self.stroke_width / 2.0)
            }
            Geometry::Line { x, y, w, h }
            | Geometry::Rectangle { x, y, w, h }
            | Geometry::Ellipse { x, y, w, h }
            | Geometry::Diamond { x, y, w, h } => {
                Rect::from_points(kurbo::Point::new(*x, *y), kurbo::Point::new(x + w, y + h))
            }
            Geometry::Text { x, y, text } => {
                let width = (text.chars().count() as f64 * TEXT_GLYPH_WIDTH).max(TEXT_GLYPH_WIDTH);
                Rect::new(*x, *y, x + width, y + TEXT_LINE_HEIGHT)
            }
        }
    }

    /// Check whether a point (in document coordinates) hits this object.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let p: kurbo::Point = point.into();
        match &self.geometry {
            Geometry::FreehandStroke { points } | Geometry::EraserStroke { points } => {
                if points.len() == 1 {
                    let d: kurbo::Point = points[0].into();
                    return d.distance(p) <= self.stroke_width / 2.0 + tolerance;
                }
                point_to_polyline_dist(p, points) <= self.stroke_width / 2.0 + tolerance
            }
            Geometry::Line { x, y, w, h } => {
                let a = kurbo::Point::new(*x, *y);
                let b = kurbo::Point::new(x + w, y + h);
                point_to_segment_dist(p, a, b) <= self.stroke_width / 2.0 + tolerance
            }
            Geometry::Rectangle { .. } | Geometry::Text { .. } => {
                self.bounds().inflate(tolerance, tolerance).contains(p)
            }
            Geometry::Ellipse { .. } => {
                let b = self.bounds();
                let rx = b.width() / 2.0 + tolerance;
                let ry = b.height() / 2.0 + tolerance;
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let c = b.center();
                let dx = (p.x - c.x) / rx;
                let dy = (p.y - c.y) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Geometry::Diamond { .. } => {
                let b = self.bounds();
                let rx = b.width() / 2.0 + tolerance;
                let ry = b.height() / 2.0 + tolerance;
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let c = b.center();
                (p.x - c.x).abs() / rx + (p.y - c.y).abs() / ry <= 1.0
            }
        }
    }

    /// Move the object so its bounds origin lands at (x, y).
    ///
    /// Shapes and text simply take the new origin; strokes translate
    /// every point by the same delta.
    pub fn set_position(&mut self, nx: f64, ny: f64) {
        let origin = self.bounds().origin();
        match &mut self.geometry {
            Geometry::FreehandStroke { points } | Geometry::EraserStroke { points } => {
                let dx = nx - origin.x;
                let dy = ny - origin.y;
                for p in points.iter_mut() {
                    p.x += dx;
                    p.y += dy;
                }
            }
            Geometry::Line { x, y, .. }
            | Geometry::Rectangle { x, y, .. }
            | Geometry::Ellipse { x, y, .. }
            | Geometry::Diamond { x, y, .. }
            | Geometry::Text { x, y, .. } => {
                *x = nx;
                *y = ny;
            }
        }
    }

    /// Current bounds origin. For a shape with negative extent this is
    /// the normalized corner, not the raw stored origin.
    pub fn position(&self) -> Point {
        self.bounds().origin().into()
    }

    /// Append a point to a stroke. No-op for non-stroke geometry.
    pub fn push_point(&mut self, point: Point) -> bool {
        match &mut self.geometry {
            Geometry::FreehandStroke { points } | Geometry::EraserStroke { points } => {
                points.push(point);
                true
            }
            _ => false,
        }
    }

    /// Remove the last point of a stroke. No-op for non-stroke geometry.
    pub fn pop_point(&mut self) -> Option<Point> {
        match &mut self.geometry {
            Geometry::FreehandStroke { points } | Geometry::EraserStroke { points } => points.pop(),
            _ => None,
        }
    }

    /// Apply a partial patch to this object's fields.
    ///
    /// Fields absent from the patch are untouched; fields that do not
    /// apply to the variant (text on a stroke, w/h on text) are ignored.
    /// Does not touch the revision counter; that is the store's job.
    pub fn apply_patch(&mut self, patch: &ObjectPatch) {
        if let (Some(x), Some(y)) = (patch.x, patch.y) {
            self.set_position(x, y);
        } else if let Some(x) = patch.x {
            self.set_position(x, self.position().y);
        } else if let Some(y) = patch.y {
            self.set_position(self.position().x, y);
        }
        if patch.w.is_some() || patch.h.is_some() {
            if let Geometry::Line { w, h, .. }
            | Geometry::Rectangle { w, h, .. }
            | Geometry::Ellipse { w, h, .. }
            | Geometry::Diamond { w, h, .. } = &mut self.geometry
            {
                if let Some(nw) = patch.w {
                    *w = nw;
                }
                if let Some(nh) = patch.h {
                    *h = nh;
                }
            }
        }
        if let Some(text) = &patch.text {
            if let Geometry::Text { text: t, .. } = &mut self.geometry {
                *t = text.clone();
            }
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(width) = patch.stroke_width {
            self.stroke_width = width;
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity;
        }
    }

    /// Capture the current values of every field the patch would touch,
    /// producing the patch that reverses it. `rev` is set to the current
    /// revision.
    pub fn capture_before(&self, patch: &ObjectPatch) -> ObjectPatch {
        // Shapes and text keep their raw origin, which differs from the
        // normalized bounds origin while w or h is negative. Restoring
        // through the bounds origin would shift such a shape.
        let pos = match &self.geometry {
            Geometry::Line { x, y, .. }
            | Geometry::Rectangle { x, y, .. }
            | Geometry::Ellipse { x, y, .. }
            | Geometry::Diamond { x, y, .. }
            | Geometry::Text { x, y, .. } => Point::new(*x, *y),
            _ => self.position(),
        };
        let (w, h) = match &self.geometry {
            Geometry::Line { w, h, .. }
            | Geometry::Rectangle { w, h, .. }
            | Geometry::Ellipse { w, h, .. }
            | Geometry::Diamond { w, h, .. } => (Some(*w), Some(*h)),
            _ => (None, None),
        };
        ObjectPatch {
            x: patch.x.map(|_| pos.x),
            y: patch.y.map(|_| pos.y),
            w: patch.w.and(w),
            h: patch.h.and(h),
            text: patch.text.as_ref().and_then(|_| match &self.geometry {
                Geometry::Text { text, .. } => Some(text.clone()),
                _ => None,
            }),
            color: patch.color.as_ref().map(|_| self.color.clone()),
            stroke_width: patch.stroke_width.map(|_| self.stroke_width),
            opacity: patch.opacity.map(|_| self.opacity),
            rev: self.revision,
        }
    }
}

/// Partial patch applied by `update` and `move` operations.
///
/// `rev` is the revision the originating peer assigned to the mutation;
/// for locally submitted patches it is ignored and re-stamped by the
/// document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "strokeWidth", skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub rev: u64,
}

impl ObjectPatch {
    /// Patch that moves an object to a new origin.
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch that resizes a shape.
    pub fn resize(w: f64, h: f64) -> Self {
        Self {
            w: Some(w),
            h: Some(h),
            ..Self::default()
        }
    }

    /// Copy with the revision stamp replaced.
    pub fn at_rev(mut self, rev: u64) -> Self {
        self.rev = rev;
        self
    }
}

/// Distance from a point to a line segment a→b.
fn point_to_segment_dist(point: kurbo::Point, a: kurbo::Point, b: kurbo::Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    point.distance(a + seg * t)
}

/// Minimum distance from a point to a polyline.
fn point_to_polyline_dist(point: kurbo::Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0].into(), w[1].into()))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> DrawableObject {
        DrawableObject::new(Geometry::Rectangle { x, y, w, h }, Uuid::new_v4())
    }

    #[test]
    fn test_bounds_normalizes_negative_extent() {
        let obj = rect(100.0, 100.0, -40.0, -20.0);
        let b = obj.bounds();
        assert_eq!(b.x0, 60.0);
        assert_eq!(b.y0, 80.0);
        assert_eq!(b.x1, 100.0);
        assert_eq!(b.y1, 100.0);
    }

    #[test]
    fn test_rectangle_hit_test() {
        let obj = rect(0.0, 0.0, 100.0, 50.0);
        assert!(obj.hit_test(Point::new(50.0, 25.0), 0.0));
        assert!(obj.hit_test(Point::new(102.0, 25.0), 4.0));
        assert!(!obj.hit_test(Point::new(200.0, 25.0), 4.0));
    }

    #[test]
    fn test_stroke_hit_test_follows_polyline() {
        let mut obj = DrawableObject::new(
            Geometry::FreehandStroke {
                points: vec![Point::new(0.0, 0.0)],
            },
            Uuid::new_v4(),
        )
        .with_stroke_width(4.0);
        assert!(obj.push_point(Point::new(100.0, 0.0)));

        assert!(obj.hit_test(Point::new(50.0, 1.0), 0.0));
        assert!(!obj.hit_test(Point::new(50.0, 20.0), 0.0));
    }

    #[test]
    fn test_diamond_hit_test_excludes_corners() {
        let obj = DrawableObject::new(
            Geometry::Diamond {
                x: 0.0,
                y: 0.0,
                w: 100.0,
                h: 100.0,
            },
            Uuid::new_v4(),
        );
        // Center is inside, bounding-box corner is not.
        assert!(obj.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(!obj.hit_test(Point::new(2.0, 2.0), 0.0));
    }

    #[test]
    fn test_set_position_translates_stroke_points() {
        let mut obj = DrawableObject::new(
            Geometry::FreehandStroke {
                points: vec![Point::new(10.0, 10.0), Point::new(20.0, 30.0)],
            },
            Uuid::new_v4(),
        );
        let origin = obj.position();
        obj.set_position(origin.x + 5.0, origin.y + 5.0);
        match &obj.geometry {
            Geometry::FreehandStroke { points } => {
                assert_eq!(points[0], Point::new(15.0, 15.0));
                assert_eq!(points[1], Point::new(25.0, 35.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_apply_patch_ignores_foreign_fields() {
        let mut obj = rect(0.0, 0.0, 10.0, 10.0);
        let patch = ObjectPatch {
            text: Some("hi".to_string()),
            w: Some(20.0),
            ..ObjectPatch::default()
        };
        obj.apply_patch(&patch);
        match obj.geometry {
            Geometry::Rectangle { w, .. } => assert_eq!(w, 20.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_capture_before_mirrors_patch_shape() {
        let obj = rect(5.0, 6.0, 10.0, 10.0).with_color("#ff0000");
        let patch = ObjectPatch {
            w: Some(50.0),
            color: Some("#00ff00".to_string()),
            ..ObjectPatch::default()
        };
        let before = obj.capture_before(&patch);
        assert_eq!(before.w, Some(10.0));
        assert_eq!(before.color.as_deref(), Some("#ff0000"));
        assert_eq!(before.x, None);
        assert_eq!(before.text, None);
    }

    #[test]
    fn test_capture_before_keeps_raw_origin_for_negative_extent() {
        let obj = rect(100.0, 100.0, -40.0, -20.0);
        let before = obj.capture_before(&ObjectPatch::position(0.0, 0.0));
        // The raw origin, not the normalized bounds origin (60, 80).
        assert_eq!(before.x, Some(100.0));
        assert_eq!(before.y, Some(100.0));
    }

    #[test]
    fn test_object_serializes_with_camel_case_tag() {
        let obj = DrawableObject::new(
            Geometry::Text {
                x: 1.0,
                y: 2.0,
                text: "hello".to_string(),
            },
            Uuid::new_v4(),
        );
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "text");
        assert!(json["strokeWidth"].is_number());
        assert!(json["createdBy"].is_string());
        assert_eq!(json["revision"], 0);
    }

    #[test]
    fn test_object_roundtrip() {
        let obj = DrawableObject::new(
            Geometry::EraserStroke {
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            },
            Uuid::new_v4(),
        )
        .with_stroke_width(12.0);
        let json = serde_json::to_string(&obj).unwrap();
        let back: DrawableObject = serde_json::from_str(&json).unwrap();
        assert_eq!(obj, back);
    }
}
