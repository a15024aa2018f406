//! Pixel-space boxes and overlap.

use crate::detect::RawDetection;

/// Axis-aligned rectangle in pixel units. `(x, y)` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Zero for degenerate boxes (non-positive width or height).
    pub fn area(&self) -> f32 {
        if self.w <= 0.0 || self.h <= 0.0 {
            0.0
        } else {
            self.w * self.h
        }
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let l = self.x.max(other.x);
        let r = self.right().min(other.right());
        let t = self.y.max(other.y);
        let b = self.bottom().min(other.bottom());
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        iou(self, other)
    }
}

/// Convert a center-relative normalized detection row into a pixel-space box.
///
/// Caller guarantees `image_width` and `image_height` are non-zero.
pub fn to_box(raw: &RawDetection<'_>, image_width: u32, image_height: u32) -> BBox {
    let width = image_width as f32;
    let height = image_height as f32;
    let center_x = raw.x * width;
    let center_y = raw.y * height;
    let w = raw.w * width;
    let h = raw.h * height;
    BBox {
        x: center_x - w / 2.0,
        y: center_y - h / 2.0,
        w,
        h,
    }
}

/// Intersection-over-union in `[0, 1]`. Disjoint or zero-area boxes give 0.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let area_a = a.area();
    let area_b = b.area();
    if area_a == 0.0 || area_b == 0.0 {
        return 0.0;
    }
    let inter = a.intersection_area(b);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        (inter / union).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_box_converts_center_to_top_left() {
        let scores = [0.9f32];
        let raw = RawDetection {
            x: 0.5,
            y: 0.5,
            w: 0.25,
            h: 0.5,
            objectness: 1.0,
            scores: &scores,
        };
        let b = to_box(&raw, 400, 200);
        assert_eq!(b, BBox::new(150.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let a = BBox::new(10.0, 10.0, 50.0, 50.0);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn half_overlap_has_expected_ratio() {
        let a = BBox::new(0.0, 0.0, 30.0, 10.0);
        let b = BBox::new(10.0, 0.0, 30.0, 10.0);
        assert!((iou(&a, &b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_box_has_zero_iou() {
        let a = BBox::new(5.0, 5.0, 0.0, 10.0);
        let b = BBox::new(0.0, 0.0, 20.0, 20.0);
        assert_eq!(iou(&a, &b), 0.0);
        assert_eq!(iou(&a, &a), 0.0);
    }
}
