//! Axis-aligned bounding boxes in source-image pixel coordinates.
//!
//! All boxes use the (x_min, y_min, x_max, y_max) convention. Detector
//! output arrives in resized coordinates and is rescaled back to source
//! pixels before any fusion happens, so everything downstream of the
//! adapters works in a single coordinate system.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build a box from an `[x_min, y_min, x_max, y_max]` array.
    pub fn from_xyxy(coords: [f32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    /// The box as an `[x_min, y_min, x_max, y_max]` array.
    pub fn to_xyxy(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Area of the overlap between two boxes, zero when disjoint.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);
        (x_max - x_min).max(0.0) * (y_max - y_min).max(0.0)
    }

    /// Intersection-over-union with another box.
    ///
    /// Returns 0.0 when the union is degenerate (two zero-area boxes), so
    /// callers can compare against a threshold without a NaN guard.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Scale the box by independent per-axis factors.
    ///
    /// Used to map detector output from the model's resized input space back
    /// to source-image pixels.
    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox::new(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }

    /// Clamp the box to an image of the given dimensions.
    pub fn clamped(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as f32;
        let h = height as f32;
        BoundingBox::new(
            self.x_min.clamp(0.0, w),
            self.y_min.clamp(0.0, h),
            self.x_max.clamp(0.0, w),
            self.y_max.clamp(0.0, h),
        )
    }

    /// Integer crop rectangle `(x, y, width, height)` for this box, clamped
    /// to the image and at least 1x1 so a degenerate box still yields a
    /// croppable region.
    pub fn crop_rect(&self, img_width: u32, img_height: u32) -> (u32, u32, u32, u32) {
        let clamped = self.clamped(img_width, img_height);
        let x = (clamped.x_min.floor() as u32).min(img_width.saturating_sub(1));
        let y = (clamped.y_min.floor() as u32).min(img_height.saturating_sub(1));
        let w = ((clamped.x_max.ceil() as u32).saturating_sub(x)).clamp(1, img_width - x);
        let h = ((clamped.y_max.ceil() as u32).saturating_sub(y)).clamp(1, img_height - y);
        (x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(5.0, 5.0, 15.0, 25.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        // Each box is 10x10, overlap is 5x10 -> IOU = 50 / 150
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero_not_nan() {
        let a = BoundingBox::new(3.0, 3.0, 3.0, 3.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn scaling_maps_resized_coordinates_back_to_source() {
        // 640 -> 1280x960 source
        let detected = BoundingBox::new(64.0, 64.0, 320.0, 320.0);
        let rescaled = detected.scaled(1280.0 / 640.0, 960.0 / 640.0);
        assert_eq!(rescaled, BoundingBox::new(128.0, 96.0, 640.0, 480.0));
    }

    #[test]
    fn clamping_keeps_boxes_inside_the_image() {
        let b = BoundingBox::new(-5.0, 10.0, 700.0, 500.0);
        assert_eq!(b.clamped(640, 480), BoundingBox::new(0.0, 10.0, 640.0, 480.0));
    }

    #[test]
    fn crop_rect_is_at_least_one_pixel() {
        let b = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        let (x, y, w, h) = b.crop_rect(100, 100);
        assert_eq!((x, y), (10, 10));
        assert_eq!((w, h), (1, 1));
    }

    #[test]
    fn crop_rect_clamps_to_image_bounds() {
        let b = BoundingBox::new(90.0, 95.0, 120.0, 130.0);
        let (x, y, w, h) = b.crop_rect(100, 100);
        assert_eq!((x, y), (90, 95));
        assert_eq!((w, h), (10, 5));
    }
}
