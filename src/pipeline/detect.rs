//! Detection contract: page image in, boxes and labels out.
//!
//! The pipeline only depends on the [`Detector`] trait. The production
//! implementation is [`crate::model::Florence2Detector`]; tests plug in
//! scripted detectors.

use crate::error::ExtractError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates of the page image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box covering a whole `width` × `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Detections for one page: index-aligned boxes and labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub bboxes: Vec<BoundingBox>,
    pub labels: Vec<String>,
}

impl Annotation {
    pub fn push(&mut self, bbox: BoundingBox, label: impl Into<String>) {
        self.bboxes.push(bbox);
        self.labels.push(label.into());
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }

    /// Check that boxes and labels line up.
    pub fn validate(&self, page: usize) -> Result<(), ExtractError> {
        if self.bboxes.len() != self.labels.len() {
            return Err(ExtractError::AnnotationMismatch {
                page,
                bboxes: self.bboxes.len(),
                labels: self.labels.len(),
            });
        }
        Ok(())
    }

    /// `(index, box, label)` in detection order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &BoundingBox, &str)> {
        self.bboxes
            .iter()
            .zip(self.labels.iter())
            .enumerate()
            .map(|(i, (b, l))| (i, b, l.as_str()))
    }
}

/// An object detector over page images.
pub trait Detector {
    /// Detect objects in `image`. Box coordinates refer to `image`'s pixels.
    fn detect(&mut self, image: &DynamicImage) -> Result<Annotation, ExtractError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Annotation, ExtractError> {
        (**self).detect(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_fail_validation() {
        let ann = Annotation {
            bboxes: vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0)],
            labels: vec![],
        };
        match ann.validate(4) {
            Err(ExtractError::AnnotationMismatch {
                page,
                bboxes,
                labels,
            }) => {
                assert_eq!((page, bboxes, labels), (4, 1, 0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn iter_is_index_aligned() {
        let mut ann = Annotation::default();
        ann.push(BoundingBox::new(0.0, 0.0, 10.0, 10.0), "table");
        ann.push(BoundingBox::new(5.0, 5.0, 20.0, 30.0), "figure");
        assert!(ann.validate(0).is_ok());

        let items: Vec<_> = ann.iter().map(|(i, b, l)| (i, b.width(), l)).collect();
        assert_eq!(items, vec![(0, 10.0, "table"), (1, 15.0, "figure")]);
    }
}
