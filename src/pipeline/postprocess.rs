//! Post-processing: turn the model's generated text into an [`Annotation`].
//!
//! Detection output is a flat token string such as
//!
//! ```text
//! </s><s>table<loc_52><loc_101><loc_948><loc_377>figure<loc_60><loc_420><loc_940><loc_880></s>
//! ```
//!
//! Every label is followed by one or more groups of four location tokens
//! (`x1 y1 x2 y2`). Each location token is a bin in `0..1000` along the
//! corresponding image axis and maps back to the bin centre in pixels.

use crate::pipeline::detect::{Annotation, BoundingBox};
use once_cell::sync::Lazy;
use regex::Regex;

/// Number of quantisation bins per axis.
pub const LOCATION_BINS: u32 = 1000;

static RE_SPECIAL_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"</s>|<s>|<pad>").unwrap());

static RE_LABELLED_LOCATIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^<>]+)((?:<loc_\d+>)+)").unwrap());

static RE_LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"<loc_(\d+)>").unwrap());

/// Parse detection text into boxes scaled to a `width` × `height` image.
///
/// Labels are trimmed; runs with an empty label and trailing location tokens
/// that do not complete a group of four are ignored.
pub fn parse_detections(text: &str, width: u32, height: u32) -> Annotation {
    let cleaned = RE_SPECIAL_TOKENS.replace_all(text, "");
    let mut annotation = Annotation::default();

    for caps in RE_LABELLED_LOCATIONS.captures_iter(&cleaned) {
        let label = caps[1].trim();
        if label.is_empty() {
            continue;
        }

        let bins: Vec<u32> = RE_LOCATION
            .captures_iter(&caps[2])
            .filter_map(|c| c[1].parse::<u32>().ok())
            .collect();

        for quad in bins.chunks_exact(4) {
            annotation.push(
                BoundingBox::new(
                    dequantize(quad[0], width),
                    dequantize(quad[1], height),
                    dequantize(quad[2], width),
                    dequantize(quad[3], height),
                ),
                label,
            );
        }
    }

    annotation
}

/// Map a location bin to the pixel coordinate of its centre.
pub fn dequantize(bin: u32, size: u32) -> f32 {
    let bin = bin.min(LOCATION_BINS - 1) as f32;
    (bin + 0.5) * size as f32 / LOCATION_BINS as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequantize_maps_to_bin_centre() {
        assert_eq!(dequantize(0, 1000), 0.5);
        assert_eq!(dequantize(999, 1000), 999.5);
        assert_eq!(dequantize(500, 2000), 1001.0);
        // out-of-range bins saturate
        assert_eq!(dequantize(5000, 1000), 999.5);
    }

    #[test]
    fn parses_two_labels() {
        let text = "</s><s>table<loc_0><loc_0><loc_499><loc_249>figure<loc_500><loc_250><loc_999><loc_999></s>";
        let ann = parse_detections(text, 1000, 2000);
        assert_eq!(ann.labels, vec!["table", "figure"]);
        assert_eq!(ann.bboxes[0], BoundingBox::new(0.5, 1.0, 499.5, 499.0));
        assert_eq!(ann.bboxes[1], BoundingBox::new(500.5, 501.0, 999.5, 1999.0));
    }

    #[test]
    fn label_with_several_boxes() {
        let text = "table<loc_1><loc_2><loc_3><loc_4><loc_5><loc_6><loc_7><loc_8>";
        let ann = parse_detections(text, 1000, 1000);
        assert_eq!(ann.len(), 2);
        assert_eq!(ann.labels, vec!["table", "table"]);
        assert_eq!(ann.bboxes[1].x1, 5.5);
    }

    #[test]
    fn incomplete_groups_and_empty_labels_are_ignored() {
        let ann = parse_detections("<loc_1><loc_2><loc_3><loc_4>figure<loc_1><loc_2>", 100, 100);
        assert!(ann.is_empty());
        assert!(ann.validate(0).is_ok());
    }

    #[test]
    fn multi_word_labels_are_trimmed() {
        let ann = parse_detections("<s> data table <loc_10><loc_10><loc_20><loc_20></s><pad>", 1000, 1000);
        assert_eq!(ann.labels, vec!["data table"]);
    }

    #[test]
    fn empty_output_gives_empty_annotation() {
        assert!(parse_detections("</s><s></s>", 640, 480).is_empty());
    }
}
