//! Task prompts understood by Florence-2 style detection models.
//!
//! The model is driven by short task tokens such as `<OD>`. Its processor
//! expands each token into a natural-language instruction before
//! tokenisation; this module holds that mapping.

/// Task token requesting object detection with category labels.
pub const OBJECT_DETECTION_TASK: &str = "<OD>";

/// Expand a task token into the instruction fed to the text encoder.
///
/// Unknown tokens are passed through unchanged, so free-form prompts still work.
pub fn task_instruction(task: &str) -> &str {
    match task {
        "<OD>" => "Locate the objects with category name in the image.",
        "<CAPTION>" => "What does the image describe?",
        "<DETAILED_CAPTION>" => "Describe in detail what is shown in the image.",
        "<MORE_DETAILED_CAPTION>" => "Describe with a paragraph what is shown in the image.",
        "<OCR>" => "What is the text in the image?",
        "<REGION_PROPOSAL>" => "Locate the region proposals in the image.",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_detection_prompt() {
        assert_eq!(
            task_instruction(OBJECT_DETECTION_TASK),
            "Locate the objects with category name in the image."
        );
    }

    #[test]
    fn unknown_prompt_passes_through() {
        assert_eq!(task_instruction("find tables"), "find tables");
    }
}
