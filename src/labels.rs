//! Class id to name resolution.

use std::path::Path;

use crate::error::{CounterError, Result};

/// The 80 COCO class names in detector output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorbike",
    "aeroplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "sofa",
    "pottedplant",
    "bed",
    "diningtable",
    "toilet",
    "tvmonitor",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Ordered class names; the index is the detector's class id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(CounterError::Config("class name list is empty".into()));
        }
        Ok(Self { names })
    }

    pub fn coco() -> Self {
        Self {
            names: COCO_CLASSES.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Parse a names file: one class per line, surrounding whitespace trimmed.
    ///
    /// Class ids are line positions, so interior blank lines stay as empty
    /// entries. Trailing blank lines are dropped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut names: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
        while names.last().is_some_and(|name| name.is_empty()) {
            names.pop();
        }
        Self::new(names)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_resolves_car_and_dog() {
        let names = ClassNames::coco();
        assert_eq!(names.len(), 80);
        assert_eq!(names.name(2), Some("car"));
        assert_eq!(names.id_of("dog"), Some(16));
        assert_eq!(names.name(80), None);
    }

    #[test]
    fn parse_keeps_ids_positional() {
        let names = ClassNames::parse("person\n\n car \ndog\n\n\n").unwrap();
        assert_eq!(names.len(), 4);
        assert_eq!(names.name(1), Some(""));
        assert_eq!(names.id_of("car"), Some(2));
        assert_eq!(names.id_of("dog"), Some(3));
    }

    #[test]
    fn empty_names_file_is_rejected() {
        assert!(ClassNames::parse("\n\n").is_err());
    }
}
