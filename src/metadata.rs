// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Exported YOLO models embed their configuration as YAML-ish text in the
//! ONNX custom metadata properties. Only the fields the detector needs are
//! parsed here: the class-name mapping (also the input to schema validation),
//! the input size, and the stride.

use std::collections::HashMap;

use crate::error::{DetectError, Result};

/// Metadata extracted from a detection model.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    /// Class id to class name mapping.
    pub names: HashMap<usize, String>,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Model stride (typically 32).
    pub stride: u32,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            names: HashMap::new(),
            imgsz: (640, 640),
            stride: 32,
        }
    }
}

impl ModelMetadata {
    /// Parse metadata from the combined custom-properties string.
    ///
    /// # Errors
    ///
    /// Returns a config error if a present field fails to parse. Absent fields
    /// keep their defaults; an empty `names` map is left for the caller to
    /// judge (the loader treats it as a load failure).
    pub fn from_metadata_str(text: &str) -> Result<Self> {
        let mut metadata = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim().trim_matches('\'').trim_matches('"');
                if key == "stride" {
                    metadata.stride = value.parse().map_err(|_| {
                        DetectError::Config(format!("invalid stride value: {value}"))
                    })?;
                }
            }
        }

        if let Some(imgsz_line) = text.lines().find(|l| l.contains("imgsz:")) {
            metadata.imgsz = parse_imgsz(text, imgsz_line);
        }
        metadata.names = parse_names_block(text);

        Ok(metadata)
    }

    /// Number of classes in this model.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Class name by id.
    #[must_use]
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Sorted class ids.
    #[must_use]
    pub fn class_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.names.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Parse the imgsz field, which is either inline (`imgsz: [640, 640]`) or a
/// YAML block list. Falls back to 640x640.
fn parse_imgsz(text: &str, imgsz_line: &str) -> (usize, usize) {
    if let Some(start) = imgsz_line.find('[') {
        if let Some(end) = imgsz_line.find(']') {
            let values: Vec<usize> = imgsz_line[start + 1..end]
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if values.len() >= 2 {
                return (values[0], values[1]);
            }
        }
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut values = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.contains("imgsz:") {
            for following in lines.iter().skip(i + 1) {
                let trimmed = following.trim();
                if trimmed.starts_with('-') {
                    if let Ok(val) = trimmed.trim_start_matches('-').trim().parse::<usize>() {
                        values.push(val);
                    }
                } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    break;
                }
                if values.len() >= 2 {
                    break;
                }
            }
            break;
        }
    }

    if values.len() >= 2 {
        (values[0], values[1])
    } else {
        (640, 640)
    }
}

/// Parse the names block from Python-dict or YAML-block format.
fn parse_names_block(text: &str) -> HashMap<usize, String> {
    // Ultralytics exports store names as a Python dict:
    // `names: {0: 'person', 1: 'bicycle', ...}`
    if let Some(start) = text.find("names:") {
        let after = text[start + 6..].trim_start();
        if let Some(rest) = after.strip_prefix('{') {
            if let Some(end) = rest.find('}') {
                return parse_python_dict(&rest[..end]);
            }
        }
    }

    // YAML block format:
    // names:
    //   0: person
    //   1: bicycle
    let mut names = HashMap::new();
    let mut in_names_block = false;
    let mut names_indent = 0;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("names:") {
            in_names_block = true;
            names_indent = line.len() - line.trim_start().len();
            continue;
        }

        if in_names_block {
            let current_indent = line.len() - line.trim_start().len();
            if !trimmed.is_empty() && !trimmed.starts_with('#') && current_indent <= names_indent {
                if !trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    break;
                }
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                if let Ok(class_id) = key.trim().parse::<usize>() {
                    let class_name = value.trim().trim_matches('\'').trim_matches('"');
                    names.insert(class_id, class_name.to_string());
                }
            }
        }
    }

    names
}

/// Parse a Python dict body like `0: 'pipe', 1: 'coupling'`.
fn parse_python_dict(dict_str: &str) -> HashMap<usize, String> {
    let mut names = HashMap::new();
    for entry in dict_str.split(',') {
        if let Some((key, value)) = entry.trim().split_once(':') {
            if let Ok(class_id) = key.trim().parse::<usize>() {
                let value = value.trim().trim_matches('\'').trim_matches('"');
                names.insert(class_id, value.to_string());
            }
        }
    }
    names
}
