use std::collections::HashMap;

use crate::types::Detection;

/// Box color used when a class has no configured override (RGB).
pub const DEFAULT_COLOR: [u8; 3] = [0, 255, 0];

/// Resolves class ids to display names and colors for annotation.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    names: Vec<String>,
    colors: HashMap<usize, [u8; 3]>,
}

impl LabelMap {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            colors: HashMap::new(),
        }
    }

    pub fn with_colors(mut self, colors: HashMap<usize, [u8; 3]>) -> Self {
        self.colors = colors;
        self
    }

    /// Display name for a class id, with a synthetic `cls{id}` fallback for
    /// ids outside the configured list.
    pub fn name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("cls{class_id}"))
    }

    pub fn color(&self, class_id: usize) -> [u8; 3] {
        self.colors.get(&class_id).copied().unwrap_or(DEFAULT_COLOR)
    }

    /// Caption drawn next to a detection box: name plus two-decimal score.
    pub fn caption(&self, det: &Detection) -> String {
        format!("{} {:.2}", self.name(det.class_id), det.score)
    }
}
