use crate::grid::Position;
use serde::{Deserialize, Serialize};

/// Static illuminance of every cell.
///
/// Light grows linearly from the darkest corner `(0, 0)` to the brightest
/// corner `(width - 1, height - 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightField {
    width: usize,
    height: usize,
    illuminance: Vec<f64>,
}

impl LightField {
    pub fn new(width: usize, height: usize) -> Self {
        let span = (width + height).saturating_sub(2);
        let mut illuminance = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                // A single-cell grid has no gradient to speak of.
                let val = if span == 0 {
                    0.0
                } else {
                    (x + y) as f64 / span as f64
                };
                illuminance.push(val);
            }
        }
        Self {
            width,
            height,
            illuminance,
        }
    }

    /// Illuminance at `pos`, or `None` where the field has no reading.
    pub fn illuminance(&self, pos: Position) -> Option<f64> {
        if pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        self.illuminance.get(pos.y * self.width + pos.x).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illuminance_spans_darkest_to_brightest_corner() {
        let light = LightField::new(10, 5);
        assert_eq!(light.illuminance(Position::new(0, 0)), Some(0.0));
        assert_eq!(light.illuminance(Position::new(9, 4)), Some(1.0));
        assert_eq!(light.illuminance(Position::new(3, 2)), Some(5.0 / 13.0));
        assert_eq!(light.illuminance(Position::new(10, 0)), None);
    }

    #[test]
    fn single_cell_field_is_dark() {
        let light = LightField::new(1, 1);
        assert_eq!(light.illuminance(Position::new(0, 0)), Some(0.0));
    }
}
