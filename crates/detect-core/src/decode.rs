//! Turns raw model output tensors into candidate detections.
//!
//! Two layouts are handled: anchor-form rows `[cx, cy, w, h, obj, cls..]`
//! with normalized center boxes, and pre-filtered `(N, 6)` rows
//! `[x1, y1, x2, y2, score, class_id]` whose coordinate convention is
//! resolved through [`CoordSpace`].

use ndarray::{s, Array2, ArrayView1, ArrayView2};

use crate::types::{Detection, RawOutput, ShapeError};

/// Coordinate convention of a 6-column detection tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordSpace {
    /// Infer from the data: a batch whose maximum coordinate is <= 1.5 is
    /// treated as normalized. Boxes legitimately near the origin can be
    /// misclassified; pin the convention explicitly when it is known.
    #[default]
    Auto,
    /// Coordinates are fractions of the frame dimensions.
    Normalized,
    /// Coordinates are already in pixels.
    Pixels,
}

/// Decodes raw model output into frame-space detections.
#[derive(Debug, Clone, Copy)]
pub struct BoxDecoder {
    conf_threshold: f32,
    coord_space: CoordSpace,
}

impl BoxDecoder {
    pub fn new(conf_threshold: f32) -> Self {
        Self {
            conf_threshold,
            coord_space: CoordSpace::Auto,
        }
    }

    /// Pin the coordinate convention used for 6-column tensors.
    pub fn with_coord_space(mut self, coord_space: CoordSpace) -> Self {
        self.coord_space = coord_space;
        self
    }

    /// Decode one output tensor for a frame of `frame_w` x `frame_h` pixels.
    ///
    /// Pure function of its inputs. Tensors without detections return an
    /// empty vec; tensors that cannot be brought into row form fail with
    /// [`ShapeError`].
    pub fn decode(
        &self,
        raw: &RawOutput,
        frame_w: u32,
        frame_h: u32,
    ) -> Result<Vec<Detection>, ShapeError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let rows = to_rows(raw)?;
        let width = rows.ncols();
        if width == 6 {
            Ok(self.decode_suppressed(rows.view(), frame_w, frame_h))
        } else if width >= 5 {
            Ok(self.decode_anchors(rows.view(), frame_w, frame_h))
        } else {
            Err(ShapeError::RowWidth { width })
        }
    }

    /// `(N, 6)` rows: boxes already in corner form, possibly normalized.
    fn decode_suppressed(
        &self,
        rows: ArrayView2<'_, f32>,
        frame_w: u32,
        frame_h: u32,
    ) -> Vec<Detection> {
        let normalized = match self.coord_space {
            CoordSpace::Normalized => true,
            CoordSpace::Pixels => false,
            CoordSpace::Auto => {
                // Decided over the whole batch, before score filtering.
                let max_coord = rows
                    .slice(s![.., ..4])
                    .iter()
                    .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                max_coord <= 1.5
            }
        };
        let (sx, sy) = if normalized {
            (frame_w as f32, frame_h as f32)
        } else {
            (1.0, 1.0)
        };

        let mut dets = Vec::new();
        for row in rows.rows() {
            let score = row[4];
            if score < self.conf_threshold {
                continue;
            }
            dets.push(Detection::new(
                row[0] * sx,
                row[1] * sy,
                row[2] * sx,
                row[3] * sy,
                score,
                row[5] as usize,
            ));
        }
        dets
    }

    /// Anchor rows: normalized center boxes scaled to the frame, scored by
    /// objectness alone, classed by argmax over the trailing slice.
    fn decode_anchors(
        &self,
        rows: ArrayView2<'_, f32>,
        frame_w: u32,
        frame_h: u32,
    ) -> Vec<Detection> {
        let (fw, fh) = (frame_w as f32, frame_h as f32);
        let mut dets = Vec::new();
        for row in rows.rows() {
            let obj = row[4];
            if obj < self.conf_threshold {
                continue;
            }

            let cx = row[0] * fw;
            let cy = row[1] * fh;
            let w = row[2] * fw;
            let h = row[3] * fh;

            dets.push(Detection::new(
                cx - w / 2.0,
                cy - h / 2.0,
                cx + w / 2.0,
                cy + h / 2.0,
                obj,
                argmax(row.slice(s![5..])),
            ));
        }
        dets
    }
}

/// Normalize an arbitrary-rank tensor to `(N, D)` rows: squeeze a leading
/// batch dimension of size 1, otherwise flatten to the trailing width.
fn to_rows(raw: &RawOutput) -> Result<Array2<f32>, ShapeError> {
    let reshape_err = |width| ShapeError::Reshape {
        shape: raw.shape().to_vec(),
        width,
    };

    let mut shape = raw.shape().to_vec();
    if shape.len() == 3 && shape[0] == 1 {
        shape.remove(0);
    }

    let width = *shape.last().ok_or_else(|| reshape_err(0))?;
    if width == 0 || raw.len() % width != 0 {
        return Err(reshape_err(width));
    }

    let flat: Vec<f32> = raw.iter().copied().collect();
    Array2::from_shape_vec((raw.len() / width, width), flat).map_err(|_| reshape_err(width))
}

/// Index of the highest value; an empty slice yields class 0.
fn argmax(scores: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (idx, &s) in scores.iter().enumerate() {
        if s > best_score {
            best = idx;
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, arr3, ArrayD, IxDyn};

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_anchor_row_scales_to_frame() {
        let raw = arr3(&[[[0.5f32, 0.5, 0.2, 0.2, 0.9, 0.1, 0.8]]]).into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();

        assert_eq!(dets.len(), 1);
        let det = dets[0];
        assert_eq!(det.class_id, 1);
        assert!(close(det.score, 0.9));
        let (cx, cy) = det.center();
        assert!(close(cx, 320.0));
        assert!(close(cy, 240.0));
        assert!(close(det.width(), 128.0));
        assert!(close(det.height(), 96.0));
    }

    #[test]
    fn test_threshold_filters_anchor_rows() {
        let raw = arr3(&[[
            [0.5f32, 0.5, 0.2, 0.2, 0.9, 0.1, 0.8],
            [0.3, 0.3, 0.1, 0.1, 0.2, 0.7, 0.1],
        ]])
        .into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();

        assert_eq!(dets.len(), 1);
        assert!(close(dets[0].score, 0.9));
    }

    #[test]
    fn test_center_box_round_trip() {
        let (cx, cy, w, h) = (0.25f32, 0.75, 0.5, 0.25);
        let raw = arr2(&[[cx, cy, w, h, 1.0, 1.0, 0.0]]).into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();

        assert_eq!(dets.len(), 1);
        let det = dets[0];
        assert!(close(det.x1, (cx - w / 2.0) * 640.0));
        assert!(close(det.y1, (cy - h / 2.0) * 480.0));
        assert!(close(det.x2, (cx + w / 2.0) * 640.0));
        assert!(close(det.y2, (cy + h / 2.0) * 480.0));
    }

    #[test]
    fn test_empty_class_slice_defaults_to_zero() {
        let raw = arr2(&[[0.5f32, 0.5, 0.2, 0.2, 0.9]]).into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
    }

    #[test]
    fn test_six_column_normalized_heuristic() {
        let raw = arr2(&[[0.1f32, 0.2, 0.3, 0.4, 0.9, 2.0]]).into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 100, 200).unwrap();

        assert_eq!(dets.len(), 1);
        let det = dets[0];
        assert!(close(det.x1, 10.0));
        assert!(close(det.y1, 40.0));
        assert!(close(det.x2, 30.0));
        assert!(close(det.y2, 80.0));
        assert_eq!(det.class_id, 2);
    }

    #[test]
    fn test_six_column_pixel_passthrough() {
        let raw = arr2(&[[10.0f32, 40.0, 30.0, 80.0, 0.9, 0.0]]).into_dyn();
        let dets = BoxDecoder::new(0.5).decode(&raw, 100, 200).unwrap();

        assert_eq!(dets.len(), 1);
        assert!(close(dets[0].x1, 10.0));
        assert!(close(dets[0].x2, 30.0));
    }

    #[test]
    fn test_coord_space_override_beats_heuristic() {
        // Small pixel coordinates near the origin would auto-classify as
        // normalized; an explicit Pixels convention keeps them unscaled.
        let raw = arr2(&[[0.2f32, 0.4, 1.0, 1.2, 0.9, 0.0]]).into_dyn();
        let dets = BoxDecoder::new(0.5)
            .with_coord_space(CoordSpace::Pixels)
            .decode(&raw, 640, 480)
            .unwrap();

        assert_eq!(dets.len(), 1);
        assert!(close(dets[0].x1, 0.2));
        assert!(close(dets[0].y2, 1.2));
    }

    #[test]
    fn test_flat_row_is_reshaped() {
        let raw = ArrayD::from_shape_vec(
            IxDyn(&[7]),
            vec![0.5f32, 0.5, 0.2, 0.2, 0.9, 0.1, 0.8],
        )
        .unwrap();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn test_empty_tensor_decodes_to_nothing() {
        let raw = ArrayD::from_shape_vec(IxDyn(&[0, 7]), vec![]).unwrap();
        let dets = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn test_narrow_rows_fail_with_shape_error() {
        let raw = arr2(&[[0.5f32, 0.5, 0.2, 0.2]]).into_dyn();
        let err = BoxDecoder::new(0.5).decode(&raw, 640, 480).unwrap_err();
        assert!(matches!(err, ShapeError::RowWidth { width: 4 }));
    }
}
