//! Polyline segmentation of the flat map point array.
//!
//! Map points arrive as one long sequence in which disjoint road features
//! sit back to back. Segmentation:
//! 1. Subsamples every `sample_stride`-th point
//! 2. Breaks the sequence wherever consecutive points are farther apart
//!    than `break_distance` (planar distance)
//! 3. Cuts each continuous run into windows of at most `max_chunk_len`
//! 4. Right-pads every window with zero points and records a validity mask

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SceneError};
use crate::scene::MapPoint;

/// Segmentation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Keep every n-th point (default: 1 = keep all)
    pub sample_stride: usize,

    /// Gap in meters above which two consecutive points belong to
    /// different polylines (default: 1.0)
    pub break_distance: f64,

    /// Fixed chunk length of the output batch (default: 20)
    pub max_chunk_len: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_stride: 1,
            break_distance: 1.0,
            max_chunk_len: 20,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_stride == 0 {
            return Err(SceneError::config("sample_stride must be at least 1"));
        }
        if self.max_chunk_len == 0 {
            return Err(SceneError::config("max_chunk_len must be at least 1"));
        }
        if self.break_distance.is_nan() || self.break_distance < 0.0 {
            return Err(SceneError::config(format!(
                "break_distance must be non-negative, got {}",
                self.break_distance
            )));
        }
        Ok(())
    }

    /// Segments `points` with these parameters.
    pub fn segment(&self, points: &[MapPoint]) -> Result<(PolylineBatch, ValidityMask)> {
        segment(
            points,
            self.sample_stride,
            self.break_distance,
            self.max_chunk_len,
        )
    }
}

/// Fixed-length polyline chunks, zero-padded past their real points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineBatch {
    /// `num_chunks` rows of exactly `chunk_len` points
    pub chunks: Vec<Vec<MapPoint>>,
    pub chunk_len: usize,
}

impl PolylineBatch {
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The real (unpadded) points of chunk `i`, `None` past the last chunk.
    pub fn real_points<'a>(&'a self, mask: &ValidityMask, i: usize) -> Option<&'a [MapPoint]> {
        let chunk = self.chunks.get(i)?;
        chunk.get(..mask.real_len(i)?)
    }
}

/// Per-slot validity of a `PolylineBatch` (true = real point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityMask {
    pub rows: Vec<Vec<bool>>,
}

impl ValidityMask {
    /// Number of real points in chunk `i`, `None` past the last row.
    pub fn real_len(&self, i: usize) -> Option<usize> {
        self.rows.get(i).map(|row| row.iter().filter(|&&v| v).count())
    }

    /// Number of real points over the whole batch.
    pub fn total_real(&self) -> usize {
        self.rows.iter().flatten().filter(|&&v| v).count()
    }

    /// The mask as 0/1 integers.
    pub fn as_ints(&self) -> Vec<Vec<i32>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|&v| i32::from(v)).collect())
            .collect()
    }
}

/// Splits a flat point sequence into padded, masked polyline chunks.
///
/// Fails with `EmptyInputSequence` when `points` is empty and with
/// `InvalidConfig` for a zero stride or chunk length.
pub fn segment(
    points: &[MapPoint],
    sample_stride: usize,
    break_distance: f64,
    max_chunk_len: usize,
) -> Result<(PolylineBatch, ValidityMask)> {
    SegmenterConfig {
        sample_stride,
        break_distance,
        max_chunk_len,
    }
    .validate()?;

    if points.is_empty() {
        return Err(SceneError::EmptyInputSequence);
    }

    let sampled: Vec<MapPoint> = points.iter().step_by(sample_stride).copied().collect();

    // The first point is its own predecessor, so index 0 never breaks
    let breaks: Vec<usize> = (1..sampled.len())
        .filter(|&i| (sampled[i].position() - sampled[i - 1].position()).norm() > break_distance)
        .collect();

    let mut chunks = Vec::new();
    let mut rows = Vec::new();
    let mut start = 0;
    for end in breaks.iter().copied().chain(std::iter::once(sampled.len())) {
        let run = &sampled[start..end];
        start = end;
        if run.is_empty() {
            continue;
        }
        for window in run.chunks(max_chunk_len) {
            let mut chunk = window.to_vec();
            chunk.resize(max_chunk_len, MapPoint::zero());
            let mut row = vec![false; max_chunk_len];
            row[..window.len()].fill(true);
            chunks.push(chunk);
            rows.push(row);
        }
    }

    debug!(
        "Segmented {} points ({} sampled, {} breaks) into {} chunks",
        points.len(),
        sampled.len(),
        breaks.len(),
        chunks.len()
    );

    Ok((
        PolylineBatch {
            chunks,
            chunk_len: max_chunk_len,
        },
        ValidityMask { rows },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(xs: &[f64]) -> Vec<MapPoint> {
        xs.iter().map(|&x| MapPoint::at(x, 0.0)).collect()
    }

    #[test]
    fn test_gap_splits_into_two_chunks() {
        let points = line(&[0.0, 1.0, 10.0]);
        let (batch, mask) = segment(&points, 1, 1.0, 20).unwrap();

        assert_eq!(batch.num_chunks(), 2);
        assert_eq!(batch.real_points(&mask, 0), Some(&points[0..2]));
        assert_eq!(batch.real_points(&mask, 1), Some(&points[2..3]));

        let ints = mask.as_ints();
        assert_eq!(&ints[0][..3], &[1, 1, 0]);
        assert_eq!(&ints[1][..2], &[1, 0]);
        assert_eq!(ints[0].len(), 20);

        // Padding is all zero
        assert!(batch.chunks[1][1..].iter().all(|p| *p == MapPoint::zero()));
    }

    #[test]
    fn test_gap_equal_to_threshold_does_not_break() {
        let (batch, _) = segment(&line(&[0.0, 1.0, 2.0]), 1, 1.0, 20).unwrap();
        assert_eq!(batch.num_chunks(), 1);
    }

    #[test]
    fn test_exact_chunk_length_has_no_padding() {
        let xs: Vec<f64> = (0..5).map(|i| i as f64 * 0.5).collect();
        let (batch, mask) = segment(&line(&xs), 1, 1.0, 5).unwrap();
        assert_eq!(batch.num_chunks(), 1);
        assert_eq!(mask.real_len(0), Some(5));
    }

    #[test]
    fn test_long_run_is_windowed() {
        let xs: Vec<f64> = (0..45).map(|i| i as f64 * 0.5).collect();
        let (batch, mask) = segment(&line(&xs), 1, 1.0, 20).unwrap();
        assert_eq!(batch.num_chunks(), 3);
        assert_eq!(mask.real_len(0), Some(20));
        assert_eq!(mask.real_len(1), Some(20));
        assert_eq!(mask.real_len(2), Some(5));
        assert_eq!(mask.total_real(), 45);
    }

    #[test]
    fn test_stride_subsamples_before_break_detection() {
        // Stride 2 keeps 0, 1, 2, 3 (spacing 1.0) from a 0.5 m grid
        let xs: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        let (batch, mask) = segment(&line(&xs), 2, 1.0, 20).unwrap();
        assert_eq!(batch.num_chunks(), 1);
        assert_eq!(mask.total_real(), 4);
        assert_eq!(batch.chunks[0][3].x, 3.0);
    }

    #[test]
    fn test_break_ignores_z() {
        let mut points = line(&[0.0, 0.5]);
        points[1].z = 50.0;
        let (batch, _) = segment(&points, 1, 1.0, 20).unwrap();
        assert_eq!(batch.num_chunks(), 1);
    }

    #[test]
    fn test_chunk_index_past_end_is_none() {
        let points = line(&[0.0, 1.0, 10.0]);
        let (batch, mask) = segment(&points, 1, 1.0, 20).unwrap();
        assert_eq!(mask.real_len(2), None);
        assert_eq!(batch.real_points(&mask, 2), None);
        assert_eq!(batch.real_points(&mask, usize::MAX), None);
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(
            segment(&[], 1, 1.0, 20).unwrap_err(),
            SceneError::EmptyInputSequence
        );
    }

    #[test]
    fn test_invalid_config_fails() {
        let points = line(&[0.0]);
        assert!(matches!(
            segment(&points, 0, 1.0, 20),
            Err(SceneError::InvalidConfig(_))
        ));
        assert!(matches!(
            segment(&points, 1, 1.0, 0),
            Err(SceneError::InvalidConfig(_))
        ));
        assert!(matches!(
            segment(&points, 1, f64::NAN, 20),
            Err(SceneError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_negative_break_distance_rejected() {
        // A zero threshold already puts every distinct point in its own chunk
        let points = line(&[0.0, 0.5, 1.0]);
        assert_eq!(
            segment(&points, 1, -1.0, 20).unwrap_err(),
            SceneError::config("break_distance must be non-negative, got -1")
        );
        let (batch, _) = segment(&points, 1, 0.0, 20).unwrap();
        assert_eq!(batch.num_chunks(), 3);
    }

    #[test]
    fn test_config_default_matches_free_function() {
        let points = line(&[0.0, 1.0, 10.0, 10.5]);
        let a = SegmenterConfig::default().segment(&points).unwrap();
        let b = segment(&points, 1, 1.0, 20).unwrap();
        assert_eq!(a, b);
    }
}
