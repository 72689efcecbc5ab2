/// Window/hop framing with optional zero-padded tail (spec.md §4.1, §3
/// "FrameGrid").
use crate::error::{BeatError, Result};

#[derive(Debug, Clone, Copy)]
pub struct FrameGrid {
    pub frame_size: usize,
    pub hop_size: usize,
    pub count: usize,
}

impl FrameGrid {
    /// Compute the grid over a signal of length `len`, without extracting
    /// any frames. `count = ceil((len - frame_size) / hop_size) + 1`.
    pub fn new(len: usize, frame_size: usize, hop_size: usize, pad_last: bool) -> Result<Self> {
        if frame_size == 0 {
            return Err(BeatError::InvalidArgument("frame size must be > 0".to_string()));
        }
        if hop_size == 0 {
            return Err(BeatError::InvalidArgument("hop size must be > 0".to_string()));
        }
        if frame_size > len && !pad_last {
            return Err(BeatError::InvalidArgument(
                "frame size exceeds signal length and padding is disabled".to_string(),
            ));
        }
        let count = if len <= frame_size {
            1
        } else {
            ((len - frame_size) + hop_size - 1) / hop_size + 1
        };
        Ok(Self {
            frame_size,
            hop_size,
            count,
        })
    }

    pub fn frame_start(&self, index: usize) -> usize {
        index * self.hop_size
    }

    pub fn center_time(&self, index: usize, sample_rate: u32) -> f64 {
        (self.frame_start(index) as f64 + self.frame_size as f64 / 2.0) / sample_rate as f64
    }
}

/// Extract frame `index` from `signal`, zero-padding the tail if it runs
/// past the end and `pad_last` is set.
pub fn extract_frame(signal: &[f32], grid: &FrameGrid, index: usize, pad_last: bool) -> Vec<f32> {
    let start = grid.frame_start(index);
    let end = (start + grid.frame_size).min(signal.len());
    let mut frame = Vec::with_capacity(grid.frame_size);
    if start < signal.len() {
        frame.extend_from_slice(&signal[start..end]);
    }
    if pad_last {
        frame.resize(grid.frame_size, 0.0);
    }
    frame
}

/// Produce all frames eagerly, for callers that want the full grid at once.
pub fn frame_signal(
    signal: &[f32],
    frame_size: usize,
    hop_size: usize,
    pad_last: bool,
) -> Result<Vec<Vec<f32>>> {
    let grid = FrameGrid::new(signal.len(), frame_size, hop_size, pad_last)?;
    Ok((0..grid.count)
        .map(|i| extract_frame(signal, &grid, i, pad_last))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_frame_size() {
        assert!(FrameGrid::new(100, 0, 10, true).is_err());
    }

    #[test]
    fn rejects_zero_hop_size() {
        assert!(FrameGrid::new(100, 10, 0, true).is_err());
    }

    #[test]
    fn rejects_oversized_frame_without_padding() {
        assert!(FrameGrid::new(10, 20, 5, false).is_err());
    }

    #[test]
    fn allows_oversized_frame_with_padding() {
        let grid = FrameGrid::new(10, 20, 5, true).unwrap();
        assert_eq!(grid.count, 1);
    }

    #[test]
    fn covers_whole_signal() {
        let grid = FrameGrid::new(1000, 256, 128, true).unwrap();
        let last_start = grid.frame_start(grid.count - 1);
        assert!(last_start < 1000);
        assert!(last_start + grid.frame_size >= 1000 || grid.count == 1);
    }

    #[test]
    fn pads_last_frame_with_zeros() {
        let signal = vec![1.0f32; 10];
        let frames = frame_signal(&signal, 8, 8, true).unwrap();
        assert_eq!(frames.last().unwrap().len(), 8);
        assert_eq!(frames.last().unwrap()[7], 0.0);
    }

    #[test]
    fn single_frame_when_signal_equals_frame_size() {
        let signal = vec![0.0f32; 2048];
        let frames = frame_signal(&signal, 2048, 512, true).unwrap();
        assert_eq!(frames.len(), 1);
    }
}
