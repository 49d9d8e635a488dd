// src/windows.rs

use crate::dataset::FrameStream;
use crate::model::DataFormat;
use log::{debug, info};
use ndarray::{Array5, ArrayView4, Axis, s};
use std::ops::Range;

/// Maximal runs of consecutive equal source ids, in stream order.
pub fn source_runs<T: PartialEq>(sources: &[T]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=sources.len() {
        if i == sources.len() || sources[i] != sources[start] {
            runs.push(start..i);
            start = i;
        }
    }
    runs
}

/// Start indices of every window of `nt` frames. Each run contributes
/// `floor(len / nt)` non-overlapping windows; leftover frames are dropped.
pub fn possible_starts<T: PartialEq>(sources: &[T], nt: usize) -> Vec<usize> {
    if nt == 0 {
        return Vec::new();
    }
    source_runs(sources)
        .into_iter()
        .flat_map(|run| {
            let count = run.len() / nt;
            (0..count).map(move |k| run.start + k * nt)
        })
        .collect()
}

/// One window of `nt` frames from a single source video.
#[derive(Debug, Clone)]
pub struct Window<'a> {
    /// Position in emission order.
    pub index: usize,
    pub start: usize,
    pub source: &'a str,
    /// `(nt, height, width, channels)`
    pub frames: ArrayView4<'a, f32>,
}

/// One-shot iterator over the windows of a frame stream.
pub struct SequenceWindows<'a> {
    stream: &'a FrameStream,
    nt: usize,
    starts: std::iter::Enumerate<std::vec::IntoIter<usize>>,
}

impl<'a> SequenceWindows<'a> {
    /// `n_seq` keeps only the first `n_seq` windows.
    pub fn new(stream: &'a FrameStream, nt: usize, n_seq: Option<usize>) -> Self {
        let mut starts = possible_starts(&stream.sources, nt);
        if let Some(cap) = n_seq {
            starts.truncate(cap);
        }
        debug!("{} windows of {} frames", starts.len(), nt);
        Self {
            stream,
            nt,
            starts: starts.into_iter().enumerate(),
        }
    }
}

impl<'a> Iterator for SequenceWindows<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, start) = self.starts.next()?;
        Some(Window {
            index,
            start,
            source: &self.stream.sources[start],
            frames: self.stream.frames.slice(s![start..start + self.nt, .., .., ..]),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.starts.size_hint()
    }
}

impl ExactSizeIterator for SequenceWindows<'_> {}

/// Materializes every window into one array: `(windows, nt, h, w, c)`, or
/// `(windows, nt, c, h, w)` for channels-first models.
pub fn create_all(
    stream: &FrameStream,
    nt: usize,
    n_seq: Option<usize>,
    data_format: DataFormat,
) -> Array5<f32> {
    let windows = SequenceWindows::new(stream, nt, n_seq);
    let (h, w, c) = stream.frame_shape();

    let mut batch = Array5::<f32>::zeros((windows.len(), nt, h, w, c));
    for window in windows {
        debug!(
            "Sequence {}: frames {}..{} of source {}",
            window.index,
            window.start,
            window.start + nt,
            window.source
        );
        batch.index_axis_mut(Axis(0), window.index).assign(&window.frames);
    }
    info!(
        "Created {} test sequences of {} frames from {} frames",
        batch.len_of(Axis(0)),
        nt,
        stream.len()
    );

    match data_format {
        DataFormat::ChannelsLast => batch,
        DataFormat::ChannelsFirst => batch
            .permuted_axes([0, 1, 4, 2, 3])
            .as_standard_layout()
            .into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn stream(sources: &[&str]) -> FrameStream {
        let n = sources.len();
        let frames = Array4::from_shape_fn((n, 2, 3, 1), |(i, y, x, _)| {
            i as f32 * 100.0 + (y * 3 + x) as f32
        });
        FrameStream::new(frames, sources.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn finds_source_runs() {
        assert_eq!(source_runs(&["a", "a", "b", "a"]), vec![0..2, 2..3, 3..4]);
        assert!(source_runs::<&str>(&[]).is_empty());
    }

    #[test]
    fn drops_run_remainders() {
        let sources = ["A", "A", "A", "A", "A", "B", "B", "B"];
        assert_eq!(possible_starts(&sources, 2), vec![0, 2, 5]);
    }

    #[test]
    fn windows_per_run_is_floor_of_run_length() {
        let lengths = [7usize, 3, 12, 1, 5];
        let sources: Vec<usize> = lengths
            .iter()
            .enumerate()
            .flat_map(|(id, &len)| std::iter::repeat(id).take(len))
            .collect();

        for nt in 1..=13 {
            let starts = possible_starts(&sources, nt);
            let expected: usize = lengths.iter().map(|len| len / nt).sum();
            assert_eq!(starts.len(), expected, "nt = {nt}");
            for &start in &starts {
                assert!(sources[start..start + nt].iter().all(|&id| id == sources[start]));
            }
            assert!(starts.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn window_longer_than_every_run_yields_nothing() {
        let stream = stream(&["a", "a", "b", "b"]);
        assert_eq!(SequenceWindows::new(&stream, 3, None).count(), 0);
        let batch = create_all(&stream, 3, None, DataFormat::ChannelsLast);
        assert_eq!(batch.dim(), (0, 3, 2, 3, 1));
    }

    #[test]
    fn cap_keeps_first_windows_in_order() {
        let stream = stream(&["a", "a", "a", "a", "b", "b", "c", "c"]);
        let all: Vec<usize> = SequenceWindows::new(&stream, 2, None).map(|w| w.start).collect();
        let capped: Vec<usize> = SequenceWindows::new(&stream, 2, Some(3)).map(|w| w.start).collect();
        assert_eq!(all, vec![0, 2, 4, 6]);
        assert_eq!(capped, vec![0, 2, 4]);

        let roomy = SequenceWindows::new(&stream, 2, Some(10));
        assert_eq!(roomy.len(), 4);
    }

    #[test]
    fn windows_carry_their_frames() {
        let stream = stream(&["a", "a", "a", "b", "b"]);
        let windows: Vec<Window> = SequenceWindows::new(&stream, 2, None).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].index, 1);
        assert_eq!(windows[1].source, "b");
        assert_eq!(windows[1].frames[[0, 0, 0, 0]], 300.0);
        assert_eq!(windows[1].frames[[1, 1, 2, 0]], 405.0);
    }

    #[test]
    fn channels_first_moves_channel_axis() {
        let frames = Array4::from_shape_fn((2, 2, 2, 3), |(i, y, x, c)| {
            (i * 1000 + y * 100 + x * 10 + c) as f32
        });
        let stream = FrameStream::new(frames, vec!["a".into(), "a".into()]).unwrap();

        let last = create_all(&stream, 2, None, DataFormat::ChannelsLast);
        let first = create_all(&stream, 2, None, DataFormat::ChannelsFirst);
        assert_eq!(first.dim(), (1, 2, 3, 2, 2));
        assert!(first.is_standard_layout());
        assert_eq!(first[[0, 1, 2, 0, 1]], last[[0, 1, 0, 1, 2]]);
        assert_eq!(first[[0, 1, 2, 0, 1]], 1012.0);
    }
}
