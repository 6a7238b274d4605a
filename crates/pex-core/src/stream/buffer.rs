//! Append-only byte buffer with an incrementally maintained line index.
//!
//! Bytes may arrive in arbitrary chunks (down to one byte at a time), so the
//! trailing unterminated line is dropped from the index before each append
//! and re-derived once the new bytes are in place. Terminated lines are final.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Byte offsets of one indexed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineSpan {
    /// Offset of the first byte of the line.
    start: usize,
    /// End of the line content (excludes `\n` and a preceding `\r`).
    content_end: usize,
    /// Offset just past the `\n`, or the buffer end for an unterminated line.
    raw_end: usize,
    terminated: bool,
}

#[derive(Debug, Default)]
struct Inner {
    bytes: Vec<u8>,
    lines: Vec<LineSpan>,
}

/// Growable byte store shared by every reader of one stream.
///
/// All operations take the buffer's own lock for their duration, so the byte
/// count and the line index are always observed in agreement.
#[derive(Debug, Default)]
pub struct LineBuffer {
    inner: Mutex<Inner>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `chunk` and indexes any lines it completes or starts.
    ///
    /// Work is proportional to the chunk size: only bytes past the previous
    /// end are searched for terminators.
    pub fn append(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let scan_from = inner.bytes.len();

        // The trailing partial line is re-derived below.
        let mut line_start = 0;
        if let Some(last) = inner.lines.last().copied() {
            if last.terminated {
                line_start = last.raw_end;
            } else {
                inner.lines.pop();
                line_start = last.start;
            }
        }

        inner.bytes.extend_from_slice(chunk);

        let mut pos = scan_from;
        while let Some(i) = inner.bytes[pos..].iter().position(|&b| b == b'\n') {
            let newline = pos + i;
            let line = line_span(&inner.bytes, line_start, newline, newline + 1, true);
            inner.lines.push(line);
            line_start = newline + 1;
            pos = line_start;
        }

        let len = inner.bytes.len();
        if line_start < len {
            let line = line_span(&inner.bytes, line_start, len, len, false);
            inner.lines.push(line);
        }
    }

    /// Total number of bytes appended so far.
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines recognized so far, including a trailing partial line.
    pub fn n_lines(&self) -> usize {
        self.lock().lines.len()
    }

    /// Returns the content of line `n` without its terminator.
    ///
    /// Out-of-range lines are empty. Invalid UTF-8 is replaced lossily.
    pub fn line(&self, n: usize) -> String {
        let inner = self.lock();
        inner
            .lines
            .get(n)
            .map(|l| String::from_utf8_lossy(&inner.bytes[l.start..l.content_end]).into_owned())
            .unwrap_or_default()
    }

    /// Returns the contents of lines `first..first + count`, clipped to the index.
    ///
    /// Renderers use this to fetch a whole viewport under one lock acquisition.
    pub fn lines(&self, first: usize, count: usize) -> Vec<String> {
        let inner = self.lock();
        inner
            .lines
            .iter()
            .skip(first)
            .take(count)
            .map(|l| String::from_utf8_lossy(&inner.bytes[l.start..l.content_end]).into_owned())
            .collect()
    }

    /// Copies bytes starting at `offset` into `dst`, returning how many were copied.
    ///
    /// Offsets at or past the end copy nothing.
    pub fn read_at(&self, dst: &mut [u8], offset: usize) -> usize {
        let inner = self.lock();
        let Some(available) = inner.bytes.get(offset..) else {
            return 0;
        };
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        n
    }

    /// Returns a copy of every byte appended so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }
}

fn line_span(bytes: &[u8], start: usize, end: usize, raw_end: usize, terminated: bool) -> LineSpan {
    let content_end = if end > start && bytes[end - 1] == b'\r' {
        end - 1
    } else {
        end
    };
    LineSpan {
        start,
        content_end,
        raw_end,
        terminated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_lines(buf: &LineBuffer) -> Vec<String> {
        (0..buf.n_lines()).map(|n| buf.line(n)).collect()
    }

    fn spans(buf: &LineBuffer) -> Vec<LineSpan> {
        buf.lock().lines.clone()
    }

    #[test]
    fn test_basic_lines() {
        let input = b"hello\nworld\n";
        let buf = LineBuffer::new();
        buf.append(input);

        assert_eq!(buf.len(), input.len());
        assert_eq!(buf.n_lines(), 2);
        assert_eq!(buf.line(0), "hello");
        assert_eq!(buf.line(1), "world");
    }

    #[test]
    fn test_crlf_line_feeds() {
        let input = b"hello\r\nworld\nline feeds\r\n\r\n";
        let buf = LineBuffer::new();
        buf.append(input);

        assert_eq!(buf.len(), input.len());
        assert_eq!(all_lines(&buf), vec!["hello", "world", "line feeds", ""]);
    }

    #[test]
    fn test_char_at_a_time_matches_whole() {
        let inputs: [&[u8]; 3] = [
            b"hello\nworld\n",
            b"hello\r\nworld\nline feeds\r\n\r\n",
            b"V\nhello 1\nhello 2\r\n\nhello",
        ];
        for input in inputs {
            let whole = LineBuffer::new();
            whole.append(input);

            let bytewise = LineBuffer::new();
            for b in input {
                bytewise.append(std::slice::from_ref(b));
            }

            assert_eq!(bytewise.len(), whole.len());
            assert_eq!(all_lines(&bytewise), all_lines(&whole));
            assert_eq!(spans(&bytewise), spans(&whole));
        }
    }

    #[test]
    fn test_arbitrary_splits_match_whole() {
        let input = b"alpha\r\nbeta\ngamma delta\r\n\r\nepsilon\nzeta";
        let whole = LineBuffer::new();
        whole.append(input);

        for split in 1..input.len() {
            for second in split..input.len() {
                let buf = LineBuffer::new();
                buf.append(&input[..split]);
                buf.append(&input[split..second]);
                buf.append(&input[second..]);
                assert_eq!(spans(&buf), spans(&whole), "splits at {split}/{second}");
            }
        }
    }

    #[test]
    fn test_cr_and_lf_in_separate_appends() {
        let buf = LineBuffer::new();
        buf.append(b"hello\r");
        assert_eq!(buf.n_lines(), 1);
        assert_eq!(buf.line(0), "hello");

        buf.append(b"\nworld");
        assert_eq!(buf.n_lines(), 2);
        assert_eq!(buf.line(0), "hello");
        assert_eq!(buf.line(1), "world");

        let first = spans(&buf)[0];
        assert_eq!(first.content_end, 5);
        assert_eq!(first.raw_end, 7);
        assert_eq!(spans(&buf)[1].start, 7);
    }

    #[test]
    fn test_trailing_fragment_is_one_line() {
        let input = "V\nhello 1\nhello 2\nhello 3\nhello 4\nhello 5\nhello 6\nhello 7\nhello 8\nhello 9\nhello 10\nhello 11\nhello 12\nhello 13\nhello 14\nhello 15\nhello 16\nhello";
        let buf = LineBuffer::new();
        buf.append(input.as_bytes());

        assert_eq!(buf.len(), input.len());
        assert_eq!(buf.n_lines(), 18);
        assert_eq!(buf.line(0), "V");
        assert_eq!(buf.line(16), "hello 16");
        assert_eq!(buf.line(17), "hello");
    }

    #[test]
    fn test_spans_do_not_overlap() {
        let buf = LineBuffer::new();
        for chunk in [&b"a\r"[..], b"\nbb", b"b\n\n", b"\r\ncc"] {
            buf.append(chunk);
        }
        let spans = spans(&buf);
        for pair in spans.windows(2) {
            assert!(pair[0].raw_end <= pair[1].start);
        }
        assert_eq!(all_lines(&buf), vec!["a", "bbb", "", "", "cc"]);
    }

    #[test]
    fn test_out_of_range_queries_are_empty() {
        let buf = LineBuffer::new();
        assert_eq!(buf.line(0), "");
        assert_eq!(buf.n_lines(), 0);

        buf.append(b"abc");
        assert_eq!(buf.line(5), "");

        let mut dst = [0u8; 8];
        assert_eq!(buf.read_at(&mut dst, 3), 0);
        assert_eq!(buf.read_at(&mut dst, 100), 0);
        assert_eq!(buf.read_at(&mut dst, 1), 2);
        assert_eq!(&dst[..2], b"bc");
    }

    #[test]
    fn test_lines_window() {
        let buf = LineBuffer::new();
        buf.append(b"one\ntwo\nthree\nfour");
        assert_eq!(buf.lines(1, 2), vec!["two", "three"]);
        assert_eq!(buf.lines(3, 10), vec!["four"]);
        assert!(buf.lines(9, 2).is_empty());
    }

    #[test]
    fn test_empty_append_is_noop() {
        let buf = LineBuffer::new();
        buf.append(b"");
        assert!(buf.is_empty());
        assert_eq!(buf.n_lines(), 0);
    }
}
