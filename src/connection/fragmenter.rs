//! Splitting outgoing data messages into frames (RFC 6455 Section 5.4).

use bytes::Bytes;

use crate::protocol::{Frame, OpCode};

/// Yields the frames of one outgoing Text or Binary message.
///
/// Frames are slices of the shared payload, never copies. An empty message
/// still yields exactly one frame.
#[derive(Debug, Clone)]
pub struct MessageFragmenter {
    rest: Bytes,
    max: usize,
    /// Opcode of the next frame; `None` once the final frame went out.
    next: Option<OpCode>,
}

impl MessageFragmenter {
    /// `fragment_size` of zero is treated as one.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            rest: payload.into(),
            max: fragment_size.max(1),
            next: Some(opcode),
        }
    }
}

impl Iterator for MessageFragmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let opcode = self.next.take()?;
        let chunk = self.rest.split_to(self.rest.len().min(self.max));
        let fin = self.rest.is_empty();
        if !fin {
            self.next = Some(OpCode::Continuation);
        }
        Some(Frame::new(fin, opcode, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match self.next {
            None => 0,
            Some(_) => self.rest.len().div_ceil(self.max).max(1),
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for MessageFragmenter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(len: usize, max: usize) -> Vec<Frame> {
        MessageFragmenter::new(vec![0x5A; len], OpCode::Binary, max).collect()
    }

    #[test]
    fn test_small_message_is_one_frame() {
        let frames: Vec<_> = MessageFragmenter::new("Hello", OpCode::Text, 1024).collect();
        assert_eq!(frames, vec![Frame::text("Hello")]);
        assert_eq!(split(100, 100).len(), 1);
    }

    #[test]
    fn test_opcode_and_fin_placement() {
        let frames = split(25, 10);
        let shape: Vec<_> = frames
            .iter()
            .map(|f| (f.opcode, f.fin, f.payload().len()))
            .collect();
        assert_eq!(
            shape,
            [
                (OpCode::Binary, false, 10),
                (OpCode::Continuation, false, 10),
                (OpCode::Continuation, true, 5),
            ]
        );
    }

    #[test]
    fn test_empty_message_still_sends_a_frame() {
        let frames: Vec<_> = MessageFragmenter::new(Bytes::new(), OpCode::Text, 1024).collect();
        assert_eq!(frames, vec![Frame::text("")]);
    }

    #[test]
    fn test_zero_fragment_size() {
        assert_eq!(split(3, 0).len(), 3);
    }

    #[test]
    fn test_exact_size() {
        for (len, max) in [(0, 4), (1, 4), (4, 4), (5, 4), (30, 10), (31, 10)] {
            let mut frag = MessageFragmenter::new(vec![0; len], OpCode::Binary, max);
            let expected = frag.len();
            let mut produced = 0;
            while frag.next().is_some() {
                produced += 1;
                assert_eq!(frag.len(), expected - produced);
            }
            assert_eq!(produced, expected, "len {len} max {max}");
        }
    }
}
