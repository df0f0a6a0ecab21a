//! Message fragmentation (RFC 6455 §5.4).

use crate::error::FrameError;
use crate::frame::{Frame, Opcode};

/// A complete data message rebuilt from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// `Text` or `Binary` (or the control opcode when a control frame is passed through).
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    /// RSV1 of the first fragment: the payload is permessage-deflate compressed.
    pub compressed: bool,
}

#[derive(Debug)]
struct Partial {
    opcode: Opcode,
    compressed: bool,
    payload: Vec<u8>,
}

/// Joins fragmented data frames into whole messages.
///
/// Control frames may arrive between fragments; they pass straight through
/// without disturbing the message in progress.
#[derive(Debug)]
pub struct Reassembler {
    partial: Option<Partial>,
    max_message_size: usize,
}

impl Reassembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            partial: None,
            max_message_size,
        }
    }

    /// True while a fragmented message is waiting for its final frame.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one frame. Returns the message once its final fragment arrives.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>, FrameError> {
        if frame.is_control() {
            return Ok(Some(AssembledMessage {
                opcode: frame.opcode,
                payload: frame.payload,
                compressed: false,
            }));
        }

        match (frame.opcode, self.partial.as_mut()) {
            (Opcode::Continuation, None) => Err(FrameError::UnexpectedContinuation),
            (Opcode::Continuation, Some(partial)) => {
                let len = partial.payload.len() + frame.payload.len();
                if len > self.max_message_size {
                    self.partial = None;
                    return Err(FrameError::MessageTooLarge {
                        len,
                        max: self.max_message_size,
                    });
                }
                partial.payload.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }
                let done = self.partial.take().map(|p| AssembledMessage {
                    opcode: p.opcode,
                    payload: p.payload,
                    compressed: p.compressed,
                });
                Ok(done)
            }
            (_, Some(_)) => Err(FrameError::InterleavedDataFrame),
            (opcode, None) => {
                if frame.payload.len() > self.max_message_size {
                    return Err(FrameError::MessageTooLarge {
                        len: frame.payload.len(),
                        max: self.max_message_size,
                    });
                }
                if frame.fin {
                    return Ok(Some(AssembledMessage {
                        opcode,
                        payload: frame.payload,
                        compressed: frame.rsv1,
                    }));
                }
                self.partial = Some(Partial {
                    opcode,
                    compressed: frame.rsv1,
                    payload: frame.payload,
                });
                Ok(None)
            }
        }
    }

    /// Drop any half-received message.
    pub fn reset(&mut self) {
        self.partial = None;
    }
}

/// Split a message payload into unmasked frames of at most `max_fragment_size` bytes.
///
/// The first frame carries `opcode` and `rsv1`; the rest are continuations.
/// An empty payload still yields a single final frame.
pub fn fragment_message(
    opcode: Opcode,
    payload: &[u8],
    rsv1: bool,
    max_fragment_size: usize,
) -> Vec<Frame> {
    let size = max_fragment_size.max(1);
    if payload.len() <= size {
        return vec![Frame::new(opcode, payload).with_rsv1(rsv1)];
    }

    let chunks: Vec<&[u8]> = payload.chunks(size).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i == 0 {
                Frame::new(opcode, chunk).with_fin(false).with_rsv1(rsv1)
            } else {
                Frame::continuation(chunk, i == last)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_message_passes_through() {
        let mut r = Reassembler::new(1024);
        let msg = r.push(Frame::text("whole")).unwrap().unwrap();
        assert_eq!(msg.opcode, Opcode::Text);
        assert_eq!(msg.payload, b"whole");
        assert!(!r.in_progress());
    }

    #[test]
    fn fragments_join_in_order() {
        let mut r = Reassembler::new(1024);
        assert!(
            r.push(Frame::binary("ab").with_fin(false).with_rsv1(true))
                .unwrap()
                .is_none()
        );
        assert!(r.push(Frame::continuation("cd", false)).unwrap().is_none());
        let msg = r.push(Frame::continuation("ef", true)).unwrap().unwrap();
        assert_eq!(msg.opcode, Opcode::Binary);
        assert_eq!(msg.payload, b"abcdef");
        assert!(msg.compressed);
    }

    #[test]
    fn control_frame_between_fragments() {
        let mut r = Reassembler::new(1024);
        r.push(Frame::text("he").with_fin(false)).unwrap();
        let ping = r.push(Frame::ping("p")).unwrap().unwrap();
        assert_eq!(ping.opcode, Opcode::Ping);
        assert!(r.in_progress());
        let msg = r.push(Frame::continuation("llo", true)).unwrap().unwrap();
        assert_eq!(msg.payload, b"hello");
    }

    #[test]
    fn continuation_without_start_rejected() {
        let mut r = Reassembler::new(1024);
        assert_eq!(
            r.push(Frame::continuation("x", true)),
            Err(FrameError::UnexpectedContinuation)
        );
    }

    #[test]
    fn interleaved_data_frame_rejected() {
        let mut r = Reassembler::new(1024);
        r.push(Frame::text("a").with_fin(false)).unwrap();
        assert_eq!(
            r.push(Frame::text("b")),
            Err(FrameError::InterleavedDataFrame)
        );
    }

    #[test]
    fn message_size_limit_enforced_across_fragments() {
        let mut r = Reassembler::new(4);
        r.push(Frame::binary("abc").with_fin(false)).unwrap();
        assert_eq!(
            r.push(Frame::continuation("de", true)),
            Err(FrameError::MessageTooLarge { len: 5, max: 4 })
        );
        assert!(!r.in_progress());
    }

    #[test]
    fn fragment_then_reassemble() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let frames = fragment_message(Opcode::Binary, &payload, true, 300);
        assert_eq!(frames.len(), 4);
        assert!(frames[0].rsv1);
        assert!(!frames[0].fin);
        assert!(frames[3].fin);
        assert!(frames[1..].iter().all(|f| f.opcode == Opcode::Continuation));

        let mut r = Reassembler::new(4096);
        let mut out = None;
        for frame in frames {
            out = r.push(frame).unwrap();
        }
        let msg = out.unwrap();
        assert_eq!(msg.payload, payload);
        assert!(msg.compressed);
    }

    #[test]
    fn empty_payload_is_one_frame() {
        let frames = fragment_message(Opcode::Text, b"", false, 10);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
    }
}
