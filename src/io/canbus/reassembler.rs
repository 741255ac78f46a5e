// src/io/canbus/reassembler.rs
//
// Stream reassembly for line-oriented serial protocols.
//
// Bytes arrive in arbitrary chunks. The reassembler buffers them, cuts the
// buffer at each `\n`, and hands every complete, non-empty line to a
// LineCodec. Bad lines are reported and skipped; the next terminator is the
// resynchronization point.

use std::borrow::Cow;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::io::canbus::codec::CanBusCodec;
use crate::io::codec::LineCodec;
use crate::io::error::ParseError;
use crate::io::Frame;

const LINE_TERMINATOR: u8 = b'\n';

/// Default cap on a partial (unterminated) line
pub const DEFAULT_MAX_BUFFERED: usize = 4096;

// ============================================================================
// Types and Configuration
// ============================================================================

/// What to do when an unterminated line outgrows `max_buffered`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the partial line; whatever arrives next starts a new line
    Reset,
    /// Drop the partial line and everything up to the next terminator
    #[default]
    DiscardLine,
}

/// Reassembler buffering limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassemblerConfig {
    /// Maximum bytes held for an unterminated line (None = unbounded)
    pub max_buffered: Option<usize>,
    pub on_overflow: OverflowPolicy,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_buffered: Some(DEFAULT_MAX_BUFFERED),
            on_overflow: OverflowPolicy::default(),
        }
    }
}

/// One result surfaced by the reassembler
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A complete line parsed into a frame
    Frame(Frame),
    /// A complete line that the codec rejected
    Rejected { error: ParseError, line: String },
    /// An unterminated line exceeded the buffer limit and was dropped
    Overflow { discarded: usize },
}

// ============================================================================
// Stream Reassembler
// ============================================================================

/// Stateful line reassembler, owned by a single reader.
pub struct StreamReassembler<C: LineCodec = CanBusCodec> {
    buffer: Vec<u8>,
    config: ReassemblerConfig,
    /// Leading bytes of `buffer` already searched for a terminator
    scanned: usize,
    /// Set after an overflow under `DiscardLine` until the next terminator
    discarding: bool,
    _codec: PhantomData<fn() -> C>,
}

impl StreamReassembler<CanBusCodec> {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self::with_codec(config)
    }
}

impl Default for StreamReassembler<CanBusCodec> {
    fn default() -> Self {
        Self::new(ReassemblerConfig::default())
    }
}

impl<C: LineCodec> StreamReassembler<C> {
    /// Create a reassembler that parses lines with codec `C`
    pub fn with_codec(config: ReassemblerConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            config,
            scanned: 0,
            discarding: false,
            _codec: PhantomData,
        }
    }

    /// Append a chunk and return the events it completes, in line order.
    ///
    /// The returned iterator is lazy. Lines it has not yet yielded when it is
    /// dropped stay buffered and come out of the next `feed` call.
    pub fn feed(&mut self, chunk: &[u8]) -> Events<'_, C> {
        self.buffer.extend_from_slice(chunk);
        Events { reassembler: self }
    }

    /// Discard everything buffered, including a pending discard
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.discarding = false;
    }

    /// Bytes currently held (complete lines not yet consumed plus the partial tail)
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            let found = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == LINE_TERMINATOR)
                .map(|offset| self.scanned + offset);
            let Some(end) = found else {
                self.scanned = self.buffer.len();
                return self.check_overflow();
            };

            self.scanned = 0;
            let segment: Vec<u8> = self.buffer.drain(..=end).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }

            let text = decode_lenient(&segment[..end]);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }

            return Some(match C::parse(line) {
                Ok(frame) => StreamEvent::Frame(frame),
                Err(error) => StreamEvent::Rejected {
                    error,
                    line: line.to_string(),
                },
            });
        }
    }

    /// Called only when the buffer holds no terminator
    fn check_overflow(&mut self) -> Option<StreamEvent> {
        if self.discarding {
            self.clear_buffer();
            return None;
        }

        let limit = self.config.max_buffered?;
        if self.buffer.len() <= limit {
            return None;
        }

        let discarded = self.buffer.len();
        self.clear_buffer();
        if self.config.on_overflow == OverflowPolicy::DiscardLine {
            self.discarding = true;
        }
        Some(StreamEvent::Overflow { discarded })
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// Lazy event sequence returned by [`StreamReassembler::feed`]
pub struct Events<'a, C: LineCodec> {
    reassembler: &'a mut StreamReassembler<C>,
}

impl<C: LineCodec> Iterator for Events<'_, C> {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        self.reassembler.next_event()
    }
}

/// Decode UTF-8, dropping any invalid sequences
fn decode_lenient(bytes: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => Cow::Borrowed(s),
        Cow::Owned(s) => Cow::Owned(
            s.chars()
                .filter(|&c| c != char::REPLACEMENT_CHARACTER)
                .collect(),
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Direction;

    fn frames(events: &[StreamEvent]) -> Vec<&Frame> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Frame(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_line() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"CanBus Rx 0x618 12 34 56\n").collect();

        assert_eq!(events.len(), 1);
        let f = frames(&events);
        assert_eq!(f[0].identifier, 0x618);
        assert_eq!(f[0].payload, vec![0x12, 0x34, 0x56]);
        assert_eq!(r.buffered_len(), 0);
    }

    #[test]
    fn test_split_at_every_boundary() {
        let line = b"CanBus Rx 0x618 12 34 56\n";
        let mut whole = StreamReassembler::default();
        let expected: Vec<_> = whole.feed(line).collect();

        for split in 1..line.len() {
            let mut r = StreamReassembler::default();
            let mut events: Vec<_> = r.feed(&line[..split]).collect();
            assert!(events.is_empty(), "premature event at split {}", split);
            events.extend(r.feed(&line[split..]));
            assert_eq!(events, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_garbage_then_valid_line() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"garbage line\nCanBus Rx 0x1 AA\n").collect();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::Rejected {
                error: ParseError::NoMatch,
                line: "garbage line".to_string(),
            }
        );
        match &events[1] {
            StreamEvent::Frame(f) => assert_eq!(f.identifier, 0x1),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_two_lines_keep_order() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"CanBus Rx 0x1 AA\nCanBus Tx 0x2 BB\n").collect();
        let f = frames(&events);

        assert_eq!(f.len(), 2);
        assert_eq!((f[0].identifier, f[0].direction), (0x1, Direction::Inbound));
        assert_eq!((f[1].identifier, f[1].direction), (0x2, Direction::Outbound));
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"\n\r\n   \nCanBus Rx 0x2 01\r\n").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(frames(&events)[0].payload, vec![0x01]);
    }

    #[test]
    fn test_partial_tail_stays_buffered() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"CanBus Rx 0x1 AA\nCanBus Rx 0x2").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(r.buffered_len(), "CanBus Rx 0x2".len());

        let events: Vec<_> = r.feed(b" BB\n").collect();
        assert_eq!(frames(&events)[0].payload, vec![0xBB]);
    }

    #[test]
    fn test_dropped_iterator_keeps_lines() {
        let mut r = StreamReassembler::default();
        let first = r.feed(b"CanBus Rx 0x1 AA\nCanBus Rx 0x2 BB\n").next();
        assert!(matches!(first, Some(StreamEvent::Frame(ref f)) if f.identifier == 0x1));

        let rest: Vec<_> = r.feed(b"").collect();
        assert_eq!(frames(&rest)[0].identifier, 0x2);
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let mut r = StreamReassembler::default();
        let events: Vec<_> = r.feed(b"CanBus Rx 0x1\xFF AA\n").collect();
        assert_eq!(frames(&events)[0].payload, vec![0xAA]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        // 'é' is 0xC3 0xA9; the line is still rejected as a whole, not mangled
        let mut r = StreamReassembler::default();
        assert_eq!(r.feed(b"caf\xC3").count(), 0);
        let events: Vec<_> = r.feed(b"\xA9\n").collect();
        assert_eq!(
            events,
            vec![StreamEvent::Rejected {
                error: ParseError::NoMatch,
                line: "café".to_string(),
            }]
        );
    }

    #[test]
    fn test_overflow_discard_line() {
        let mut r = StreamReassembler::new(ReassemblerConfig {
            max_buffered: Some(8),
            on_overflow: OverflowPolicy::DiscardLine,
        });

        let events: Vec<_> = r.feed(b"0123456789").collect();
        assert_eq!(events, vec![StreamEvent::Overflow { discarded: 10 }]);
        assert_eq!(r.buffered_len(), 0);

        // Rest of the runaway line is swallowed, next line parses
        let events: Vec<_> = r.feed(b"abcdefghijkl\nCanBus Rx 0x3 CC\n").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(frames(&events)[0].identifier, 0x3);
    }

    #[test]
    fn test_overflow_reset() {
        let mut r = StreamReassembler::new(ReassemblerConfig {
            max_buffered: Some(8),
            on_overflow: OverflowPolicy::Reset,
        });

        let events: Vec<_> = r.feed(b"0123456789").collect();
        assert_eq!(events, vec![StreamEvent::Overflow { discarded: 10 }]);

        // The tail is treated as a fresh line
        let events: Vec<_> = r.feed(b"xyz\n").collect();
        assert!(matches!(events[0], StreamEvent::Rejected { ref line, .. } if line == "xyz"));
    }

    #[test]
    fn test_unbounded_buffer() {
        let mut r = StreamReassembler::new(ReassemblerConfig {
            max_buffered: None,
            on_overflow: OverflowPolicy::Reset,
        });
        let big = vec![b'A'; 100_000];
        assert_eq!(r.feed(&big).count(), 0);
        assert_eq!(r.buffered_len(), 100_000);
    }

    #[test]
    fn test_long_line_in_small_chunks() {
        let mut r = StreamReassembler::new(ReassemblerConfig {
            max_buffered: None,
            on_overflow: OverflowPolicy::Reset,
        });
        let mut line = b"CanBus Rx 0x7FF".to_vec();
        for _ in 0..5000 {
            line.extend_from_slice(b" A5");
        }

        for chunk in line.chunks(7) {
            assert_eq!(r.feed(chunk).count(), 0);
            // Only the new bytes are searched on each feed
            assert_eq!(r.scanned, r.buffered_len());
        }

        let events: Vec<_> = r.feed(b"\nCanBus Rx 0x1").collect();
        let f = frames(&events);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].identifier, 0x7FF);
        assert_eq!(f[0].payload, vec![0xA5; 5000]);

        // The tail after the terminator is searched from its start
        assert_eq!(r.buffered_len(), "CanBus Rx 0x1".len());
        let events: Vec<_> = r.feed(b" 01\n").collect();
        assert_eq!(frames(&events)[0].identifier, 0x1);
    }

    #[test]
    fn test_reset_clears_partial() {
        let mut r = StreamReassembler::default();
        assert_eq!(r.feed(b"CanBus Rx 0x").count(), 0);
        r.reset();
        let events: Vec<_> = r.feed(b"CanBus Rx 0x5 05\n").collect();
        assert_eq!(frames(&events)[0].identifier, 0x5);
    }
}
