//! Buffered half-duplex stream (component C).
//!
//! Grounded in the prototype's `stream.py` `BufferedStream`: an
//! `input_buffer`/`output_buffer` pair behind a direction flag, plus
//! `first_packet_time` as the send-window scheduling anchor. The prototype
//! polls with `time.sleep(precision)` in a loop; here a `parking_lot`
//! `Condvar` is signaled on every buffer mutation and direction flip, with
//! `read`/`write` waiting with a deadline instead of spinning — the REDESIGN
//! FLAG collapsing the polling-sleep loops.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

struct Inner {
    direction: Direction,
    input_buffer: VecDeque<u8>,
    output_buffer: VecDeque<Vec<u8>>,
    first_packet_time: Option<Instant>,
}

/// Byte-oriented buffer pair shared between the transport/session loop and
/// the modem's mic/speaker loops. Cloning shares state (`Arc` internally via
/// the caller holding an `Arc<BufferedStream>`); the struct itself owns the
/// lock.
pub struct BufferedStream {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl BufferedStream {
    pub fn new(turn_write: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                direction: if turn_write { Direction::Write } else { Direction::Read },
                input_buffer: VecDeque::new(),
                output_buffer: VecDeque::new(),
                first_packet_time: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.inner.lock().direction
    }

    pub fn can_read(&self) -> bool {
        self.direction() == Direction::Read
    }

    pub fn can_write(&self) -> bool {
        self.direction() == Direction::Write
    }

    pub fn turn(&self) {
        let mut inner = self.inner.lock();
        inner.direction = match inner.direction {
            Direction::Read => Direction::Write,
            Direction::Write => Direction::Read,
        };
        self.changed.notify_all();
    }

    pub fn turn_read(&self) {
        let mut inner = self.inner.lock();
        if inner.direction == Direction::Read {
            return;
        }
        inner.direction = Direction::Read;
        self.changed.notify_all();
    }

    pub fn turn_write(&self) {
        let mut inner = self.inner.lock();
        if inner.direction == Direction::Write {
            return;
        }
        inner.direction = Direction::Write;
        self.changed.notify_all();
    }

    /// Appends bytes produced by the mic/modem loop to the input buffer.
    pub fn push_input(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.input_buffer.extend(data.iter().copied());
        self.changed.notify_all();
    }

    /// Reads exactly `length` bytes, blocking (up to `timeout`, if given)
    /// until they're available. Returns fewer bytes than requested only when
    /// `block` is false or the timeout elapses.
    pub fn read(&self, length: usize, block: bool, timeout: Option<Duration>) -> Vec<u8> {
        let mut inner = self.inner.lock();

        if !block {
            let n = length.min(inner.input_buffer.len());
            return inner.input_buffer.drain(..n).collect();
        }

        let deadline = timeout.map(|d| Instant::now() + d);
        while inner.input_buffer.len() < length {
            let timed_out = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        true
                    } else {
                        self.changed.wait_for(&mut inner, dl - now).timed_out()
                    }
                }
                None => {
                    self.changed.wait(&mut inner);
                    false
                }
            };
            if timed_out {
                break;
            }
        }

        let n = length.min(inner.input_buffer.len());
        inner.input_buffer.drain(..n).collect()
    }

    /// Queues `data` for the speaker-writer loop to pick up and, if
    /// `block`, waits until the output buffer has drained.
    pub fn write(&self, data: Vec<u8>, block: bool, timeout: Option<Duration>) {
        let mut inner = self.inner.lock();
        inner.output_buffer.push_back(data);
        self.changed.notify_all();

        if !block {
            return;
        }

        let deadline = timeout.map(|d| Instant::now() + d);
        while !inner.output_buffer.is_empty() {
            match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl || self.changed.wait_for(&mut inner, dl - now).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut inner),
            }
        }
    }

    /// Pops the next queued chunk for the speaker-writer loop to modulate.
    pub fn pop_output(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let popped = inner.output_buffer.pop_front();
        if popped.is_some() {
            self.changed.notify_all();
        }
        popped
    }

    pub fn clear_input_buffer(&self) {
        let mut inner = self.inner.lock();
        inner.input_buffer.clear();
    }

    pub fn clear_output_buffer(&self) {
        let mut inner = self.inner.lock();
        inner.output_buffer.clear();
        self.changed.notify_all();
    }

    pub fn first_packet_time(&self) -> Option<Instant> {
        self.inner.lock().first_packet_time
    }

    pub fn set_first_packet_time(&self, at: Instant) {
        self.inner.lock().first_packet_time = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_flips_direction_and_gates_read_write() {
        let s = BufferedStream::new(false);
        assert!(s.can_read());
        s.turn();
        assert!(s.can_write());
        s.turn_write();
        assert!(s.can_write());
    }

    #[test]
    fn write_then_pop_output_round_trips() {
        let s = BufferedStream::new(true);
        s.write(vec![1, 2, 3], false, None);
        assert_eq!(s.pop_output(), Some(vec![1, 2, 3]));
        assert_eq!(s.pop_output(), None);
    }

    #[test]
    fn read_blocks_until_enough_input_is_pushed() {
        use std::sync::Arc;
        use std::thread;

        let s = Arc::new(BufferedStream::new(false));
        let s2 = s.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            s2.push_input(&[9, 9, 9]);
        });

        let data = s.read(3, true, Some(Duration::from_secs(1)));
        assert_eq!(data, vec![9, 9, 9]);
    }

    #[test]
    fn read_non_blocking_returns_partial() {
        let s = BufferedStream::new(false);
        s.push_input(&[1, 2]);
        assert_eq!(s.read(5, false, None), vec![1, 2]);
    }

    #[test]
    fn read_times_out_without_enough_data() {
        let s = BufferedStream::new(false);
        let data = s.read(3, true, Some(Duration::from_millis(20)));
        assert!(data.is_empty());
    }
}
