//! Queued host-to-device configuration writes.

use thiserror::Error;

use crate::device::{DeviceError, FifoBridge, WRITE_CHUNK_SIZE};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write width must be 1..=4 bytes, got {0}")]
    InvalidWidth(usize),

    #[error("short write: device accepted {sent} of {len} bytes")]
    Short { sent: usize, len: usize },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Accumulator for host-to-device configuration words, flushed as one
/// logical transfer.
///
/// Control-thread only: configuration writes are infrequent and never
/// contend with the producer's stream reads.
#[derive(Debug, Default)]
pub struct WriteQueue {
    buf: Vec<u8>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `nbytes` of `value`, little-endian.
    pub fn enqueue(&mut self, value: u32, nbytes: usize) -> Result<(), WriteError> {
        if nbytes == 0 || nbytes > 4 {
            return Err(WriteError::InvalidWidth(nbytes));
        }
        self.buf.extend_from_slice(&value.to_le_bytes()[..nbytes]);
        Ok(())
    }

    /// Queued bytes not yet flushed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Send everything queued. Transfers larger than the device write chunk
    /// are segmented internally. On any failure the queue is preserved so
    /// the caller may retry the whole transfer.
    pub fn flush(&mut self, bridge: &dyn FifoBridge) -> Result<(), WriteError> {
        let len = self.buf.len();
        let mut sent = 0;
        while sent < len {
            let end = (sent + WRITE_CHUNK_SIZE).min(len);
            let accepted = bridge.write(&self.buf[sent..end])?;
            if accepted != end - sent {
                return Err(WriteError::Short {
                    sent: sent + accepted,
                    len,
                });
            }
            sent = end;
        }
        self.buf.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BridgeConfig, StreamControl};
    use crate::replay::ReplayBridge;

    /// Bridge whose outbound endpoint accepts one byte less than asked.
    struct ShortBridge;

    impl FifoBridge for ShortBridge {
        fn configure(&self, _config: &BridgeConfig) -> Result<(), DeviceError> {
            Ok(())
        }
        fn purge(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn read_stream(
            &self,
            _sink: &mut dyn FnMut(&[u8]) -> StreamControl,
        ) -> Result<(), DeviceError> {
            Ok(())
        }
        fn write(&self, bytes: &[u8]) -> Result<usize, DeviceError> {
            Ok(bytes.len().saturating_sub(1))
        }
    }

    #[test]
    fn test_enqueue_little_endian() {
        let mut queue = WriteQueue::new();
        queue.enqueue(0x0403, 2).unwrap();
        queue.enqueue(0xAB, 1).unwrap();
        queue.enqueue(0x01020304, 4).unwrap();
        assert_eq!(queue.pending(), 7);

        let bridge = ReplayBridge::new();
        queue.flush(&bridge).unwrap();
        assert_eq!(
            bridge.outbound(),
            vec![0x03, 0x04, 0xAB, 0x04, 0x03, 0x02, 0x01]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejects_bad_widths() {
        let mut queue = WriteQueue::new();
        assert!(matches!(
            queue.enqueue(1, 0),
            Err(WriteError::InvalidWidth(0))
        ));
        assert!(matches!(
            queue.enqueue(1, 5),
            Err(WriteError::InvalidWidth(5))
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut queue = WriteQueue::new();
        let bridge = ReplayBridge::new();
        queue.flush(&bridge).unwrap();
        assert!(bridge.outbound().is_empty());
    }

    #[test]
    fn test_short_write_preserves_queue() {
        let mut queue = WriteQueue::new();
        queue.enqueue(0xDEADBEEF, 4).unwrap();

        match queue.flush(&ShortBridge) {
            Err(WriteError::Short { sent: 3, len: 4 }) => {}
            other => panic!("unexpected flush result: {other:?}"),
        }
        assert_eq!(queue.pending(), 4, "queue must survive a failed flush");

        // Retry against a working bridge succeeds with the full payload.
        let bridge = ReplayBridge::new();
        queue.flush(&bridge).unwrap();
        assert_eq!(bridge.outbound(), vec![0xEF, 0xBE, 0xAD, 0xDE]);
    }
}
