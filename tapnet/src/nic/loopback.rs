//! Implementation of a software loop-back device.
use std::collections::VecDeque;

use super::{Device, Error, Personality, Result};

/// An in-memory device.
///
/// Frames written by the stack are recorded for inspection and frames injected with `inject` are
/// handed to the stack on the next `receive`, oldest first. With `looped` set, transmitted frames
/// are also queued for reception, which makes the device a real loop-back.
#[derive(Debug, Default)]
pub struct Loopback {
    personality: Personality,
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Vec<u8>>,
    looped: bool,
}

impl Loopback {
    /// Create a device that records all transmitted frames.
    pub fn new(personality: Personality) -> Self {
        Loopback {
            personality,
            ..Loopback::default()
        }
    }

    /// Create a device that also receives everything it transmits.
    pub fn looped(personality: Personality) -> Self {
        Loopback {
            looped: true,
            ..Loopback::new(personality)
        }
    }

    /// Queue a frame to be received.
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.rx.push_back(frame);
    }

    /// The frames transmitted so far, oldest first.
    pub fn transmitted(&self) -> &[Vec<u8>] {
        &self.tx
    }

    /// Take all transmitted frames, leaving the record empty.
    pub fn take_transmitted(&mut self) -> Vec<Vec<u8>> {
        core::mem::replace(&mut self.tx, Vec::new())
    }

    /// The number of frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Device for Loopback {
    fn personality(&self) -> Personality {
        self.personality.clone()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize> {
        if frame.len() > self.personality.mtu() + crate::wire::ethernet_frame::header_len() {
            return Err(Error::TooLarge)
        }

        if self.looped {
            self.rx.push_back(frame.to_vec());
        }
        self.tx.push(frame.to_vec());
        Ok(frame.len())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<usize>> {
        let frame = match self.rx.pop_front() {
            None => return Ok(None),
            Some(frame) => frame,
        };

        if frame.len() > buffer.len() {
            return Err(Error::TooLarge)
        }

        buffer[..frame.len()].copy_from_slice(&frame);
        Ok(Some(frame.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_loopback() {
        let mut loopback = Loopback::looped(Personality::baseline());
        assert_eq!(loopback.transmit(&[1, 2, 3, 4]).unwrap(), 4);
        assert_eq!(loopback.transmitted(), &[vec![1, 2, 3, 4]]);

        let mut buffer = [0; 64];
        assert_eq!(loopback.receive(&mut buffer).unwrap(), Some(4));
        assert_eq!(&buffer[..4], &[1, 2, 3, 4]);
        assert_eq!(loopback.receive(&mut buffer).unwrap(), None);
    }

    #[test]
    fn rejects_oversized() {
        let mut loopback = Loopback::new(Personality::with_mtu(100));
        let frame = vec![0; 115];
        match loopback.transmit(&frame) {
            Err(Error::TooLarge) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(loopback.transmitted().is_empty());
    }

    #[test]
    fn injected_in_order() {
        let mut loopback = Loopback::new(Personality::baseline());
        loopback.inject(vec![1]);
        loopback.inject(vec![2, 2]);
        assert_eq!(loopback.pending(), 2);
        let mut buffer = [0; 8];
        assert_eq!(loopback.receive(&mut buffer).unwrap(), Some(1));
        assert_eq!(buffer[0], 1);
        assert_eq!(loopback.receive(&mut buffer).unwrap(), Some(2));
        assert_eq!(buffer[0], 2);
        assert!(loopback.transmitted().is_empty());
    }
}
