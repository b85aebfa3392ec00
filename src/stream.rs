//! Sample feed of the simulated card.
//!
//! The card delivers packets on its own jittered cadence, independent of the
//! driver's instruction timing. Only this generator writes the read-only
//! sample registers.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{Device, Port, DATA_READY_SET};

/// Ticks before the very first packet lands.
const INITIAL_COUNTDOWN: i32 = 10;
/// Jittered refill range after each delivered packet.
const REFILL_TICKS: std::ops::RangeInclusive<i32> = 12..=20;
/// Packet bytes cycled forever through the buffer.
const SAMPLE_PATTERN: [u8; 8] = [0x1A, 0x42, 0x7F, 0x03, 0xA8, 0x5C, 0x2E, 0x91];

/// Periodic producer feeding `PACKET_BUFFER` / `DATA_READY`.
#[derive(Debug)]
pub struct DataStream {
    ticks_remaining: i32,
    samples: VecDeque<u8>,
    rng: StdRng,
}

impl DataStream {
    /// Entropy-seeded stream, the normal case.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Fixed-seed stream for reproducible runs (`LAPC_SEED`) and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        DataStream {
            ticks_remaining: INITIAL_COUNTDOWN,
            samples: VecDeque::from(SAMPLE_PATTERN),
            rng,
        }
    }

    /// Restore the initial countdown and sample order. The RNG is left
    /// alone; reseeding is a new stream.
    pub fn reset(&mut self) {
        self.ticks_remaining = INITIAL_COUNTDOWN;
        self.samples = VecDeque::from(SAMPLE_PATTERN);
    }

    /// Advance one scheduler tick. While the card is unpowered this writes
    /// nothing; registers keep their last values.
    pub fn tick(&mut self, device: &mut Device) {
        if !device.is_powered() {
            return;
        }
        self.ticks_remaining -= 1;
        if self.ticks_remaining <= 0 {
            // Recycle: the delivered sample goes straight to the back, so
            // the stream never runs dry.
            let sample = self.samples.pop_front().expect("sample queue is never empty");
            device.force_set(Port::PacketBuffer, sample);
            device.force_set(Port::DataReady, DATA_READY_SET);
            self.samples.push_back(sample);
            self.ticks_remaining = self.rng.gen_range(REFILL_TICKS);
        } else {
            device.force_set(Port::DataReady, 0x00);
        }
    }
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ACTIVATION_BYTE;

    fn powered_device() -> Device {
        let mut device = Device::new();
        device
            .write(Port::MasterPower.address(), ACTIVATION_BYTE)
            .unwrap();
        device
    }

    #[test]
    fn no_writes_while_powered_off() {
        let mut device = Device::new();
        let mut stream = DataStream::with_seed(7);
        for _ in 0..100 {
            stream.tick(&mut device);
        }
        assert_eq!(device.get(Port::DataReady), 0);
        assert_eq!(device.get(Port::PacketBuffer), 0);
    }

    #[test]
    fn first_packet_lands_after_initial_countdown() {
        let mut device = powered_device();
        let mut stream = DataStream::with_seed(7);
        for _ in 0..INITIAL_COUNTDOWN - 1 {
            stream.tick(&mut device);
            assert_eq!(device.get(Port::DataReady), 0);
        }
        stream.tick(&mut device);
        assert_eq!(device.get(Port::DataReady), DATA_READY_SET);
        assert_eq!(device.get(Port::PacketBuffer), SAMPLE_PATTERN[0]);
    }

    #[test]
    fn ready_flag_clears_between_packets() {
        let mut device = powered_device();
        let mut stream = DataStream::with_seed(7);
        for _ in 0..INITIAL_COUNTDOWN {
            stream.tick(&mut device);
        }
        stream.tick(&mut device);
        assert_eq!(device.get(Port::DataReady), 0);
        // The delivered packet stays in the buffer until the next one.
        assert_eq!(device.get(Port::PacketBuffer), SAMPLE_PATTERN[0]);
    }

    #[test]
    fn samples_recycle_in_order() {
        let mut device = powered_device();
        let mut stream = DataStream::with_seed(42);
        let mut delivered = Vec::new();
        for _ in 0..2000 {
            stream.tick(&mut device);
            if device.get(Port::DataReady) == DATA_READY_SET {
                delivered.push(device.get(Port::PacketBuffer));
            }
        }
        assert!(delivered.len() > SAMPLE_PATTERN.len());
        for (i, sample) in delivered.iter().enumerate() {
            assert_eq!(*sample, SAMPLE_PATTERN[i % SAMPLE_PATTERN.len()]);
        }
    }

    #[test]
    fn refill_intervals_stay_in_bounds() {
        let mut device = powered_device();
        let mut stream = DataStream::with_seed(99);
        let mut last_delivery = None;
        for tick in 0i64..2000 {
            stream.tick(&mut device);
            if device.get(Port::DataReady) == DATA_READY_SET {
                if let Some(prev) = last_delivery {
                    let gap = tick - prev;
                    assert!((12..=20).contains(&gap), "gap {gap} out of bounds");
                }
                last_delivery = Some(tick);
            }
        }
    }

    #[test]
    fn seeded_streams_are_deterministic() {
        let mut d1 = powered_device();
        let mut d2 = powered_device();
        let mut s1 = DataStream::with_seed(1234);
        let mut s2 = DataStream::with_seed(1234);
        for _ in 0..500 {
            s1.tick(&mut d1);
            s2.tick(&mut d2);
            assert_eq!(d1, d2);
        }
    }
}
