//! Bounded rolling windows of recent samples, one set per channel.
//!
//! Storage is a fixed-capacity ring with plain index arithmetic: values land
//! at a write pointer that wraps modulo capacity, so appends are O(1) and the
//! oldest entry is evicted first. Each channel keeps four quantity rings plus
//! one timestamp ring, always the same length — NaN is a stored value, not an
//! absence, so the rings never drift apart.
//!
//! All mutation happens on the foreground consumer; readers see whole appends
//! only.

use crate::core::{Channel, ConvertedSample, Quantity, CHANNEL_COUNT};
use chrono::NaiveDateTime;

/// Fixed-capacity FIFO ring buffer.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<T>,
    write: usize,
    capacity: usize,
}

impl<T: Copy> Ring<T> {
    /// Creates an empty ring holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            slots: Vec::with_capacity(capacity),
            write: 0,
            capacity,
        }
    }

    /// Appends a value, evicting the oldest entry once at capacity.
    pub fn push(&mut self, value: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        } else {
            self.slots[self.write] = value;
            self.write = (self.write + 1) % self.capacity;
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest first. While filling, `write` stays 0 and the first
    /// slice covers everything; once wrapped, `write` marks the oldest slot.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots[self.write..]
            .iter()
            .chain(self.slots[..self.write].iter())
    }

    /// The most recently pushed value.
    pub fn latest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity {
            self.slots.last()
        } else {
            Some(&self.slots[(self.write + self.capacity - 1) % self.capacity])
        }
    }

    /// Drops all elements, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.write = 0;
    }
}

/// Rolling buffers for a single channel: shared timestamps plus one ring per
/// quantity, kept in lockstep.
#[derive(Debug, Clone)]
pub struct ChannelSeries {
    timestamps: Ring<NaiveDateTime>,
    emf: Ring<f64>,
    tc_temp: Ring<f64>,
    resistance: Ring<f64>,
    prt_temp: Ring<f64>,
}

impl ChannelSeries {
    fn new(capacity: usize) -> Self {
        Self {
            timestamps: Ring::new(capacity),
            emf: Ring::new(capacity),
            tc_temp: Ring::new(capacity),
            resistance: Ring::new(capacity),
            prt_temp: Ring::new(capacity),
        }
    }

    fn append(&mut self, sample: &ConvertedSample) {
        self.timestamps.push(sample.timestamp);
        self.emf.push(sample.emf);
        self.tc_temp.push(sample.tc_temp);
        self.resistance.push(sample.resistance);
        self.prt_temp.push(sample.prt_temp);
        debug_assert_eq!(self.timestamps.len(), self.emf.len());
        debug_assert_eq!(self.timestamps.len(), self.resistance.len());
    }

    fn quantity_ring(&self, quantity: Quantity) -> &Ring<f64> {
        match quantity {
            Quantity::Emf => &self.emf,
            Quantity::ThermocoupleTemp => &self.tc_temp,
            Quantity::Resistance => &self.resistance,
            Quantity::PrtTemp => &self.prt_temp,
        }
    }

    fn snapshot(&self, quantity: Quantity) -> Vec<(NaiveDateTime, f64)> {
        self.timestamps
            .iter()
            .copied()
            .zip(self.quantity_ring(quantity).iter().copied())
            .collect()
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }
}

/// The per-channel series for all four channels.
#[derive(Debug)]
pub struct SeriesStore {
    channels: [ChannelSeries; CHANNEL_COUNT],
    capacity: usize,
}

impl SeriesStore {
    /// Creates empty series with the given window capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| ChannelSeries::new(capacity)),
            capacity,
        }
    }

    /// Appends a converted sample to its channel's series.
    pub fn append(&mut self, sample: &ConvertedSample) {
        self.channels[sample.channel.index()].append(sample);
    }

    /// Ordered `(timestamp, value)` pairs for one channel and quantity,
    /// oldest first, most recent last.
    pub fn snapshot(&self, channel: Channel, quantity: Quantity) -> Vec<(NaiveDateTime, f64)> {
        self.channels[channel.index()].snapshot(quantity)
    }

    /// Number of samples currently held for a channel.
    pub fn len(&self, channel: Channel) -> usize {
        self.channels[channel.index()].len()
    }

    /// True when no channel holds any sample.
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(|c| c.len() == 0)
    }

    /// Window capacity per channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards all samples and applies a new window capacity, as done at
    /// session start.
    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.channels = std::array::from_fn(|_| ChannelSeries::new(capacity));
    }
}
