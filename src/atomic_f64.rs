//! A word-sized atomic `f64`, used for the joint reference angle so that
//! `set_angle`/`get_angle` are linearisable without a mutex.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_atomic_storage() {
        let a = AtomicF64::new(45.25);
        assert_eq!(a.load(Ordering::Acquire), 45.25);
        a.store(-12.5, Ordering::Release);
        assert_eq!(a.load(Ordering::Acquire), -12.5);
    }
}
