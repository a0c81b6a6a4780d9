//! Clock seams.
//!
//! The core itself is a step function over a `now_ms` argument; the
//! application samples [`Monotonic`] once per loop iteration and feeds the
//! value through. [`Rtc`] is the settable wall clock used by time sync.

use core::cell::RefCell;

/// Monotonic milliseconds since boot. Never goes backwards.
pub trait Monotonic {
    fn now_ms(&self) -> u64;
}

/// Settable wall clock (RTC or equivalent).
pub trait Rtc {
    fn unix_seconds(&self) -> u64;
    fn set_unix_seconds(&mut self, seconds: u64);
}

/// Lets one hardware RTC back several components on the same device (e.g.
/// the heartbeat service and the sensor adapter) through shared handles.
impl<T: Rtc> Rtc for &RefCell<T> {
    fn unix_seconds(&self) -> u64 {
        self.borrow().unix_seconds()
    }

    fn set_unix_seconds(&mut self, seconds: u64) {
        self.borrow_mut().set_unix_seconds(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRtc(u64);

    impl Rtc for FakeRtc {
        fn unix_seconds(&self) -> u64 {
            self.0
        }

        fn set_unix_seconds(&mut self, seconds: u64) {
            self.0 = seconds;
        }
    }

    #[test]
    fn shared_rtc_handles_see_each_other() {
        let rtc = RefCell::new(FakeRtc(0));
        let mut writer = &rtc;
        let reader = &rtc;

        writer.set_unix_seconds(1_700_000_000);
        assert_eq!(reader.unix_seconds(), 1_700_000_000);
    }
}
