//! Single-flight render registry.
//!
//! Concurrent requests for the same `(container, frame, settings)` key
//! share one render: the first caller runs it, later callers block on a
//! condvar and receive a clone of the result.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::Result;

#[derive(Default)]
struct FlightSlot {
    result: Mutex<Option<Result<Vec<u8>>>>,
    cond: Condvar,
}

#[derive(Default)]
pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<u64, Arc<FlightSlot>>>,
}

impl SingleFlight {
    pub fn run<F>(&self, key: u64, render: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let (slot, leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(FlightSlot::default());
                    inflight.insert(key, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if leader {
            let result = render();
            {
                let mut done = slot.result.lock().unwrap();
                *done = Some(result.clone());
            }
            slot.cond.notify_all();
            self.inflight.lock().unwrap().remove(&key);
            result
        } else {
            let mut done = slot.result.lock().unwrap();
            while done.is_none() {
                done = slot.cond.wait(done).unwrap();
            }
            done.clone().unwrap()
        }
    }
}
