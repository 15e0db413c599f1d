use std::sync::Mutex;

/// Single-slot holder for the most recent value, shared between the receiver
/// loop (producer) and the simulation tick (consumer). Writes overwrite any
/// unconsumed value: freshness wins over completeness.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn put(&self, value: T) {
        *self.slot.lock().unwrap() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }
}
