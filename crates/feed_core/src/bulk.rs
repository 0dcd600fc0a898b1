//! Resync framing: holds live events while a bulk snapshot is in flight.

/// Marks the event that completes a bulk resync.
pub trait ResyncSentinel {
    fn is_resync_end(&self) -> bool;
}

/// What the buffer did with an accepted event.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    /// Passthrough mode: deliver immediately.
    Forward(T),
    /// Buffering mode: appended, nothing to deliver yet.
    Held,
    /// Sentinel received: every held event, oldest first.
    Batch(Vec<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkBuffer<T> {
    buffering: bool,
    held: Vec<T>,
}

impl<T> Default for BulkBuffer<T> {
    fn default() -> Self {
        Self {
            buffering: false,
            held: Vec::new(),
        }
    }
}

impl<T: ResyncSentinel> BulkBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters buffering mode. Returns `false` if a resync is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.buffering {
            return false;
        }
        self.buffering = true;
        true
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    pub fn accept(&mut self, item: T) -> Delivery<T> {
        if !self.buffering {
            return Delivery::Forward(item);
        }
        if item.is_resync_end() {
            return Delivery::Batch(self.finish());
        }
        self.held.push(item);
        Delivery::Held
    }

    /// Gives up on the in-flight resync and releases what was held.
    pub fn abandon(&mut self) -> Vec<T> {
        self.finish()
    }

    fn finish(&mut self) -> Vec<T> {
        self.buffering = false;
        std::mem::take(&mut self.held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Item(u32),
        End,
    }

    impl ResyncSentinel for Ev {
        fn is_resync_end(&self) -> bool {
            matches!(self, Ev::End)
        }
    }

    #[test]
    fn passthrough_forwards_immediately() {
        let mut buffer = BulkBuffer::new();
        assert_eq!(buffer.accept(Ev::Item(1)), Delivery::Forward(Ev::Item(1)));
        // A stray sentinel outside a resync is forwarded too.
        assert_eq!(buffer.accept(Ev::End), Delivery::Forward(Ev::End));
    }

    #[test]
    fn buffered_events_flush_once_in_arrival_order() {
        let mut buffer = BulkBuffer::new();
        assert!(buffer.begin());
        assert_eq!(buffer.accept(Ev::Item(1)), Delivery::Held);
        assert_eq!(buffer.accept(Ev::Item(2)), Delivery::Held);
        assert_eq!(buffer.accept(Ev::Item(3)), Delivery::Held);
        assert_eq!(buffer.held_len(), 3);

        assert_eq!(
            buffer.accept(Ev::End),
            Delivery::Batch(vec![Ev::Item(1), Ev::Item(2), Ev::Item(3)])
        );
        assert!(!buffer.is_buffering());
        assert_eq!(buffer.accept(Ev::Item(4)), Delivery::Forward(Ev::Item(4)));
    }

    #[test]
    fn begin_twice_keeps_existing_buffer() {
        let mut buffer = BulkBuffer::new();
        assert!(buffer.begin());
        buffer.accept(Ev::Item(1));
        assert!(!buffer.begin());
        assert_eq!(buffer.held_len(), 1);
    }

    #[test]
    fn abandon_releases_and_returns_to_passthrough() {
        let mut buffer = BulkBuffer::new();
        buffer.begin();
        buffer.accept(Ev::Item(7));
        assert_eq!(buffer.abandon(), vec![Ev::Item(7)]);
        assert!(!buffer.is_buffering());
    }
}
