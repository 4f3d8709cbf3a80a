use tokio::sync::watch;

/// Last processed sequence number.
///
/// There is exactly one writer (the detector task). Everyone else holds a
/// [`CursorReader`]. `None` means not yet initialized.
#[derive(Debug)]
pub struct SequenceCursor {
    tx: watch::Sender<Option<i64>>,
}

impl SequenceCursor {
    pub fn new() -> (Self, CursorReader) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, CursorReader { rx })
    }

    pub fn current(&self) -> Option<i64> {
        *self.tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Set the starting point. Allowed once; later calls go through `advance`.
    pub fn initialize(&mut self, seq: i64) {
        self.tx.send_replace(Some(seq));
    }

    /// Move forward to `seq`. Never moves backwards; returns whether it moved.
    pub fn advance(&mut self, seq: i64) -> bool {
        let moved = match self.current() {
            Some(cur) => seq > cur,
            None => true,
        };
        if moved {
            self.tx.send_replace(Some(seq));
        }
        moved
    }

    pub fn reader(&self) -> CursorReader {
        CursorReader {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CursorReader {
    rx: watch::Receiver<Option<i64>>,
}

impl CursorReader {
    pub fn last_processed_seq(&self) -> Option<i64> {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotonic_and_visible_to_readers() {
        let (mut cursor, reader) = SequenceCursor::new();
        assert_eq!(reader.last_processed_seq(), None);
        cursor.initialize(10);
        assert!(cursor.advance(12));
        assert!(!cursor.advance(11));
        assert_eq!(cursor.current(), Some(12));
        assert_eq!(reader.last_processed_seq(), Some(12));
        assert_eq!(cursor.reader().last_processed_seq(), Some(12));
    }
}
