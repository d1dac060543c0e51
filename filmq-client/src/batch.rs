//! Size-bounded batch construction.
//!
//! Records are joined with [`RECORD_SEPARATOR`] into payloads that never exceed
//! the configured byte limit. A record that does not fit is held back and opens
//! the next batch; records are never split.

use crate::error::SourceError;
use crate::source::RecordSource;
use bytes::{BufMut, Bytes, BytesMut};
use filmq_protocol::RECORD_SEPARATOR;

/// Default maximum records per batch.
pub const DEFAULT_MAX_RECORDS: usize = 100;

/// Default maximum batch payload size (8 KiB).
pub const DEFAULT_MAX_BYTES: usize = 8 * 1024;

/// One batch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Separator-joined records.
    pub payload: Bytes,
    /// Number of records in the payload.
    pub records: usize,
    /// The source was drained while building this batch.
    pub is_final: bool,
}

impl Batch {
    /// An empty batch carries nothing and must not be sent.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Builds batches from a record source, carrying one deferred record between calls.
#[derive(Debug)]
pub struct BatchBuilder {
    max_records: usize,
    max_bytes: usize,
    pending: Option<String>,
}

impl BatchBuilder {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            max_bytes: max_bytes.max(1),
            pending: None,
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns whether a record is waiting for the next batch.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Builds the next batch.
    ///
    /// The deferred record, if any, is emitted first. `is_final` is set exactly
    /// when the source reports end-of-data; the returned batch may still hold
    /// records that must be sent.
    pub fn build<S>(&mut self, source: &mut S) -> Result<Batch, SourceError>
    where
        S: RecordSource + ?Sized,
    {
        let mut buf = BytesMut::with_capacity(self.max_bytes.min(64 * 1024));
        let mut records = 0;

        if let Some(record) = self.pending.take() {
            buf.put_slice(record.as_bytes());
            records = 1;
        }

        while records < self.max_records {
            let Some(record) = source.next_record()? else {
                return Ok(Batch {
                    payload: buf.freeze(),
                    records,
                    is_final: true,
                });
            };

            if record.len() > self.max_bytes {
                return Err(SourceError::RecordTooLarge {
                    size: record.len(),
                    max: self.max_bytes,
                });
            }

            let separator = usize::from(records > 0);
            if buf.len() + separator + record.len() > self.max_bytes {
                self.pending = Some(record);
                break;
            }

            if separator == 1 {
                buf.put_u8(RECORD_SEPARATOR);
            }
            buf.put_slice(record.as_bytes());
            records += 1;
        }

        Ok(Batch {
            payload: buf.freeze(),
            records,
            is_final: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn source(records: &[&str]) -> VecDeque<String> {
        records.iter().map(|r| r.to_string()).collect()
    }

    fn split(batch: &Batch) -> Vec<String> {
        if batch.is_empty() {
            return Vec::new();
        }
        batch
            .payload
            .split(|&b| b == RECORD_SEPARATOR)
            .map(|r| String::from_utf8(r.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_record_limit_splits_batches() {
        let mut src = source(&["r1", "r2", "r3"]);
        let mut builder = BatchBuilder::new(2, DEFAULT_MAX_BYTES);

        let first = builder.build(&mut src).unwrap();
        assert_eq!(first.payload.as_ref(), b"r1|r2");
        assert_eq!(first.records, 2);
        assert!(!first.is_final);

        let second = builder.build(&mut src).unwrap();
        assert_eq!(second.payload.as_ref(), b"r3");
        assert_eq!(second.records, 1);
        assert!(second.is_final);
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_final() {
        let mut src = source(&["a", "b"]);
        let mut builder = BatchBuilder::new(2, DEFAULT_MAX_BYTES);

        let first = builder.build(&mut src).unwrap();
        assert_eq!(first.records, 2);
        assert!(!first.is_final);

        let last = builder.build(&mut src).unwrap();
        assert!(last.is_empty());
        assert!(last.is_final);
    }

    #[test]
    fn test_oversized_record_is_deferred() {
        let ninety = "x".repeat(90);
        let twenty = "y".repeat(20);
        let mut src = source(&[&ninety, &twenty]);
        let mut builder = BatchBuilder::new(10, 100);

        let first = builder.build(&mut src).unwrap();
        assert_eq!(first.payload.len(), 90);
        assert_eq!(first.records, 1);
        assert!(!first.is_final);
        assert!(builder.has_pending());

        let second = builder.build(&mut src).unwrap();
        assert_eq!(second.payload.as_ref(), twenty.as_bytes());
        assert!(second.is_final);
        assert!(!builder.has_pending());
    }

    #[test]
    fn test_separator_counts_toward_limit() {
        // "aaaa|bbbb" is 9 bytes; a limit of 8 must defer the second record.
        let mut src = source(&["aaaa", "bbbb"]);
        let mut builder = BatchBuilder::new(10, 8);

        let first = builder.build(&mut src).unwrap();
        assert_eq!(first.payload.as_ref(), b"aaaa");

        let mut src = source(&["aaaa", "bbbb"]);
        let mut builder = BatchBuilder::new(10, 9);
        let first = builder.build(&mut src).unwrap();
        assert_eq!(first.payload.as_ref(), b"aaaa|bbbb");
    }

    #[test]
    fn test_record_larger_than_limit_is_rejected() {
        let mut src = source(&["ok", &"z".repeat(11)]);
        let mut builder = BatchBuilder::new(10, 10);

        let err = builder.build(&mut src).unwrap_err();
        assert!(matches!(
            err,
            SourceError::RecordTooLarge { size: 11, max: 10 }
        ));
    }

    #[test]
    fn test_empty_source() {
        let mut src = source(&[]);
        let mut builder = BatchBuilder::new(5, 64);

        let batch = builder.build(&mut src).unwrap();
        assert!(batch.is_empty());
        assert!(batch.is_final);
        assert!(batch.payload.is_empty());
    }

    #[test]
    fn test_zero_limits_are_raised() {
        let builder = BatchBuilder::new(0, 0);
        assert_eq!(builder.max_records(), 1);
        assert_eq!(builder.max_bytes(), 1);
    }

    proptest! {
        #[test]
        fn prop_batches_respect_bounds_and_preserve_records(
            records in proptest::collection::vec("[a-z0-9,\" ]{1,40}", 0..60),
            max_records in 1usize..8,
            max_bytes in 40usize..200,
        ) {
            let mut src: VecDeque<String> = records.iter().cloned().collect();
            let mut builder = BatchBuilder::new(max_records, max_bytes);
            let mut emitted = Vec::new();
            let mut finals = 0;

            for _ in 0..(records.len() + 2) {
                let batch = builder.build(&mut src).unwrap();
                prop_assert!(batch.payload.len() <= max_bytes);
                prop_assert!(batch.records <= max_records);
                emitted.extend(split(&batch));
                if batch.is_final {
                    finals += 1;
                    break;
                }
            }

            prop_assert_eq!(finals, 1);
            prop_assert!(src.is_empty());
            prop_assert!(!builder.has_pending());
            prop_assert_eq!(emitted, records);
        }
    }
}
