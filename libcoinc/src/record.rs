use std::io::BufRead;

use super::config::ColumnLayout;
use super::error::RecordError;

const COMMENT_MARKER: char = '#';

/// A single detector hit parsed from one line of input.
///
/// Records are immutable once parsed. The raw line (without its line terminator) is kept
/// so it can be copied verbatim to the trigger outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: f64,
    channel: String,
    value: f64,
    raw: String,
    line: u64,
}

impl Record {
    pub fn new(timestamp: f64, channel: &str, value: f64, raw: &str, line: u64) -> Self {
        Self {
            timestamp,
            channel: channel.to_string(),
            value,
            raw: raw.to_string(),
            line,
        }
    }

    /// Parse a whitespace-delimited line.
    ///
    /// `line_number` is 1-based and only used for error reporting.
    pub fn parse(raw: &str, line_number: u64, columns: &ColumnLayout) -> Result<Self, RecordError> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        let required = columns.required_fields();
        if fields.len() < required {
            return Err(RecordError::MissingFields(
                line_number,
                fields.len(),
                required,
                raw.to_string(),
            ));
        }

        let ts_field = fields[columns.timestamp];
        let timestamp = match ts_field.parse::<f64>() {
            Ok(ts) if ts.is_finite() => ts,
            _ => {
                return Err(RecordError::BadTimestamp(
                    line_number,
                    ts_field.to_string(),
                    raw.to_string(),
                ))
            }
        };

        let val_field = fields[columns.value];
        let value = val_field.parse::<f64>().map_err(|_| {
            RecordError::BadValue(line_number, val_field.to_string(), raw.to_string())
        })?;

        Ok(Self {
            timestamp,
            channel: fields[columns.channel].to_string(),
            value,
            raw: raw.to_string(),
            line: line_number,
        })
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 1-based line number in the input stream
    pub fn line(&self) -> u64 {
        self.line
    }
}

/// Counters kept by the RecordStream. Comment lines are never counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCounts {
    pub records_parsed: u64,
    pub records_accepted: u64,
    pub below_threshold: u64,
}

/// RecordStream reads a time-sorted text stream and hands out parsed Records one at a time.
///
/// Records with a value below the threshold are dropped here, before they can reach the
/// ClusterBuilder. The stream also enforces the ordering precondition: a timestamp smaller
/// than the previously accepted one is an error, never silently fixed.
#[derive(Debug)]
pub struct RecordStream<R> {
    reader: R,
    columns: ColumnLayout,
    threshold: Option<f64>,
    buffer: Vec<u8>,
    line_number: u64,
    bytes_read: u64,
    last_timestamp: Option<f64>,
    counts: ParseCounts,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, columns: ColumnLayout, threshold: Option<f64>) -> Self {
        Self {
            reader,
            columns,
            threshold,
            buffer: Vec::new(),
            line_number: 0,
            bytes_read: 0,
            last_timestamp: None,
            counts: ParseCounts::default(),
        }
    }

    /// Get the next accepted record in the stream
    ///
    /// Returns a `Result<Option<Record>>`. The Option is None if the stream has
    /// no more data.
    pub fn get_next_record(&mut self) -> Result<Option<Record>, RecordError> {
        loop {
            self.buffer.clear();
            let n_bytes = self.reader.read_until(b'\n', &mut self.buffer)?;
            if n_bytes == 0 {
                return Ok(None);
            }
            self.bytes_read += n_bytes as u64;
            self.line_number += 1;

            let line = std::str::from_utf8(&self.buffer)
                .map_err(|_| RecordError::BadEncoding(self.line_number))?;
            let line = line.strip_suffix('\n').unwrap_or(line);
            if line.trim_start().starts_with(COMMENT_MARKER) {
                continue;
            }

            let record = Record::parse(line, self.line_number, &self.columns)?;
            self.counts.records_parsed += 1;

            // Checked against the last accepted record, before the threshold can drop this one
            if let Some(previous) = self.last_timestamp {
                if record.timestamp < previous {
                    return Err(RecordError::OutOfOrder(
                        self.line_number,
                        record.timestamp,
                        previous,
                    ));
                }
            }

            if let Some(threshold) = self.threshold {
                if record.value < threshold {
                    self.counts.below_threshold += 1;
                    continue;
                }
            }

            self.last_timestamp = Some(record.timestamp);
            self.counts.records_accepted += 1;
            return Ok(Some(record));
        }
    }

    pub fn counts(&self) -> &ParseCounts {
        &self.counts
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Number of lines consumed so far, comments included
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}
