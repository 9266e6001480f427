/// A snapshot of how far the pipeline has come, handed to the progress callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub bytes_read: u64,
    pub records_accepted: u64,
    pub clusters: u64,
    pub lines_written: u64,
}

impl Progress {
    pub fn new(bytes_read: u64, records_accepted: u64, clusters: u64, lines_written: u64) -> Self {
        Self {
            bytes_read,
            records_accepted,
            clusters,
            lines_written,
        }
    }
}
