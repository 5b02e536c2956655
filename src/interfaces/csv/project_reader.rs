use crate::domain::project::Project;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads projects from a CSV source.
///
/// Expected header: `id, title, owner_id, target_amount[, current_amount]`.
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Project>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct ProjectReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ProjectReader<R> {
    /// Creates a new `ProjectReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes projects.
    pub fn projects(self) -> impl Iterator<Item = Result<Project>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
