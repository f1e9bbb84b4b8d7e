//! Replays recorded samples from a CSV file in an endless loop.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SampleSource;
use crate::error::SourceError;
use crate::Sample;

/// Loops over pre-loaded samples, restarting at the first one after the last.
///
/// Input is CSV text: the first column is ignored and the second column is
/// the sample value. Blank lines are skipped silently; lines whose second
/// column is missing or not a number are skipped with a warning.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    name: String,
    samples: Vec<Sample>,
    index: usize,
}

impl ReplaySource {
    /// Loads every sample from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }

    /// Loads every sample from buffered CSV text.
    pub fn from_reader<R: BufRead>(reader: R, name: impl Into<String>) -> Result<Self, SourceError> {
        let name = name.into();
        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match parse_line(trimmed) {
                Some(value) => samples.push(Sample::new(value)),
                None => {
                    skipped += 1;
                    warn!(
                        source = %name,
                        line = line_no + 1,
                        "Skipping line without a numeric second column"
                    );
                }
            }
        }

        if samples.is_empty() {
            return Err(SourceError::Empty { origin: name });
        }

        debug!(source = %name, samples = samples.len(), skipped, "Replay data loaded");

        Ok(Self {
            name,
            samples,
            index: 0,
        })
    }

    /// Builds a source over samples already in memory.
    pub fn from_samples(samples: Vec<Sample>, name: impl Into<String>) -> Result<Self, SourceError> {
        let name = name.into();
        if samples.is_empty() {
            return Err(SourceError::Empty { origin: name });
        }
        Ok(Self {
            name,
            samples,
            index: 0,
        })
    }

    /// Number of distinct samples in one loop.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the next sample and advances, wrapping at the end.
    fn advance(&mut self) -> Sample {
        if self.index >= self.samples.len() {
            self.index = 0;
        }
        let sample = self.samples.get(self.index).copied().unwrap_or(Sample::SENTINEL);
        self.index += 1;
        sample
    }
}

/// Parses the second comma-separated column.
fn parse_line(line: &str) -> Option<f64> {
    line.split(',').nth(1)?.trim().parse().ok()
}

#[async_trait]
impl SampleSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_sample(&mut self) -> Result<Sample, SourceError> {
        Ok(self.advance())
    }
}
