//! Section frequency analysis over a corpus of observed identifiers

use std::collections::HashMap;

use tracing::{debug, info};

use super::{decode, CandidateId, Section};
use crate::errors::{ConfigError, ConfigResult};

/// Occurrence counts of each section value in a corpus
#[derive(Debug, Clone, Default)]
pub struct SectionHistogram {
    counts: HashMap<Section, usize>,
    total: usize,
}

impl SectionHistogram {
    /// Decode every id in the corpus and count its section
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = CandidateId>,
    {
        let mut histogram = Self::default();
        for id in ids {
            *histogram.counts.entry(decode(id).section).or_insert(0) += 1;
            histogram.total += 1;
        }
        histogram
    }

    /// Number of ids counted
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct section values seen
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// The `n` most frequent sections, count descending then section ascending
    pub fn top(&self, n: usize) -> Vec<(Section, usize)> {
        let mut entries: Vec<(Section, usize)> =
            self.counts.iter().map(|(s, c)| (*s, *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    /// The most frequent section; ties go to the smallest section value
    pub fn majority(&self) -> Option<(Section, usize)> {
        self.top(1).into_iter().next()
    }
}

/// Pick the section to fix for all generated candidates
///
/// # Errors
///
/// Returns [`ConfigError::EmptySeedCorpus`] when the corpus has no ids.
pub fn select_section<I>(ids: I) -> ConfigResult<Section>
where
    I: IntoIterator<Item = CandidateId>,
{
    let histogram = SectionHistogram::from_ids(ids);
    let (section, count) = histogram.majority().ok_or(ConfigError::EmptySeedCorpus)?;

    debug!(
        "Section histogram: {} ids, {} distinct sections",
        histogram.total(),
        histogram.distinct()
    );
    info!(
        "Selected section {} ({} of {} ids)",
        section,
        count,
        histogram.total()
    );
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::id::encode;

    #[test]
    fn test_majority_section_selected() {
        let majority = Section::from_bit_string("0000000000000000000001").unwrap();
        let minority = Section::new(0b1010_1010);

        let mut ids = Vec::new();
        for i in 0..90u16 {
            ids.push(encode(1_690_000_000 + u32::from(i), i % 1024, majority));
        }
        for i in 0..10u16 {
            ids.push(encode(1_690_000_500, i, minority));
        }

        assert_eq!(select_section(ids.clone()).unwrap(), majority);

        let histogram = SectionHistogram::from_ids(ids);
        assert_eq!(histogram.total(), 100);
        assert_eq!(histogram.distinct(), 2);
        assert_eq!(histogram.top(2), vec![(majority, 90), (minority, 10)]);
    }

    #[test]
    fn test_tie_breaks_to_smallest_section() {
        let low = Section::new(5);
        let high = Section::new(900);
        let ids = vec![
            encode(1, 0, high),
            encode(2, 0, low),
            encode(3, 0, high),
            encode(4, 0, low),
        ];
        assert_eq!(select_section(ids).unwrap(), low);
    }

    #[test]
    fn test_empty_corpus_is_fatal() {
        let result = select_section(Vec::<CandidateId>::new());
        assert!(matches!(result, Err(ConfigError::EmptySeedCorpus)));
    }
}
