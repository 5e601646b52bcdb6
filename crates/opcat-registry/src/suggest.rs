//! "Did you mean" suggestions for not-found lookups

/// Minimum similarity before a candidate is worth suggesting.
const THRESHOLD: f64 = 0.8;

/// The closest candidate to `input`, if any clears the bar.
pub fn closest<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(input, candidate), candidate))
        .filter(|(score, _)| *score >= THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_name_is_suggested() {
        let suggestion = closest("etdc", ["etcd", "prometheus"].into_iter());
        assert_eq!(suggestion.as_deref(), Some("etcd"));
    }

    #[test]
    fn test_distant_names_are_not() {
        assert_eq!(closest("zookeeper", ["etcd"].into_iter()), None);
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(closest("etcd", std::iter::empty()), None);
    }
}
