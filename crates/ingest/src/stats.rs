//! Counters for symbol passes and whole cycles.

use std::ops::AddAssign;

/// Request and storage counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestStats {
    /// HTTP requests issued, including rate-limit retries.
    pub requests: u64,
    /// Pages handed to a driver (transport failures count as empty pages).
    pub pages: u64,
    /// Records received from the source.
    pub fetched: u64,
    /// Rows newly written to storage.
    pub inserted: u64,
    pub transport_failures: u64,
    pub rate_limit_retries: u64,
}

impl HarvestStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats a summary report.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Requests: {}, Pages: {}, Fetched: {}, Inserted: {}, Transport failures: {}, Rate-limit retries: {}",
            self.requests,
            self.pages,
            self.fetched,
            self.inserted,
            self.transport_failures,
            self.rate_limit_retries
        )
    }
}

impl AddAssign for HarvestStats {
    fn add_assign(&mut self, other: Self) {
        self.requests += other.requests;
        self.pages += other.pages;
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.transport_failures += other.transport_failures;
        self.rate_limit_retries += other.rate_limit_retries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let mut total = HarvestStats::new();
        total += HarvestStats {
            requests: 3,
            pages: 2,
            fetched: 1500,
            inserted: 1200,
            transport_failures: 1,
            rate_limit_retries: 1,
        };
        total += HarvestStats {
            requests: 1,
            pages: 1,
            ..HarvestStats::default()
        };

        assert_eq!(total.requests, 4);
        assert_eq!(total.pages, 3);
        assert_eq!(
            total.summary(),
            "Requests: 4, Pages: 3, Fetched: 1500, Inserted: 1200, Transport failures: 1, Rate-limit retries: 1"
        );
    }
}
