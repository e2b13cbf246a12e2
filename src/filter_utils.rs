use crate::indicators::{EmaPeriod, EmaScanResult, PriceRelation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationFilter {
    #[default]
    All,
    Above,
    Below,
}

impl RelationFilter {
    pub fn accepts(self, relation: Option<PriceRelation>) -> bool {
        match self {
            RelationFilter::All => true,
            RelationFilter::Above => relation == Some(PriceRelation::Above),
            RelationFilter::Below => relation == Some(PriceRelation::Below),
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            RelationFilter::All => RelationFilter::Above,
            RelationFilter::Above => RelationFilter::Below,
            RelationFilter::Below => RelationFilter::All,
        }
    }
}

impl fmt::Display for RelationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationFilter::All => "all",
            RelationFilter::Above => "above",
            RelationFilter::Below => "below",
        })
    }
}

impl FromStr for RelationFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(RelationFilter::All),
            "above" => Ok(RelationFilter::Above),
            "below" => Ok(RelationFilter::Below),
            other => Err(format!("unknown relation filter `{other}` (expected all, above or below)")),
        }
    }
}

/// The user's current selection over the scan results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    /// Case-insensitive substring of the symbol or company name.
    pub search: String,
    pub relation: RelationFilter,
    /// Which EMA `relation` is checked against.
    pub period: EmaPeriod,
}

impl ResultFilter {
    pub fn matches(&self, result: &EmaScanResult) -> bool {
        self.matches_search(result) && self.relation.accepts(result.relation(self.period))
    }

    fn matches_search(&self, result: &EmaScanResult) -> bool {
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || result.symbol.to_lowercase().contains(&needle)
            || result.company_name.to_lowercase().contains(&needle)
    }

    pub fn apply<'a>(&self, results: &'a [EmaScanResult]) -> Vec<&'a EmaScanResult> {
        results.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Number of pages for `len` items, never less than one.
pub fn total_pages(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1)).max(1)
}

/// The slice for 1-based `page`, clamped into `[1, total_pages]`.
pub fn paginate<T>(items: &[T], page_size: usize, page: usize) -> &[T] {
    let page_size = page_size.max(1);
    let page = page.clamp(1, total_pages(items.len(), page_size));
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());
    &items[start.min(end)..end]
}

/// One page of filtered results with the numbers needed for a
/// "Showing a - b of n" footer.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
    pub items: &'a [&'a EmaScanResult],
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub first_ordinal: usize,
    pub last_ordinal: usize,
}

impl<'a> PageView<'a> {
    pub fn new(filtered: &'a [&'a EmaScanResult], page_size: usize, page: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_pages(filtered.len(), page_size);
        let page = page.clamp(1, total_pages);
        let items = paginate(filtered, page_size, page);
        let first_ordinal = if items.is_empty() {
            0
        } else {
            (page - 1) * page_size + 1
        };
        Self {
            items,
            page,
            total_pages,
            total_items: filtered.len(),
            first_ordinal,
            last_ordinal: first_ordinal + items.len().saturating_sub(1),
        }
    }
}
