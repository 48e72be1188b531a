//! The query state machine from `spec.md` §6: a `Query` accumulates a
//! `where` predicate and an optional row-id restriction, then moves
//! through estimate/evaluate/truncate stages. Calls out of order are
//! rejected and leave the prior state untouched.

use bitindex_base::{kind_err, Kind, Result, RowId};
use bitindex_bitvec::Bitvector;

use crate::evaluator::Evaluator;
use crate::partition_source::PartitionSource;
use crate::predicate::Predicate;

/// Where a `Query` sits in its lifecycle. Transitions only move forward
/// except `clear`, which resets to `Uninitialised`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Uninitialised,
    SelectSet,
    RidsSet,
    WhereSet,
    Specified,
    QuickEstimated,
    FullyEvaluated,
    BundlesTruncated,
    HitsTruncated,
}

/// An in-progress query against one partition.
pub struct Query {
    state: QueryState,
    select: Option<Vec<String>>,
    rids: Option<Vec<RowId>>,
    where_pred: Option<Predicate>,
    lower: Option<Bitvector>,
    upper: Option<Bitvector>,
    hits: Option<Bitvector>,
    /// The top-k restriction staged by `truncate`, not yet folded into
    /// `hits` until `refresh_hits` runs — mirrors the `BundlesTruncated`
    /// → `refresh_hits` → `HitsTruncated` pair in `spec.md` §4.4's state
    /// machine, where a truncation of the result bundle only becomes the
    /// query's visible hit set on an explicit refresh.
    pending_bundle: Option<Bitvector>,
}

impl Query {
    pub fn new() -> Self {
        Query {
            state: QueryState::Uninitialised,
            select: None,
            rids: None,
            where_pred: None,
            lower: None,
            upper: None,
            hits: None,
            pending_bundle: None,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn set_select(&mut self, columns: Vec<String>) -> Result<()> {
        self.select = Some(columns);
        if self.state < QueryState::SelectSet {
            self.state = QueryState::SelectSet;
        }
        Ok(())
    }

    pub fn set_rids(&mut self, rids: Vec<RowId>) -> Result<()> {
        self.rids = Some(rids);
        if self.state < QueryState::RidsSet {
            self.state = QueryState::RidsSet;
        }
        Ok(())
    }

    pub fn set_where(&mut self, pred: Predicate) -> Result<()> {
        self.where_pred = Some(pred);
        self.lower = None;
        self.upper = None;
        self.hits = None;
        self.state = QueryState::WhereSet;
        Ok(())
    }

    /// Combines the `where` predicate with any `rids` restriction and
    /// marks the query ready to estimate or evaluate.
    pub fn specify(&mut self) -> Result<()> {
        if self.where_pred.is_none() && self.rids.is_none() {
            return Err(kind_err(Kind::InvalidState, "query has neither a where clause nor rids set"));
        }
        self.state = QueryState::Specified;
        Ok(())
    }

    fn specified_predicate(&self) -> Predicate {
        let base = self.where_pred.clone().unwrap_or(Predicate::RidIn { rids: Vec::new() });
        match &self.rids {
            Some(rids) if self.where_pred.is_some() => {
                Predicate::and(base, Predicate::RidIn { rids: rids.clone() })
            }
            Some(rids) => Predicate::RidIn { rids: rids.clone() },
            None => base,
        }
    }

    pub fn estimate<P: PartitionSource>(&mut self, eval: &Evaluator<'_, P>) -> Result<()> {
        self.require_state(QueryState::Specified)?;
        let pred = self.specified_predicate();
        let (lower, upper) = eval.estimate(&pred)?;
        self.lower = Some(lower);
        self.upper = Some(upper);
        self.state = QueryState::QuickEstimated;
        Ok(())
    }

    pub fn evaluate<P: PartitionSource>(&mut self, eval: &Evaluator<'_, P>) -> Result<()> {
        self.require_min_state(QueryState::Specified)?;
        let pred = self.specified_predicate();
        let hits = eval.evaluate(&pred)?;
        self.lower = Some(hits.clone());
        self.upper = Some(hits.clone());
        self.hits = Some(hits);
        self.state = QueryState::FullyEvaluated;
        Ok(())
    }

    /// Stages a restriction of the evaluated hit set to its first `limit`
    /// set bits, without yet touching `hits` — `spec.md` §4.4's
    /// `FullyEvaluated -- truncate(top-k) --> BundlesTruncated` edge.
    pub fn truncate(&mut self, limit: u32) -> Result<()> {
        self.require_min_state(QueryState::FullyEvaluated)?;
        let hits = self.hits.as_ref().expect("FullyEvaluated implies hits is set");
        let mut truncated = Bitvector::zeros(hits.size());
        let mut remaining = limit;
        'outer: for step in hits.first_index_set() {
            match step {
                bitindex_bitvec::Step::Range(a, b) => {
                    for pos in a..b {
                        if remaining == 0 {
                            break 'outer;
                        }
                        truncated.set_bit(pos, true)?;
                        remaining -= 1;
                    }
                }
                bitindex_bitvec::Step::Scatter(positions) => {
                    for pos in positions {
                        if remaining == 0 {
                            break 'outer;
                        }
                        truncated.set_bit(pos, true)?;
                        remaining -= 1;
                    }
                }
            }
        }
        self.pending_bundle = Some(truncated);
        self.state = QueryState::BundlesTruncated;
        Ok(())
    }

    /// Folds the bundle staged by `truncate` into the visible hit set —
    /// `spec.md` §4.4's `BundlesTruncated -- refresh_hits --> HitsTruncated`
    /// edge.
    pub fn refresh_hits(&mut self) -> Result<()> {
        self.require_state(QueryState::BundlesTruncated)?;
        let bundle = self.pending_bundle.take().expect("BundlesTruncated implies pending_bundle is set");
        self.lower = Some(bundle.clone());
        self.upper = Some(bundle.clone());
        self.hits = Some(bundle);
        self.state = QueryState::HitsTruncated;
        Ok(())
    }

    /// Convenience wrapper for callers that do not need to inspect the
    /// intermediate `BundlesTruncated` state: `truncate` then
    /// immediately `refresh_hits`.
    pub fn truncate_hits(&mut self, limit: u32) -> Result<()> {
        self.truncate(limit)?;
        self.refresh_hits()
    }

    pub fn lower(&self) -> Option<&Bitvector> {
        self.lower.as_ref()
    }
    pub fn upper(&self) -> Option<&Bitvector> {
        self.upper.as_ref()
    }
    pub fn hits(&self) -> Option<&Bitvector> {
        self.hits.as_ref()
    }

    pub fn clear(&mut self) {
        *self = Query::new();
    }

    fn require_state(&self, expected: QueryState) -> Result<()> {
        if self.state != expected {
            return Err(kind_err(
                Kind::InvalidState,
                format!("expected query state {:?}, found {:?}", expected, self.state),
            ));
        }
        Ok(())
    }

    fn require_min_state(&self, min: QueryState) -> Result<()> {
        if self.state < min {
            return Err(kind_err(
                Kind::InvalidState,
                format!("query must reach at least {:?}, found {:?}", min, self.state),
            ));
        }
        Ok(())
    }
}

impl Default for Query {
    fn default() -> Self {
        Query::new()
    }
}

impl QueryState {
    fn rank(&self) -> u8 {
        match self {
            QueryState::Uninitialised => 0,
            QueryState::SelectSet => 1,
            QueryState::RidsSet => 2,
            QueryState::WhereSet => 3,
            QueryState::Specified => 4,
            QueryState::QuickEstimated => 5,
            QueryState::FullyEvaluated => 6,
            QueryState::BundlesTruncated => 7,
            QueryState::HitsTruncated => 8,
        }
    }
}

impl PartialOrd for QueryState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}
