//! Relative and directional queries from a node.
//!
//! Each query is an in-page function producing an ordered candidate list.
//! Single lookups (`parent`, `next`, `east`, ...) take a 1-based `nth` and
//! fetch that one candidate in one call. Plural lookups (`parents`, `nexts`,
//! ...) count the candidates first, then fetch them one index at a time, so
//! a single evaluation stays cheap regardless of result size.
//!
//! Both passes recompute the candidate list; a page that mutates between
//! them can return shifted or missing elements. The scan ends at the first
//! index that no longer resolves.

use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::CallArgument;

use crate::browser::locator::Locator;
use crate::browser::node::Node;
use crate::browser::scripts;

// ============================================================================
// Direction
// ============================================================================

/// Compass direction for nearest-neighbour queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Entirely to the right.
    East,
    /// Entirely to the left.
    West,
    /// Entirely above.
    North,
    /// Entirely below.
    South,
}

impl Direction {
    /// Returns the in-page key.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::East => "east",
            Self::West => "west",
            Self::North => "north",
            Self::South => "south",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Node - Query Plumbing
// ============================================================================

impl Node {
    fn query_args(locator: &Locator, direction: Option<Direction>) -> Vec<CallArgument> {
        vec![
            CallArgument::value(locator.kind().as_str()),
            CallArgument::value(locator.value()),
            CallArgument::value(direction.map_or(Value::Null, |d| Value::from(d.as_str()))),
        ]
    }

    /// Fetches the `nth` (1-based) candidate of a query body.
    async fn relative_one(
        &self,
        body: &str,
        locator: Locator,
        direction: Option<Direction>,
        nth: usize,
    ) -> Result<Option<Node>> {
        if nth == 0 {
            return Err(Error::invalid_argument("nth is 1-based"));
        }

        let mut args = Self::query_args(&locator, direction);
        args.push(CallArgument::value(nth - 1));

        trace!(node_id = %self.id(), locator = %locator, nth, "Relative lookup");
        self.call_for_node(&scripts::item_function(body), args).await
    }

    /// Fetches every candidate of a query body, count first.
    async fn relative_all(
        &self,
        body: &str,
        locator: Locator,
        direction: Option<Direction>,
    ) -> Result<Vec<Node>> {
        let count = self
            .call_function(
                &scripts::count_function(body),
                Self::query_args(&locator, direction),
            )
            .await?
            .as_u64()
            .unwrap_or(0);

        let item = scripts::item_function(body);
        let mut nodes = Vec::new();

        for index in 0..count {
            let mut args = Self::query_args(&locator, direction);
            args.push(CallArgument::value(index));
            // Past the end: the candidate list shrank since it was counted.
            let Some(node) = self.call_for_node(&item, args).await? else {
                break;
            };
            nodes.push(node);
        }

        trace!(node_id = %self.id(), locator = %locator, count, found = nodes.len(), "Relative scan");
        Ok(nodes)
    }
}

// ============================================================================
// Node - Ancestors & Children
// ============================================================================

impl Node {
    /// Returns the `nth` ancestor (1 = parent).
    pub async fn parent(&self, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::PARENTS, Locator::parse(""), None, nth)
            .await
    }

    /// Returns the `nth` ancestor matching `locator`.
    pub async fn parent_matching(
        &self,
        locator: impl Into<Locator>,
        nth: usize,
    ) -> Result<Option<Node>> {
        self.relative_one(scripts::PARENTS, locator.into(), None, nth)
            .await
    }

    /// Returns all ancestors matching `locator`, nearest first.
    pub async fn parents(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::PARENTS, locator.into(), None).await
    }

    /// Returns the `nth` element child matching `locator`.
    pub async fn child(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::CHILDREN, locator.into(), None, nth)
            .await
    }

    /// Returns the element children matching `locator`.
    pub async fn children(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::CHILDREN, locator.into(), None)
            .await
    }
}

// ============================================================================
// Node - Siblings
// ============================================================================

impl Node {
    /// Returns the `nth` following sibling matching `locator`.
    pub async fn next(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::NEXTS, locator.into(), None, nth)
            .await
    }

    /// Returns the following siblings matching `locator`, nearest first.
    pub async fn nexts(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::NEXTS, locator.into(), None).await
    }

    /// Returns the `nth` preceding sibling matching `locator`.
    pub async fn prev(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::PREVS, locator.into(), None, nth)
            .await
    }

    /// Returns the preceding siblings matching `locator`, nearest first.
    pub async fn prevs(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::PREVS, locator.into(), None).await
    }
}

// ============================================================================
// Node - Document Order
// ============================================================================

impl Node {
    /// Returns the `nth` match after this node in document order.
    ///
    /// Descendants of this node are not "after" it.
    pub async fn after(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::AFTERS, locator.into(), None, nth)
            .await
    }

    /// Returns every match after this node in document order.
    pub async fn afters(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::AFTERS, locator.into(), None).await
    }

    /// Returns the `nth` match before this node, nearest first.
    ///
    /// Ancestors of this node are not "before" it.
    pub async fn before(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.relative_one(scripts::BEFORES, locator.into(), None, nth)
            .await
    }

    /// Returns every match before this node, nearest first.
    pub async fn befores(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        self.relative_all(scripts::BEFORES, locator.into(), None)
            .await
    }
}

// ============================================================================
// Node - Compass
// ============================================================================

impl Node {
    /// Returns the `nth` nearest match lying entirely in `direction`.
    ///
    /// Distance is between bounding-box centres; ties keep document order.
    pub async fn nearest(
        &self,
        direction: Direction,
        locator: impl Into<Locator>,
        nth: usize,
    ) -> Result<Option<Node>> {
        self.relative_one(scripts::DIRECTIONAL, locator.into(), Some(direction), nth)
            .await
    }

    /// Returns every match lying entirely in `direction`, nearest first.
    pub async fn all_towards(
        &self,
        direction: Direction,
        locator: impl Into<Locator>,
    ) -> Result<Vec<Node>> {
        self.relative_all(scripts::DIRECTIONAL, locator.into(), Some(direction))
            .await
    }

    /// Nearest match to the right.
    pub async fn east(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.nearest(Direction::East, locator, nth).await
    }

    /// Nearest match to the left.
    pub async fn west(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.nearest(Direction::West, locator, nth).await
    }

    /// Nearest match above.
    pub async fn north(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.nearest(Direction::North, locator, nth).await
    }

    /// Nearest match below.
    pub async fn south(&self, locator: impl Into<Locator>, nth: usize) -> Result<Option<Node>> {
        self.nearest(Direction::South, locator, nth).await
    }
}

// ============================================================================
// Tests
// ============================================================================
