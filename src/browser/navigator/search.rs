//! Locator lookups at document and node scope.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::NodeId;
use crate::protocol::{CallArgument, Command, DomCommand};

use crate::browser::locator::{Locator, LocatorKind};
use crate::browser::node::{DomContext, Node};
use crate::browser::scripts;
use crate::browser::wait::poll_until;

use super::core::Navigator;

// ============================================================================
// Shared
// ============================================================================

/// Raw `nodeIds` array of a query result.
fn node_ids(result: &Value) -> &[Value] {
    result
        .get("nodeIds")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Converts a `nodeIds` array to handles, dropping the zero sentinel.
fn nodes_from_ids(ctx: &Arc<DomContext>, ids: &[Value]) -> Vec<Node> {
    ids.iter()
        .filter_map(Value::as_i64)
        .filter_map(NodeId::new)
        .map(|id| Node::new(Arc::clone(ctx), id))
        .collect()
}

async fn query_selector_all(ctx: &Arc<DomContext>, scope: NodeId, selector: &str) -> Result<Vec<Node>> {
    let result = ctx
        .session
        .send_command(Command::Dom(DomCommand::QuerySelectorAll {
            node_id: scope,
            selector: selector.to_string(),
        }))
        .await?;

    Ok(nodes_from_ids(ctx, node_ids(&result)))
}

/// Makes an absolute path expression relative to the context node.
fn relative_xpath(expression: &str) -> String {
    if let Some(rest) = expression.strip_prefix("(/") {
        format!("(./{rest}")
    } else if expression.starts_with('/') {
        format!(".{expression}")
    } else {
        expression.to_string()
    }
}

// ============================================================================
// Navigator - Document Scope
// ============================================================================

impl Navigator {
    /// Returns every node matching `locator`, in protocol order.
    ///
    /// # Errors
    ///
    /// Propagates transport failures and protocol errors (e.g. a selector the
    /// browser rejects).
    pub async fn find_all(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        let locator = locator.into();
        trace!(locator = %locator, "Document search");

        match locator.kind() {
            LocatorKind::Css => self.css_all(locator.value()).await,
            LocatorKind::XPath => self.xpath_all(locator.value()).await,
        }
    }

    /// Returns the first node matching `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] when nothing matches.
    pub async fn find(&self, locator: impl Into<Locator>) -> Result<Node> {
        let locator = locator.into();
        self.find_all(&locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::element_not_found(locator.raw()))
    }

    /// Returns the first node matching `locator`, or `None`.
    pub async fn find_opt(&self, locator: impl Into<Locator>) -> Result<Option<Node>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// Polls until a node matches `locator`.
    ///
    /// Returns `None` on timeout. Not-found errors while polling count as
    /// "not yet"; a query the browser rejects fails immediately.
    pub async fn wait_for(
        &self,
        locator: impl Into<Locator>,
        timeout: Duration,
    ) -> Result<Option<Node>> {
        let locator = locator.into();
        let interval = self.ctx.session.options().poll_interval;
        debug!(locator = %locator, timeout_ms = timeout.as_millis() as u64, "Waiting for node");

        let locator = &locator;
        poll_until(interval, timeout, move || async move {
            match self.find_opt(locator).await {
                Ok(found) => Ok(found),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn css_all(&self, selector: &str) -> Result<Vec<Node>> {
        let root = self.ctx.root().await?;

        match query_selector_all(&self.ctx, root, selector).await {
            // The cached root may belong to a replaced document.
            Err(e) if e.is_command_failure() => {
                debug!(error = %e, "Query against cached root failed, refetching root");
                self.ctx.reset();
                let root = self.ctx.root().await?;
                query_selector_all(&self.ctx, root, selector).await
            }
            other => other,
        }
    }

    async fn xpath_all(&self, expression: &str) -> Result<Vec<Node>> {
        // performSearch requires the document to have been requested.
        self.ctx.root().await?;

        let result = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::PerformSearch {
                query: expression.to_string(),
                include_user_agent_shadow_dom: false,
            }))
            .await?;

        let search_id = result
            .get("searchId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("DOM.performSearch returned no searchId"))?
            .to_string();
        let count = result
            .get("resultCount")
            .and_then(Value::as_u64)
            .map_or(0, |count| usize::try_from(count).unwrap_or(usize::MAX));

        let nodes = self.collect_search(&search_id, count).await;

        // Best-effort release of the search handle.
        if let Err(e) = self
            .ctx
            .session
            .send_command(Command::Dom(DomCommand::DiscardSearchResults {
                search_id: search_id.clone(),
            }))
            .await
        {
            trace!(%search_id, error = %e, "discardSearchResults failed");
        }

        nodes
    }

    /// Pages through a search result set.
    ///
    /// `count` is the browser's claim; paging also stops at the first empty
    /// page.
    async fn collect_search(&self, search_id: &str, count: usize) -> Result<Vec<Node>> {
        let page = self.ctx.session.options().search_page_size;
        let mut nodes = Vec::new();
        let mut from = 0;

        while from < count {
            let to = from.saturating_add(page).min(count);
            let result = self
                .ctx
                .session
                .send_command(Command::Dom(DomCommand::GetSearchResults {
                    search_id: search_id.to_string(),
                    from_index: from,
                    to_index: to,
                }))
                .await?;

            let ids = node_ids(&result);
            if ids.is_empty() {
                break;
            }
            nodes.extend(nodes_from_ids(&self.ctx, ids));
            from = to;
        }

        Ok(nodes)
    }
}

// ============================================================================
// Node - Scoped Search
// ============================================================================

impl Node {
    /// Returns every descendant matching `locator`.
    ///
    /// Path locators are evaluated with this node as context; a leading `/`
    /// is made relative (`//a` searches below this node).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleNode`] if this node is gone.
    pub async fn find_all(&self, locator: impl Into<Locator>) -> Result<Vec<Node>> {
        let locator = locator.into();

        match locator.kind() {
            LocatorKind::Css => query_selector_all(&self.ctx, self.id(), locator.value())
                .await
                .map_err(|e| {
                    if e.is_command_failure() {
                        self.invalidate();
                        Error::stale_node(self.id())
                    } else {
                        e
                    }
                }),
            LocatorKind::XPath => self.xpath_all(&relative_xpath(locator.value())).await,
        }
    }

    /// Returns the first descendant matching `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementNotFound`] when nothing matches.
    pub async fn find(&self, locator: impl Into<Locator>) -> Result<Node> {
        let locator = locator.into();
        self.find_all(&locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::element_not_found(locator.raw()))
    }

    /// Returns the first descendant matching `locator`, or `None`.
    pub async fn find_opt(&self, locator: impl Into<Locator>) -> Result<Option<Node>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    async fn xpath_all(&self, expression: &str) -> Result<Vec<Node>> {
        let count = self
            .call_function(
                scripts::XPATH_COUNT,
                vec![CallArgument::value(expression)],
            )
            .await?
            .as_u64()
            .unwrap_or(0);

        let mut nodes = Vec::new();
        for index in 0..count {
            let item = self
                .call_for_node(
                    scripts::XPATH_ITEM,
                    vec![CallArgument::value(expression), CallArgument::value(index)],
                )
                .await?;
            // The snapshot shrank since it was counted.
            let Some(node) = item else { break };
            nodes.push(node);
        }

        Ok(nodes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_xpath() {
        assert_eq!(relative_xpath("//a"), ".//a");
        assert_eq!(relative_xpath("/html/body"), "./html/body");
        assert_eq!(relative_xpath("(//li)[2]"), "(.//li)[2]");
        assert_eq!(relative_xpath("./span"), "./span");
        assert_eq!(relative_xpath("span"), "span");
    }
}
