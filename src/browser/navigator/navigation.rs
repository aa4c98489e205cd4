//! Page navigation, load waiting, and script evaluation.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Command, PageCommand, RuntimeCommand};

use super::core::Navigator;

// ============================================================================
// Navigator - Navigation
// ============================================================================

impl Navigator {
    /// Sends `Page.enable` once per navigator.
    async fn ensure_page_events(&self) -> Result<()> {
        if self.page_enabled.load(Ordering::Acquire) {
            return Ok(());
        }

        self.ctx
            .session
            .send_command(Command::Page(PageCommand::Enable))
            .await?;
        self.page_enabled.store(true, Ordering::Release);
        Ok(())
    }

    /// Starts navigation to `url` without waiting for load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] carrying the browser's `errorText`
    /// when navigation is refused (bad scheme, DNS failure, ...).
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "Navigating");

        let result = self
            .ctx
            .session
            .send_command(Command::Page(PageCommand::Navigate {
                url: url.to_string(),
            }))
            .await?;

        if let Some(error_text) = result
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(Error::command_failed("Page.navigate", 0, error_text));
        }

        self.ctx.reset();
        Ok(())
    }

    /// Waits for the next `Page.loadEventFired`.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_loaded(&self, timeout: Duration) -> Result<bool> {
        self.ensure_page_events().await?;
        Ok(self
            .ctx
            .session
            .wait_for_event("Page.loadEventFired", timeout)
            .await?
            .is_some())
    }

    /// Navigates and waits for the resulting load event.
    ///
    /// The load subscription is registered before the navigation command is
    /// written, so a fast load cannot be missed. Returns `false` on timeout.
    ///
    /// # Errors
    ///
    /// A refused navigation fails as soon as `Page.navigate` answers.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<bool> {
        self.ensure_page_events().await?;

        let loaded = self
            .ctx
            .session
            .wait_for_event("Page.loadEventFired", timeout);
        let navigated = self.navigate(url);
        tokio::pin!(loaded, navigated);

        // `biased` polls the load wait first, which subscribes it.
        tokio::select! {
            biased;
            early = &mut loaded => {
                navigated.await?;
                Ok(early?.is_some())
            }
            result = &mut navigated => {
                result?;
                Ok(loaded.await?.is_some())
            }
        }
    }

    /// Evaluates `expression` in the page and returns its JSON value.
    ///
    /// Promises are awaited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScriptError`] if evaluation throws.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let mut result = self
            .ctx
            .session
            .send_command(Command::Runtime(RuntimeCommand::Evaluate {
                expression: expression.to_string(),
                return_by_value: true,
                await_promise: true,
            }))
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("uncaught exception");
            return Err(Error::script_error(message));
        }

        Ok(result
            .pointer_mut("/result/value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}
