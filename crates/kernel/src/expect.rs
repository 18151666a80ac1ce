// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expect-style pattern waiting over a pane's screen buffer.
//!
//! A poll loop reads the tail of the screen and scans an ordered pattern
//! list; the first pattern (by list index) that matches wins. A timeout
//! sentinel in the list converts deadline expiry into a normal result
//! instead of an error.

use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::TerminalBackend;
use crate::error::{OrchestratorError, Result};

/// Default deadline for an expect call.
pub const DEFAULT_EXPECT_TIMEOUT: f64 = 30.0;

/// One entry in an expect pattern list.
#[derive(Debug, Clone)]
pub enum ExpectPattern {
    /// A plain substring matcher.
    Literal(String),
    /// A compiled regex with its original source kept for reporting.
    Pattern { source: String, regex: Regex },
    /// Sentinel: deadline expiry matches this entry instead of erroring.
    Timeout(f64),
}

impl ExpectPattern {
    /// Compile a string as a regex pattern.
    pub fn pattern(source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|e| {
            OrchestratorError::invalid_args(format!("invalid regex '{source}': {e}"))
        })?;
        Ok(Self::Pattern { source: source.to_owned(), regex })
    }

    /// Treat a string as a literal substring.
    pub fn literal(text: &str) -> Self {
        Self::Literal(text.to_owned())
    }

    pub fn timeout(seconds: f64) -> Self {
        Self::Timeout(seconds)
    }

    /// The pattern source or the sentinel duration, for error reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::Pattern { source, .. } => source.clone(),
            Self::Timeout(seconds) => format!("timeout({seconds}s)"),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Tunables for one expect call.
#[derive(Debug, Clone)]
pub struct ExpectOptions {
    /// Overall deadline in seconds.
    pub timeout: f64,
    /// Delay between screen reads.
    pub poll_interval: Duration,
    /// How many trailing screen lines each poll reads.
    pub search_window_lines: usize,
}

impl Default for ExpectOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXPECT_TIMEOUT,
            poll_interval: Duration::from_millis(100),
            search_window_lines: 200,
        }
    }
}

/// What matched and where.
#[derive(Debug, Clone)]
pub struct ExpectResult {
    pub matched_pattern: ExpectPattern,
    pub match_index: usize,
    /// The full screen read that produced the match.
    pub output: String,
    pub matched_text: String,
    /// Output up to the start of the match.
    pub before: String,
    /// Capture groups for regex patterns with groups.
    pub groups: Option<Vec<Option<String>>>,
}

impl ExpectResult {
    pub fn timed_out(&self) -> bool {
        self.matched_pattern.is_timeout()
    }
}

fn validate(patterns: &[ExpectPattern]) -> Result<()> {
    if patterns.is_empty() {
        return Err(OrchestratorError::invalid_args("patterns list must not be empty"));
    }
    if patterns.iter().all(ExpectPattern::is_timeout) {
        return Err(OrchestratorError::invalid_args(
            "patterns must include at least one regex pattern",
        ));
    }
    if patterns.iter().filter(|p| p.is_timeout()).count() > 1 {
        return Err(OrchestratorError::invalid_args(
            "patterns may include at most one timeout sentinel",
        ));
    }
    Ok(())
}

fn scan(patterns: &[ExpectPattern], output: &str) -> Option<ExpectResult> {
    for (index, pattern) in patterns.iter().enumerate() {
        match pattern {
            ExpectPattern::Timeout(_) => continue,
            ExpectPattern::Literal(text) => {
                if let Some(start) = output.find(text.as_str()) {
                    return Some(ExpectResult {
                        matched_pattern: pattern.clone(),
                        match_index: index,
                        output: output.to_owned(),
                        matched_text: text.clone(),
                        before: output[..start].to_owned(),
                        groups: None,
                    });
                }
            }
            ExpectPattern::Pattern { regex, .. } => {
                if let Some(found) = regex.captures(output) {
                    let whole = found.get(0)?;
                    let groups = if found.len() > 1 {
                        Some(
                            (1..found.len())
                                .map(|i| found.get(i).map(|m| m.as_str().to_owned()))
                                .collect(),
                        )
                    } else {
                        None
                    };
                    return Some(ExpectResult {
                        matched_pattern: pattern.clone(),
                        match_index: index,
                        output: output.to_owned(),
                        matched_text: whole.as_str().to_owned(),
                        before: output[..whole.start()].to_owned(),
                        groups,
                    });
                }
            }
        }
    }
    None
}

/// Wait for the first matching pattern in the pane's screen tail.
///
/// Cancellation is observed at every poll boundary. Without a timeout
/// sentinel, deadline expiry raises [`OrchestratorError::Timeout`]
/// carrying the final screen read.
pub async fn expect(
    backend: &dyn TerminalBackend,
    pane_id: &str,
    patterns: &[ExpectPattern],
    options: &ExpectOptions,
    cancel: &CancellationToken,
) -> Result<ExpectResult> {
    validate(patterns)?;

    let sentinel = patterns.iter().enumerate().find(|(_, p)| p.is_timeout());
    let effective_timeout = match sentinel {
        Some((_, ExpectPattern::Timeout(seconds))) => options.timeout.min(*seconds),
        _ => options.timeout,
    };
    let deadline = Instant::now() + Duration::from_secs_f64(effective_timeout.max(0.0));

    let mut last_output = String::new();
    loop {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        last_output = backend.read_screen(pane_id, Some(options.search_window_lines)).await?;
        if let Some(result) = scan(patterns, &last_output) {
            debug!(match_index = result.match_index, "expect matched");
            return Ok(result);
        }

        if Instant::now() >= deadline {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(options.poll_interval) => {}
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
        }
    }

    if let Some((index, pattern)) = sentinel {
        return Ok(ExpectResult {
            matched_pattern: pattern.clone(),
            match_index: index,
            output: last_output,
            matched_text: String::new(),
            before: String::new(),
            groups: None,
        });
    }

    Err(OrchestratorError::Timeout {
        seconds: effective_timeout,
        patterns: patterns.iter().map(ExpectPattern::describe).collect(),
        output: last_output,
    })
}

/// Default shell prompt patterns used by [`wait_for_prompt`].
pub fn default_prompt_patterns() -> Vec<ExpectPattern> {
    [r"\$\s*$", r">\s*$", r"%\s*$", r"#\s*$"]
        .iter()
        .filter_map(|source| ExpectPattern::pattern(source).ok())
        .collect()
}

/// Wait for a shell prompt; `false` on timeout instead of an error.
pub async fn wait_for_prompt(
    backend: &dyn TerminalBackend,
    pane_id: &str,
    prompt_patterns: Vec<ExpectPattern>,
    timeout: f64,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut patterns = if prompt_patterns.is_empty() {
        default_prompt_patterns()
    } else {
        prompt_patterns
    };
    patterns.push(ExpectPattern::timeout(timeout));

    let options = ExpectOptions { timeout, ..ExpectOptions::default() };
    let result = expect(backend, pane_id, &patterns, &options, cancel).await?;
    Ok(!result.timed_out())
}

/// Wait for either a success or an error pattern.
///
/// Returns `(is_success, result)` where `is_success` reflects whether the
/// matched index fell inside the success list.
pub async fn wait_for_patterns(
    backend: &dyn TerminalBackend,
    pane_id: &str,
    success: Vec<ExpectPattern>,
    error: Vec<ExpectPattern>,
    timeout: f64,
    cancel: &CancellationToken,
) -> Result<(bool, ExpectResult)> {
    let success_len = success.len();
    let mut patterns = success;
    patterns.extend(error);

    let options = ExpectOptions { timeout, ..ExpectOptions::default() };
    let result = expect(backend, pane_id, &patterns, &options, cancel).await?;
    let is_success = result.match_index < success_len;
    Ok((is_success, result))
}

/// Send text to the pane, then expect over the resulting output.
pub async fn send_and_expect(
    backend: &dyn TerminalBackend,
    pane_id: &str,
    text: &str,
    patterns: &[ExpectPattern],
    options: &ExpectOptions,
    cancel: &CancellationToken,
) -> Result<ExpectResult> {
    backend.send_text(pane_id, text, true).await?;
    expect(backend, pane_id, patterns, options, cancel).await
}

#[cfg(test)]
#[path = "expect_tests.rs"]
mod tests;
