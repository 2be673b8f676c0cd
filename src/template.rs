//! The `FormatTemplate` trait: this crate's stand-in for "the per-format
//! template" the distilled design treats as an external, pluggable black box.
//!
//! A template is driven once per generate/parse invocation through an
//! [`InterpreterContext`] it borrows for the duration of the call; the
//! template itself never branches on [`Mode`](crate::mode::Mode) — all
//! mode-dependent behavior lives in the context's helper methods.

use crate::mode::InterpreterContext;
use crate::utils::error::FuzzError;

/// How a template run terminated.
///
/// Mirrors the three ways the original C++ interpreter could leave
/// `generate_file()`: falling off the end normally, throwing an `int` status,
/// or throwing something else entirely. Represented here as a plain enum
/// returned by value rather than caught exceptions, so teardown of whatever
/// the template borrowed happens via ordinary `Drop` on the way out.
#[derive(Debug)]
pub enum TemplateOutcome {
    /// The template consumed/produced its stream to completion.
    Ok,
    /// The template signalled completion with an explicit status code.
    /// Zero is treated as success by callers, matching the original's
    /// `catch (int status) { if (status == 0) success = true; }`.
    Aborted(i32),
    /// The template hit a condition it cannot recover from.
    Failed(FuzzError),
}

impl TemplateOutcome {
    /// True iff the run should be treated as a successful generate/parse.
    pub fn is_success(&self) -> bool {
        matches!(self, TemplateOutcome::Ok | TemplateOutcome::Aborted(0))
    }
}

/// The per-format interpreter contract (§4.1).
///
/// Implementations describe how to parse/generate one file format by calling
/// back into `ctx`'s helpers (`raw_byte`, `probe_continue`, `enter_chunk`,
/// `exit_chunk`, `emit_derived`, ...). The same `run` body serves both
/// directions: `ctx.mode()` determines whether a given helper reads from the
/// decision stream or the input file.
pub trait FormatTemplate {
    fn run(&mut self, ctx: &mut InterpreterContext) -> TemplateOutcome;

    /// The non-terminal reachability graph for this template, used by
    /// [`crate::reachability::k_paths`]. Templates that don't care about
    /// k-paths can leave this at the default empty graph.
    fn reachability_graph(&self) -> std::collections::HashMap<String, Vec<String>> {
        std::collections::HashMap::new()
    }
}

pub mod chunked;
