//! # formatfuzzer
//!
//! A format-aware smart-mutation fuzzer driver. Given a [`template::FormatTemplate`]
//! describing how to parse/generate a binary file format, this crate:
//!
//! - generates valid or near-valid sample files from a stream of "decision
//!   bytes" ([`decision_stream`]),
//! - parses real files back into the decision stream that would have
//!   produced them, tracking named sub-structures as [`chunk::Chunk`]s,
//! - splices a donor chunk into a recipient slot in decision space and
//!   regenerates, so that format-dependent fields (lengths, checksums) are
//!   recomputed automatically rather than copied byte-for-byte
//!   ([`splice`]),
//! - selects such mutations uniformly among type-compatible candidates
//!   across a corpus ([`planner`]),
//! - and verifies the generate/parse/regenerate roundtrip law holds
//!   ([`roundtrip`]).
//!
//! The crate ships one reference template, [`template::chunked::ChunkedContainer`],
//! a simplified PNG/IFF-style chunked container used for tests and the
//! roundtrip harness. Real formats are meant to be supplied as additional
//! `FormatTemplate` implementations; the CLI in `src/bin/fuzzer.rs` wires
//! the reference template in by default.

pub mod chunk;
pub mod decision_stream;
pub mod file_buffer;
pub mod mode;
pub mod planner;
pub mod reachability;
pub mod roundtrip;
pub mod session;
pub mod splice;
pub mod template;

pub mod utils {
    pub mod error;
}

pub use chunk::{Chunk, DriftSign, InsertionPoint};
pub use decision_stream::DecisionStream;
pub use file_buffer::FileBuffer;
pub use mode::{InterpreterContext, Mode};
pub use session::Session;
pub use template::{FormatTemplate, TemplateOutcome};
pub use utils::error::{FuzzError, Result};

/// Generates a file from `decisions` using `template`, returning the
/// produced file bytes alongside the decision stream actually consumed.
pub fn generate<T: FormatTemplate>(
    decisions: Vec<u8>,
    template: &mut T,
) -> Result<(Vec<u8>, DecisionStream)> {
    let mut ctx = InterpreterContext::for_generate(DecisionStream::from_bytes(decisions)?, 0);
    let outcome = template.run(&mut ctx);
    if !outcome.is_success() {
        return Err(match outcome {
            TemplateOutcome::Failed(err) => err,
            _ => FuzzError::GenerationFailed,
        });
    }
    let (file, decisions) = ctx.into_generated();
    Ok((file.into_vec(), decisions))
}

/// Parses `input` with `template`, recording every named chunk. Returns the
/// recovered decision stream and the chunks/insertion points observed.
pub fn parse<T: FormatTemplate>(
    input: Vec<u8>,
    template: &mut T,
) -> Result<(DecisionStream, Vec<Chunk>, Vec<InsertionPoint>)> {
    let mut ctx = InterpreterContext::for_parse(input, 0);
    ctx.request_all_chunks();
    let outcome = template.run(&mut ctx);
    if !outcome.is_success() {
        return Err(match outcome {
            TemplateOutcome::Failed(err) => err,
            _ => FuzzError::ParseFailure("parse did not complete".into()),
        });
    }
    let chunks = ctx.chunks().to_vec();
    let insertion_points = ctx.insertion_points().to_vec();
    let (_, decisions) = ctx.into_generated();
    Ok((decisions, chunks, insertion_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use template::chunked::ChunkedContainer;

    #[test]
    fn generate_then_parse_recovers_a_usable_decision_stream() {
        let mut tmpl = ChunkedContainer::new();
        let (file, _) = generate(vec![1, 2, 3, 4, 5, 6, 7, 8, 0], &mut tmpl).unwrap();

        let mut tmpl = ChunkedContainer::new();
        let (decisions, chunks, _) = parse(file.clone(), &mut tmpl).unwrap();

        let mut tmpl = ChunkedContainer::new();
        let (regenerated, _) = generate(decisions.consumed_slice().to_vec(), &mut tmpl).unwrap();

        assert_eq!(file, regenerated);
        assert!(chunks.iter().any(|c| c.type_tag == "IHDR"));
    }
}
