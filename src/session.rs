//! `Session`: the corpus-wide registries the distilled spec keeps as process
//! globals (`optional_chunks`, `non_optional_chunks`, `rand_names`, ...),
//! bundled here into an explicit, ownable struct instead.
//!
//! A `Session` is built by parsing a corpus of files with `get_all_chunks`
//! set; the resulting registries drive the Mutation Planner (§4.4) and the
//! `mutations`/`replace`/`insert`/`delete` CLI commands.

use crate::chunk::{Chunk, InsertionPoint};
use crate::decision_stream::DecisionStream;
use crate::mode::InterpreterContext;
use crate::template::FormatTemplate;
use crate::utils::error::{FuzzError, Result};
use std::collections::HashMap;

/// One corpus member: its recovered decision stream alongside the chunks and
/// insertion points the parse observed in it.
pub struct ParsedFile {
    pub file_index: usize,
    pub decisions: DecisionStream,
    pub chunks: Vec<Chunk>,
    pub insertion_points: Vec<InsertionPoint>,
}

impl ParsedFile {
    /// Chunks in this file that are eligible for deletion (§4.2).
    pub fn deletable_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.is_deletable())
    }

    pub fn optional_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.optional)
    }

    pub fn non_optional_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| !c.optional)
    }
}

/// The corpus-wide registries built by parsing every file in a corpus with
/// `get_all_chunks`. Each mutation operation (§4.4) reads from `donors` (the
/// whole-corpus pools) and from one `ParsedFile`'s per-file views.
#[derive(Default)]
pub struct Session {
    pub files: Vec<ParsedFile>,
    /// Every optional chunk across the whole corpus, in parse order.
    pub optional_chunks: Vec<Chunk>,
    /// Non-optional chunks across the whole corpus, indexed by type tag.
    pub non_optional_by_type: HashMap<String, Vec<Chunk>>,
    /// `variable_types[name] == type_tag` for every chunk observed anywhere
    /// in the corpus — used to reject ill-typed replacements before they
    /// reach the splice engine.
    pub variable_types: HashMap<String, String>,
}

impl Session {
    /// Parses every file in `inputs` with `get_all_chunks`, building the
    /// corpus-wide registries. `template` is cloned-by-construction per file
    /// via the supplied factory, since `InterpreterContext` borrows it for
    /// exactly one run.
    pub fn build<T: FormatTemplate>(
        inputs: &[Vec<u8>],
        mut template_factory: impl FnMut() -> T,
    ) -> Result<Self> {
        let mut session = Session::default();
        for (file_index, input) in inputs.iter().enumerate() {
            let mut ctx = InterpreterContext::for_parse(input.clone(), file_index);
            ctx.request_all_chunks();
            let mut template = template_factory();
            let outcome = template.run(&mut ctx);
            if !outcome.is_success() {
                return Err(FuzzError::ParseFailure(format!(
                    "file {file_index} failed to parse while building session"
                )));
            }

            for chunk in ctx.chunks() {
                session
                    .variable_types
                    .insert(chunk.name.clone(), chunk.type_tag.clone());
                if chunk.optional {
                    session.optional_chunks.push(chunk.clone());
                } else {
                    session
                        .non_optional_by_type
                        .entry(chunk.type_tag.clone())
                        .or_default()
                        .push(chunk.clone());
                }
            }

            let insertion_points = ctx.insertion_points().to_vec();
            let chunks = ctx.chunks().to_vec();
            let (_, decisions) = ctx.into_generated();
            session.files.push(ParsedFile {
                file_index,
                decisions,
                chunks,
                insertion_points,
            });
        }
        Ok(session)
    }

    /// Locates a single chunk by its file-byte range (the CLI's
    /// `get_chunk` entry point), by re-running the parser with a
    /// `get_chunk` request rather than scanning an already-built registry —
    /// mirrors the original's one-shot `get_chunk` parse.
    pub fn locate_chunk<T: FormatTemplate>(
        input: &[u8],
        file_index: usize,
        file_start: usize,
        file_end: usize,
        template: &mut T,
    ) -> Result<Chunk> {
        let mut ctx = InterpreterContext::for_parse(input.to_vec(), file_index);
        ctx.request_chunk(crate::mode::GetChunkRequest { file_start, file_end });
        let outcome = template.run(&mut ctx);
        if !outcome.is_success() {
            return Err(FuzzError::ParseFailure(format!(
                "file {file_index} failed to parse while locating chunk"
            )));
        }
        ctx.found_chunk()
            .cloned()
            .ok_or(FuzzError::ChunkNotFound { start: file_start, end: file_end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::chunked::ChunkedContainer;
    use crate::mode::InterpreterContext as Ctx;

    fn sample(decisions: Vec<u8>) -> Vec<u8> {
        let mut ctx = Ctx::for_generate(DecisionStream::from_bytes(decisions).unwrap(), 0);
        let mut tmpl = ChunkedContainer::new();
        tmpl.run(&mut ctx);
        ctx.into_generated().0.into_vec()
    }

    #[test]
    fn build_indexes_corpus_wide_chunks() {
        let files = vec![
            sample(vec![1, 2, 3, 4, 5, 6, 7, 8, 1, 2, b'h', b'i', 0]),
            sample(vec![9, 9, 9, 9, 9, 9, 9, 9, 0]),
        ];
        let session = Session::build(&files, ChunkedContainer::new).unwrap();
        assert_eq!(session.files.len(), 2);
        assert!(session.non_optional_by_type.contains_key("IHDR"));
        assert!(session.non_optional_by_type.contains_key("IEND"));
        assert_eq!(session.optional_chunks.len(), 1);
        assert_eq!(session.variable_types["header"], "IHDR");
    }
}
