//! The Splice & Fixup Engine (§4.3): grafts a donor chunk into a recipient
//! slot in decision space, then re-runs the generator so that every
//! format-dependent field (lengths, offsets, checksums) downstream of the
//! splice is recomputed from its actual dependencies rather than copied
//! byte-for-byte.

use crate::chunk::{Chunk, DriftSign};
use crate::decision_stream::DecisionStream;
use crate::file_buffer::FileBuffer;
use crate::mode::{GetChunkRequest, InterpreterContext, SmartMutationWindow};
use crate::template::FormatTemplate;
use crate::utils::error::{FuzzError, Result};

/// The outcome of a successful splice: the regenerated file and the sign of
/// the drift observed across the spliced window (§8's drift-monotonicity
/// property).
pub struct SpliceResult {
    pub file: FileBuffer,
    pub drift: DriftSign,
}

/// A target slot to splice into: either an existing chunk being replaced or
/// deleted, or a zero-width insertion point.
#[derive(Debug, Clone, Copy)]
pub struct TargetSlot {
    pub start: usize,
    /// Exclusive-of-replace-width end; for a zero-width insertion point this
    /// equals `start - 1` (an empty range), matching §4.3's "Insert is
    /// Replace where `t` is a zero-width slot".
    pub end: Option<usize>,
    pub optional: bool,
}

impl TargetSlot {
    fn width(&self) -> usize {
        match self.end {
            Some(end) => end + 1 - self.start,
            None => 0,
        }
    }

    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self { start: chunk.start, end: Some(chunk.end), optional: chunk.optional }
    }

    pub fn insertion_point(pos: usize) -> Self {
        Self { start: pos, end: None, optional: true }
    }
}

fn validate_replace(target: &TargetSlot, donor: &Chunk) -> Result<()> {
    if target.optional != donor.optional {
        return Err(FuzzError::OptionalityMismatch {
            target_optional: target.optional,
            source_optional: donor.optional,
        });
    }
    Ok(())
}

/// Splices `donor`'s decision-space bytes (from `donor_stream`) into
/// `target`'s slot within `target_stream`, then re-runs `template` in
/// generate mode over the patched stream. Implements §4.3's Replace/Insert
/// procedure; `target_type` should be checked by the caller (see
/// `validate_non_optional_types`) before calling this for non-optional
/// replacements, since this function only checks optionality.
pub fn splice<T: FormatTemplate>(
    target_stream: &DecisionStream,
    target: TargetSlot,
    donor_stream: &DecisionStream,
    donor: &Chunk,
    file_index: usize,
    template: &mut T,
) -> Result<SpliceResult> {
    validate_replace(&target, donor)?;

    let donor_bytes = &donor_stream.as_slice()[donor.start..=donor.end];
    let target_width = target.width();
    let mut patched = target_stream.consumed_slice().to_vec();

    match target.end {
        Some(end) => {
            patched.splice(target.start..=end, donor_bytes.iter().copied());
        }
        None => {
            patched.splice(target.start..target.start, donor_bytes.iter().copied());
        }
    }
    debug_assert_eq!(
        patched.len(),
        target_stream.consumed() + donor_bytes.len() - target_width,
        "splice bounds: L' = L + (|s| - |t|)"
    );

    let rand_start = target.start;
    let rand_end = rand_start + donor_bytes.len().saturating_sub(1);

    let mut ctx = InterpreterContext::for_generate(DecisionStream::from_bytes(patched)?, file_index);
    ctx.request_smart_mutation(SmartMutationWindow {
        rand_start,
        rand_end,
        force_entry_optional: if target.end.is_none() { Some(true) } else { None },
    });
    let outcome = template.run(&mut ctx);
    if !outcome.is_success() {
        return Err(FuzzError::GenerationFailed);
    }
    let drift = ctx.finish_drift().unwrap_or(DriftSign::Exact);
    let (file, _) = ctx.into_generated();
    if file.is_empty() {
        return Err(FuzzError::GenerationFailed);
    }
    Ok(SpliceResult { file, drift })
}

/// Checks the non-optional-replace type rule: `t.type_tag == s.type_tag`
/// when neither side is optional. Kept separate from `splice` so callers
/// (the Mutation Planner, the CLI) can report the more specific
/// `TypeMismatch` error before attempting the splice.
pub fn validate_non_optional_types(target: &Chunk, donor: &Chunk) -> Result<()> {
    if !target.optional && !donor.optional && target.type_tag != donor.type_tag {
        return Err(FuzzError::TypeMismatch {
            target: target.type_tag.clone(),
            source: donor.type_tag.clone(),
        });
    }
    Ok(())
}

/// Deletes `target` from `target_stream` and regenerates. Requires
/// `target.optional && target.following_optional` (§4.3's delete
/// precondition); the caller is expected to have checked
/// `Chunk::is_deletable` already, but this function re-derives the same
/// check from the chunk's flags so it cannot be bypassed by a caller bug.
pub fn delete<T: FormatTemplate>(
    target_stream: &DecisionStream,
    target: &Chunk,
    file_index: usize,
    template: &mut T,
) -> Result<FileBuffer> {
    if !target.is_deletable() {
        return Err(FuzzError::NotDeletable {
            optional: target.optional,
            following_optional: target.following_optional,
        });
    }

    let mut patched = target_stream.consumed_slice().to_vec();
    patched.drain(target.start..=target.end);

    let mut ctx = InterpreterContext::for_generate(DecisionStream::from_bytes(patched)?, file_index);
    ctx.set_is_delete(true);
    let outcome = template.run(&mut ctx);
    if !outcome.is_success() {
        return Err(FuzzError::GenerationFailed);
    }
    let (file, _) = ctx.into_generated();
    if file.is_empty() {
        return Err(FuzzError::GenerationFailed);
    }
    Ok(file)
}

/// Locates a chunk's file-byte range request, parsing `input` with a
/// `get_chunk` request per §4.2 — shared by the CLI's `replace`/`delete`/
/// `insert` commands, which accept byte ranges in file space.
pub fn locate_by_file_range<T: FormatTemplate>(
    input: Vec<u8>,
    file_index: usize,
    file_start: usize,
    file_end: usize,
    template: &mut T,
) -> Result<(Chunk, DecisionStream)> {
    let mut ctx = InterpreterContext::for_parse(input, file_index);
    ctx.request_chunk(GetChunkRequest { file_start, file_end });
    let outcome = template.run(&mut ctx);
    if !outcome.is_success() {
        return Err(FuzzError::ParseFailure("parsing target file failed".into()));
    }
    let found = ctx
        .found_chunk()
        .cloned()
        .ok_or(FuzzError::ChunkNotFound { start: file_start, end: file_end })?;
    let (_, decisions) = ctx.into_generated();
    Ok((found, decisions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::InterpreterContext as Ctx;
    use crate::template::chunked::ChunkedContainer;

    fn generate_and_parse(decisions: Vec<u8>) -> (Vec<u8>, DecisionStream, Vec<Chunk>) {
        let mut gen_ctx = Ctx::for_generate(DecisionStream::from_bytes(decisions).unwrap(), 0);
        let mut tmpl = ChunkedContainer::new();
        assert!(tmpl.run(&mut gen_ctx).is_success());
        let (file, _) = gen_ctx.into_generated();
        let file_bytes = file.into_vec();

        let mut parse_ctx = Ctx::for_parse(file_bytes.clone(), 0);
        parse_ctx.request_all_chunks();
        let mut tmpl = ChunkedContainer::new();
        assert!(tmpl.run(&mut parse_ctx).is_success());
        let chunks = parse_ctx.chunks().to_vec();
        let (_, decisions) = parse_ctx.into_generated();
        (file_bytes, decisions, chunks)
    }

    #[test]
    fn replace_header_regenerates_with_new_values() {
        let (_t_file, t_decisions, t_chunks) =
            generate_and_parse(vec![1, 1, 1, 1, 1, 1, 1, 1, 0]);
        let (_s_file, s_decisions, s_chunks) =
            generate_and_parse(vec![9, 9, 9, 9, 9, 9, 9, 9, 0]);

        let t_header = t_chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();
        let s_header = s_chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();
        validate_non_optional_types(t_header, s_header).unwrap();

        let mut tmpl = ChunkedContainer::new();
        let result = splice(
            &t_decisions,
            TargetSlot::from_chunk(t_header),
            &s_decisions,
            s_header,
            0,
            &mut tmpl,
        )
        .unwrap();

        assert_eq!(result.drift, DriftSign::Exact);
        // Header bytes now come from the donor, magic/trailer recomputed.
        assert_eq!(&result.file.as_slice()[4..12], &[9u8; 8]);
    }

    #[test]
    fn insert_text_chunk_increases_length() {
        let (file, decisions, chunks) = generate_and_parse(vec![1, 1, 1, 1, 1, 1, 1, 1, 0]);
        let point = {
            let mut ctx = Ctx::for_parse(file.clone(), 0);
            ctx.request_all_chunks();
            let mut tmpl = ChunkedContainer::new();
            tmpl.run(&mut ctx);
            ctx.insertion_points()[0].clone()
        };
        let _ = chunks;

        let (_donor_file, donor_decisions, donor_chunks) =
            generate_and_parse(vec![2, 2, 2, 2, 2, 2, 2, 2, 1, 2, b'h', b'i', 0]);
        let donor_text = donor_chunks.iter().find(|c| c.type_tag == "tEXt").unwrap();

        let mut tmpl = ChunkedContainer::new();
        let result = splice(
            &decisions,
            TargetSlot::insertion_point(point.pos),
            &donor_decisions,
            donor_text,
            0,
            &mut tmpl,
        )
        .unwrap();

        assert_eq!(result.file.len(), file.len() + donor_text.decision_width());
    }

    #[test]
    fn delete_requires_deletable_flags() {
        let (_file, decisions, chunks) =
            generate_and_parse(vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 2, b'h', b'i', 0]);
        let header = chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();
        let mut tmpl = ChunkedContainer::new();
        let err = delete(&decisions, header, 0, &mut tmpl).unwrap_err();
        assert!(matches!(err, FuzzError::NotDeletable { .. }));
    }
}
