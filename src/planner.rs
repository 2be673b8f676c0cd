//! The Mutation Planner (§4.4): given a `Session`'s registries, selects one
//! of four mutation operations uniformly at random and invokes the Splice &
//! Fixup Engine. The planner's loop is oblivious to format semantics — it
//! only reasons about optionality/type tags and the registries built by
//! `Session::build`.

use crate::chunk::DriftSign;
use crate::file_buffer::FileBuffer;
use crate::session::Session;
use crate::splice::{self, TargetSlot};
use crate::template::FormatTemplate;
use crate::utils::error::{FuzzError, Result};
use rand::Rng;

/// Which of the four cases in §4.4's table a mutation came from; surfaced so
/// callers (e.g. the `mutations` CLI command) can log which kind of graft
/// produced a given output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Case 0: non-optional replace, donor matched by type tag.
    NonOptionalReplace,
    /// Case 1: optional replace.
    OptionalReplace,
    /// Case 2: insert at an insertion point.
    Insert,
    /// Case 3: delete a deletable chunk.
    Delete,
}

pub struct MutationOutcome {
    pub kind: MutationKind,
    pub file: FileBuffer,
    pub drift: Option<DriftSign>,
}

/// Runs one random smart mutation against file `target_index` in `session`,
/// choosing uniformly among the four cases in §4.4's table (skipping
/// delete when the target file has no deletable chunks, as the original
/// does). `template` is re-run fresh for each splice since
/// `InterpreterContext` borrows it for exactly one call.
pub fn one_smart_mutation<T: FormatTemplate>(
    session: &Session,
    target_index: usize,
    template_factory: impl Fn() -> T,
    rng: &mut impl Rng,
) -> Result<MutationOutcome> {
    let target_file = session
        .files
        .get(target_index)
        .ok_or_else(|| FuzzError::Usage(format!("no such file index {target_index}")))?;

    let deletable: Vec<_> = target_file.deletable_chunks().cloned().collect();
    let case_count = if deletable.is_empty() { 3 } else { 4 };
    let case = rng.gen_range(0..case_count);

    match case {
        0 => {
            let recipients: Vec<_> = target_file.non_optional_chunks().cloned().collect();
            if recipients.is_empty() {
                return Err(FuzzError::GenerationFailed);
            }
            let recipient = &recipients[rng.gen_range(0..recipients.len())];
            let donors = session
                .non_optional_by_type
                .get(&recipient.type_tag)
                .ok_or(FuzzError::GenerationFailed)?;
            let donor = &donors[rng.gen_range(0..donors.len())];

            let mut template = template_factory();
            let result = splice::splice(
                &target_file.decisions,
                TargetSlot::from_chunk(recipient),
                &session.files[donor.file_index].decisions,
                donor,
                target_file.file_index,
                &mut template,
            )?;
            Ok(MutationOutcome {
                kind: MutationKind::NonOptionalReplace,
                file: result.file,
                drift: Some(result.drift),
            })
        }
        1 => {
            let recipients: Vec<_> = target_file.optional_chunks().cloned().collect();
            if recipients.is_empty() || session.optional_chunks.is_empty() {
                return Err(FuzzError::GenerationFailed);
            }
            let recipient = &recipients[rng.gen_range(0..recipients.len())];
            let donor = &session.optional_chunks[rng.gen_range(0..session.optional_chunks.len())];

            let mut template = template_factory();
            let result = splice::splice(
                &target_file.decisions,
                TargetSlot::from_chunk(recipient),
                &session.files[donor.file_index].decisions,
                donor,
                target_file.file_index,
                &mut template,
            )?;
            Ok(MutationOutcome {
                kind: MutationKind::OptionalReplace,
                file: result.file,
                drift: Some(result.drift),
            })
        }
        2 => {
            if target_file.insertion_points.is_empty() || session.optional_chunks.is_empty() {
                return Err(FuzzError::GenerationFailed);
            }
            let point = &target_file.insertion_points[rng.gen_range(0..target_file.insertion_points.len())];
            let donor = &session.optional_chunks[rng.gen_range(0..session.optional_chunks.len())];

            let mut template = template_factory();
            let result = splice::splice(
                &target_file.decisions,
                TargetSlot::insertion_point(point.pos),
                &session.files[donor.file_index].decisions,
                donor,
                target_file.file_index,
                &mut template,
            )?;
            Ok(MutationOutcome {
                kind: MutationKind::Insert,
                file: result.file,
                drift: Some(result.drift),
            })
        }
        _ => {
            let target = &deletable[rng.gen_range(0..deletable.len())];
            let mut template = template_factory();
            let file = splice::delete(&target_file.decisions, target, target_file.file_index, &mut template)?;
            Ok(MutationOutcome { kind: MutationKind::Delete, file, drift: None })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::chunked::ChunkedContainer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample(decisions: Vec<u8>) -> Vec<u8> {
        let mut ctx = crate::mode::InterpreterContext::for_generate(
            crate::decision_stream::DecisionStream::from_bytes(decisions).unwrap(),
            0,
        );
        let mut tmpl = ChunkedContainer::new();
        tmpl.run(&mut ctx);
        ctx.into_generated().0.into_vec()
    }

    #[test]
    fn planner_runs_many_mutations_without_panicking() {
        let files = vec![
            sample(vec![1, 2, 3, 4, 5, 6, 7, 8, 1, 2, b'h', b'i', 1, 1, b'z', 0]),
            sample(vec![9, 9, 9, 9, 9, 9, 9, 9, 1, 1, b'y', 0]),
            sample(vec![5, 5, 5, 5, 5, 5, 5, 5, 0]),
        ];
        let session = Session::build(&files, ChunkedContainer::new).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut attempts = 0;
        let mut successes = 0;
        for _ in 0..200 {
            attempts += 1;
            let target = rng.gen_range(0..session.files.len());
            if one_smart_mutation(&session, target, ChunkedContainer::new, &mut rng).is_ok() {
                successes += 1;
            }
        }
        assert_eq!(attempts, 200);
        assert!(successes > 0);
    }
}
