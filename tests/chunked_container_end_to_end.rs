//! End-to-end scenarios adapted from §8, exercised against the reference
//! chunked-container template in place of a production PNG decoder.

use formatfuzzer::planner::{self, MutationKind};
use formatfuzzer::session::Session;
use formatfuzzer::splice::{self, TargetSlot};
use formatfuzzer::template::chunked::ChunkedContainer;
use formatfuzzer::utils::error::FuzzError;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn generate(decisions: Vec<u8>) -> Vec<u8> {
    let mut template = ChunkedContainer::new();
    formatfuzzer::generate(decisions, &mut template).unwrap().0
}

fn parse_chunks(file: Vec<u8>) -> Vec<formatfuzzer::Chunk> {
    let mut template = ChunkedContainer::new();
    formatfuzzer::parse(file, &mut template).unwrap().1
}

#[test]
fn scenario_1_every_generated_file_roundtrips() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut ok = 0;
    for _ in 0..1000 {
        let mut tape = vec![0u8; 32];
        rand::RngCore::fill_bytes(&mut rng, &mut tape);
        let mut gen_template = ChunkedContainer::new();
        let Ok((file, _)) = formatfuzzer::generate(tape, &mut gen_template) else { continue };

        let mut parse_template = ChunkedContainer::new();
        let (decisions, _, _) = formatfuzzer::parse(file.clone(), &mut parse_template).unwrap();

        let mut regen_template = ChunkedContainer::new();
        let (regenerated, _) =
            formatfuzzer::generate(decisions.consumed_slice().to_vec(), &mut regen_template).unwrap();
        assert_eq!(file, regenerated);
        ok += 1;
    }
    assert!(ok > 900, "expected most of 1000 iterations to roundtrip, got {ok}");
}

#[test]
fn scenario_2_splicing_header_changes_only_header_influenced_bytes() {
    let target = generate(vec![1, 1, 1, 1, 1, 1, 1, 1, 0]);
    let source = generate(vec![2, 2, 2, 2, 2, 2, 2, 2, 0]);

    let target_chunks = parse_chunks(target.clone());
    let source_chunks = parse_chunks(source.clone());
    let target_header = target_chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();
    let source_header = source_chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();

    let mut parse_template = ChunkedContainer::new();
    let (target_decisions, _, _) = formatfuzzer::parse(target.clone(), &mut parse_template).unwrap();
    let mut parse_template = ChunkedContainer::new();
    let (source_decisions, _, _) = formatfuzzer::parse(source, &mut parse_template).unwrap();

    let mut template = ChunkedContainer::new();
    let result = splice::splice(
        &target_decisions,
        TargetSlot::from_chunk(target_header),
        &source_decisions,
        source_header,
        0,
        &mut template,
    )
    .unwrap();

    assert_eq!(result.file.len(), target.len());
    // Only the header bytes (offsets 4..12) differ; magic and trailer CRC
    // may also move if the CRC depends on the header, which it does here.
    assert_ne!(result.file.as_slice()[4..12], target[4..12]);
    assert_eq!(&result.file.as_slice()[0..4], &target[0..4]);
}

#[test]
fn scenario_3_insert_increases_length_by_emitted_chunk_size() {
    let target = generate(vec![1, 1, 1, 1, 1, 1, 1, 1, 0]);
    let donor_source = generate(vec![2, 2, 2, 2, 2, 2, 2, 2, 1, 3, b'f', b'o', b'o', 0]);

    let mut parse_template = ChunkedContainer::new();
    let (target_decisions, _, insertion_points) =
        formatfuzzer::parse(target.clone(), &mut parse_template).unwrap();
    let point = &insertion_points[0];

    let donor_chunks = parse_chunks(donor_source.clone());
    let donor_text = donor_chunks.iter().find(|c| c.type_tag == "tEXt").unwrap();
    let mut parse_template = ChunkedContainer::new();
    let (donor_decisions, _, _) = formatfuzzer::parse(donor_source, &mut parse_template).unwrap();

    let mut template = ChunkedContainer::new();
    let result = splice::splice(
        &target_decisions,
        TargetSlot::insertion_point(point.pos),
        &donor_decisions,
        donor_text,
        0,
        &mut template,
    )
    .unwrap();

    assert_eq!(result.file.len(), target.len() + donor_text.decision_width());
}

#[test]
fn scenario_4_delete_removes_an_optional_chunk_followed_by_another() {
    // Two tEXt chunks back to back: the first is deletable (optional and
    // followed by another optional chunk).
    let decisions = vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, b'a', 1, 1, b'b', 0];
    let file = generate(decisions);
    let chunks = parse_chunks(file.clone());
    let deletable: Vec<_> = chunks.iter().filter(|c| c.is_deletable()).collect();
    assert!(!deletable.is_empty());

    let mut parse_template = ChunkedContainer::new();
    let (target_decisions, _, _) = formatfuzzer::parse(file.clone(), &mut parse_template).unwrap();

    let mut template = ChunkedContainer::new();
    let result = splice::delete(&target_decisions, deletable[0], 0, &mut template).unwrap();
    assert!(result.len() < file.len());
}

#[test]
fn scenario_5_deleting_header_is_rejected() {
    let file = generate(vec![1, 1, 1, 1, 1, 1, 1, 1, 0]);
    let chunks = parse_chunks(file.clone());
    let header = chunks.iter().find(|c| c.type_tag == "IHDR").unwrap();

    let mut parse_template = ChunkedContainer::new();
    let (target_decisions, _, _) = formatfuzzer::parse(file, &mut parse_template).unwrap();

    let mut template = ChunkedContainer::new();
    let err = splice::delete(&target_decisions, header, 0, &mut template).unwrap_err();
    assert!(matches!(err, FuzzError::NotDeletable { .. }));
}

#[test]
fn scenario_6_roundtrip_harness_reports_zero_mismatches() {
    let mut rng = StdRng::seed_from_u64(99);
    let report =
        formatfuzzer::roundtrip::run_roundtrip_test(1000, 32, ChunkedContainer::new, &mut rng).unwrap();
    assert!(report.all_passed());
    assert!(report.mismatches.is_empty());
    assert_eq!(report.failures, 0);
}

#[test]
fn mutation_planner_produces_every_kind_over_many_runs() {
    let files: Vec<Vec<u8>> = vec![
        generate(vec![1, 2, 3, 4, 5, 6, 7, 8, 1, 2, b'h', b'i', 1, 1, b'z', 0]),
        generate(vec![9, 9, 9, 9, 9, 9, 9, 9, 1, 1, b'y', 0]),
        generate(vec![5, 5, 5, 5, 5, 5, 5, 5, 0]),
    ];
    let session = Session::build(&files, ChunkedContainer::new).unwrap();
    let mut rng = StdRng::seed_from_u64(123);
    let mut kinds = std::collections::HashSet::new();
    for i in 0..500 {
        let target = i % session.files.len();
        if let Ok(outcome) = planner::one_smart_mutation(&session, target, ChunkedContainer::new, &mut rng) {
            kinds.insert(match outcome.kind {
                MutationKind::NonOptionalReplace => "replace",
                MutationKind::OptionalReplace => "replace-optional",
                MutationKind::Insert => "insert",
                MutationKind::Delete => "delete",
            });
        }
    }
    assert!(kinds.len() >= 2, "expected variety of mutation kinds, saw {kinds:?}");
}
