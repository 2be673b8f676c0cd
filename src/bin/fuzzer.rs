//! The `fuzzer` CLI: argv routing for the §6 command surface, wired to the
//! reference [`formatfuzzer::template::chunked::ChunkedContainer`] template.
//!
//! A real deployment swaps in a format-specific `FormatTemplate`; this
//! binary exists so the crate is runnable end-to-end the way a complete
//! repo in this corpus always ships a CLI alongside its library.

use clap::{Parser, Subcommand};
use formatfuzzer::chunk::Chunk;
use formatfuzzer::decision_stream::{DecisionStream, MAX_RAND_SIZE};
use formatfuzzer::planner::{self, MutationKind};
use formatfuzzer::reachability;
use formatfuzzer::roundtrip;
use formatfuzzer::session::Session;
use formatfuzzer::splice::{self, TargetSlot};
use formatfuzzer::template::chunked::ChunkedContainer;
use formatfuzzer::utils::error::FuzzError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const BIN_NAME: &str = "fuzzer";

#[derive(Parser)]
#[command(name = BIN_NAME, version, about = "A format-aware smart-mutation fuzzer driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate random files; `-` denotes stdout.
    Fuzz {
        #[arg(long = "decisions")]
        decisions: Option<PathBuf>,
        #[arg(short = 'p', help = "print parse tree after generating")]
        print_tree: bool,
        files: Vec<String>,
    },
    /// Parse files; optionally save the recovered decision stream.
    Parse {
        #[arg(long = "decisions")]
        decisions_sink: Option<PathBuf>,
        files: Vec<PathBuf>,
    },
    /// Apply a smart replacement of one chunk with another.
    Replace {
        #[arg(long)]
        targetfile: PathBuf,
        #[arg(long)]
        targetstart: usize,
        #[arg(long)]
        targetend: usize,
        #[arg(long)]
        sourcefile: PathBuf,
        #[arg(long)]
        sourcestart: usize,
        #[arg(long)]
        sourceend: usize,
        outfile: PathBuf,
    },
    /// Delete a chunk, provided it is optional and followed by another optional chunk.
    Delete {
        #[arg(long)]
        targetfile: PathBuf,
        #[arg(long)]
        targetstart: usize,
        #[arg(long)]
        targetend: usize,
        outfile: PathBuf,
    },
    /// Insert an optional chunk at an insertion point.
    Insert {
        #[arg(long)]
        targetfile: PathBuf,
        #[arg(long)]
        targetstart: usize,
        #[arg(long)]
        sourcefile: PathBuf,
        #[arg(long)]
        sourcestart: usize,
        #[arg(long)]
        sourceend: usize,
        outfile: PathBuf,
    },
    /// Run 10,000 random smart mutations over the given corpus.
    Mutations { files: Vec<PathBuf> },
    /// Roundtrip sanity harness.
    Test {
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        #[arg(long, default_value_t = 64)]
        decision_size: usize,
    },
    /// Throughput measurement; if a checker path is given, score each output by its exit code.
    Benchmark {
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        checker: Option<PathBuf>,
    },
    /// Print all length-K reachability paths over the template's non-terminal graph.
    Kpaths { k: usize },
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Fuzz { decisions, print_tree, files } => cmd_fuzz(decisions, print_tree, files),
        Command::Parse { decisions_sink, files } => cmd_parse(decisions_sink, files),
        Command::Replace { targetfile, targetstart, targetend, sourcefile, sourcestart, sourceend, outfile } => {
            cmd_replace(targetfile, targetstart, targetend, sourcefile, sourcestart, sourceend, outfile)
        }
        Command::Delete { targetfile, targetstart, targetend, outfile } => {
            cmd_delete(targetfile, targetstart, targetend, outfile)
        }
        Command::Insert { targetfile, targetstart, sourcefile, sourcestart, sourceend, outfile } => {
            cmd_insert(targetfile, targetstart, sourcefile, sourcestart, sourceend, outfile)
        }
        Command::Mutations { files } => cmd_mutations(files),
        Command::Test { iterations, decision_size } => cmd_test(iterations, decision_size),
        Command::Benchmark { iterations, checker } => cmd_benchmark(iterations, checker),
        Command::Kpaths { k } => cmd_kpaths(k),
    };
    ExitCode::from(code.rem_euclid(256) as u8)
}

fn read_entropy(source: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(source)?;
    let mut buf = vec![0u8; MAX_RAND_SIZE];
    let n = file.read(&mut buf)?;
    if n < buf.len() {
        log::warn!("{BIN_NAME}: {} produced fewer bytes than requested", source.display());
    }
    buf.truncate(n);
    Ok(buf)
}

fn cmd_fuzz(decisions: Option<PathBuf>, print_tree: bool, files: Vec<String>) -> i32 {
    if files.is_empty() {
        eprintln!("{BIN_NAME}: missing output files. (Use '-' for standard output)");
        return -2;
    }
    let source = decisions.unwrap_or_else(|| PathBuf::from("/dev/urandom"));
    let mut errors = 0;
    for out in files {
        let tape = match read_entropy(&source) {
            Ok(t) => t,
            Err(err) => {
                eprintln!("{BIN_NAME}: failed to read decisions from {}: {err}", source.display());
                errors += 1;
                continue;
            }
        };
        let mut template = ChunkedContainer::new();
        match formatfuzzer::generate(tape, &mut template) {
            Ok((file, _)) => {
                if print_tree {
                    let mut ctx = formatfuzzer::mode::InterpreterContext::for_parse(file.clone(), 0);
                    ctx.request_all_chunks();
                    let mut tmpl = ChunkedContainer::new();
                    tmpl.run(&mut ctx);
                    for chunk in ctx.chunks() {
                        println!("{}\t{}\t[{}, {}]", chunk.type_tag, chunk.name, chunk.start, chunk.end);
                    }
                }
                if let Err(err) = write_output(&out, &file) {
                    eprintln!("{BIN_NAME}: {out}: {err}");
                    errors += 1;
                    continue;
                }
                eprintln!("{BIN_NAME}: {out} created");
            }
            Err(err) => {
                eprintln!("{BIN_NAME}: {out} failed: {err}");
                errors += 1;
            }
        }
    }
    errors
}

fn write_output(out: &str, data: &[u8]) -> std::io::Result<()> {
    if out == "-" {
        std::io::stdout().write_all(data)
    } else {
        std::fs::write(out, data)
    }
}

fn cmd_parse(decisions_sink: Option<PathBuf>, files: Vec<PathBuf>) -> i32 {
    if files.is_empty() {
        eprintln!("{BIN_NAME}: missing input files");
        return -2;
    }
    let mut errors = 0;
    for path in &files {
        let input = match std::fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                eprintln!("{BIN_NAME}: {}: {err}", path.display());
                errors += 1;
                continue;
            }
        };
        let mut template = ChunkedContainer::new();
        match formatfuzzer::parse(input, &mut template) {
            Ok((decisions, chunks, _)) => {
                eprintln!("{BIN_NAME}: {} parsed, {} chunks", path.display(), chunks.len());
                if let Some(sink) = &decisions_sink {
                    if let Err(err) = std::fs::write(sink, decisions.consumed_slice()) {
                        eprintln!("{BIN_NAME}: failed to write decisions to {}: {err}", sink.display());
                        errors += 1;
                    }
                }
            }
            Err(err) => {
                eprintln!("{BIN_NAME}: {}: parse failed: {err}", path.display());
                errors += 1;
            }
        }
    }
    errors
}

fn locate(file: &Path, start: usize, end: usize) -> Result<(Chunk, DecisionStream), i32> {
    let input = std::fs::read(file).map_err(|err| {
        eprintln!("{BIN_NAME}: {}: {err}", file.display());
        -2
    })?;
    let mut template = ChunkedContainer::new();
    splice::locate_by_file_range(input, 0, start, end, &mut template).map_err(|err| {
        eprintln!("{BIN_NAME}: {err}");
        -2
    })
}

fn cmd_replace(
    targetfile: PathBuf,
    targetstart: usize,
    targetend: usize,
    sourcefile: PathBuf,
    sourcestart: usize,
    sourceend: usize,
    outfile: PathBuf,
) -> i32 {
    let (target_chunk, target_decisions) = match locate(&targetfile, targetstart, targetend) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let (source_chunk, source_decisions) = match locate(&sourcefile, sourcestart, sourceend) {
        Ok(v) => v,
        Err(code) => return code,
    };
    if let Err(err) = splice::validate_non_optional_types(&target_chunk, &source_chunk) {
        eprintln!("{BIN_NAME}: {err}");
        return -2;
    }
    let mut template = ChunkedContainer::new();
    match splice::splice(
        &target_decisions,
        TargetSlot::from_chunk(&target_chunk),
        &source_decisions,
        &source_chunk,
        0,
        &mut template,
    ) {
        Ok(result) => {
            if let Err(err) = std::fs::write(&outfile, result.file.as_slice()) {
                eprintln!("{BIN_NAME}: {}: {err}", outfile.display());
                return -2;
            }
            report_drift(result.drift)
        }
        Err(err) => fail_with(&err),
    }
}

fn cmd_delete(targetfile: PathBuf, targetstart: usize, targetend: usize, outfile: PathBuf) -> i32 {
    let (target_chunk, target_decisions) = match locate(&targetfile, targetstart, targetend) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let mut template = ChunkedContainer::new();
    match splice::delete(&target_decisions, &target_chunk, 0, &mut template) {
        Ok(file) => {
            if let Err(err) = std::fs::write(&outfile, file.as_slice()) {
                eprintln!("{BIN_NAME}: {}: {err}", outfile.display());
                return -2;
            }
            0
        }
        Err(err) => fail_with(&err),
    }
}

fn cmd_insert(
    targetfile: PathBuf,
    targetstart: usize,
    sourcefile: PathBuf,
    sourcestart: usize,
    sourceend: usize,
    outfile: PathBuf,
) -> i32 {
    // `--targetstart` is a file-byte offset (§6); resolve it against the
    // parsed insertion points rather than treating it as a decision-space
    // position, the same file-space-to-decision-space translation `replace`
    // and `delete` get from `locate()`/`get_chunk`.
    let (target_decisions, point) = match std::fs::read(&targetfile) {
        Ok(input) => {
            let mut ctx = formatfuzzer::mode::InterpreterContext::for_parse(input, 0);
            ctx.request_all_chunks();
            let mut template = ChunkedContainer::new();
            if !template.run(&mut ctx).is_success() {
                eprintln!("{BIN_NAME}: {}: parse failed", targetfile.display());
                return -2;
            }
            let point = match ctx.insertion_points().iter().find(|p| p.file_pos == targetstart) {
                Some(p) => p.clone(),
                None => {
                    eprintln!(
                        "{BIN_NAME}: {}: no insertion point at file offset {targetstart}",
                        targetfile.display()
                    );
                    return -2;
                }
            };
            (ctx.into_generated().1, point)
        }
        Err(err) => {
            eprintln!("{BIN_NAME}: {}: {err}", targetfile.display());
            return -2;
        }
    };
    let (source_chunk, source_decisions) = match locate(&sourcefile, sourcestart, sourceend) {
        Ok(v) => v,
        Err(code) => return code,
    };
    if !source_chunk.optional {
        eprintln!("{BIN_NAME}: insertion requires an optional donor chunk");
        return -2;
    }

    let mut template = ChunkedContainer::new();
    match splice::splice(
        &target_decisions,
        TargetSlot::insertion_point(point.pos),
        &source_decisions,
        &source_chunk,
        0,
        &mut template,
    ) {
        Ok(result) => {
            if let Err(err) = std::fs::write(&outfile, result.file.as_slice()) {
                eprintln!("{BIN_NAME}: {}: {err}", outfile.display());
                return -2;
            }
            report_drift(result.drift)
        }
        Err(err) => fail_with(&err),
    }
}

fn report_drift(drift: formatfuzzer::DriftSign) -> i32 {
    match drift {
        formatfuzzer::DriftSign::Exact => 0,
        formatfuzzer::DriftSign::Under => {
            eprintln!("{BIN_NAME}: warning: consumed fewer decision bytes than expected while generating chunk");
            -1
        }
        formatfuzzer::DriftSign::Over => {
            eprintln!("{BIN_NAME}: warning: consumed more decision bytes than expected while generating chunk");
            1
        }
    }
}

fn fail_with(err: &FuzzError) -> i32 {
    eprintln!("{BIN_NAME}: {err}");
    -2
}

fn cmd_mutations(files: Vec<PathBuf>) -> i32 {
    if files.is_empty() {
        eprintln!("{BIN_NAME}: missing input files");
        return -2;
    }
    let inputs: Vec<Vec<u8>> = match files.iter().map(std::fs::read).collect() {
        Ok(v) => v,
        Err(err) => {
            eprintln!("{BIN_NAME}: {err}");
            return -2;
        }
    };
    let session = match Session::build(&inputs, ChunkedContainer::new) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{BIN_NAME}: {err}");
            return -2;
        }
    };

    for (path, parsed) in files.iter().zip(&session.files) {
        let sidecar = format!("{}-decisions", path.display());
        if let Err(err) = std::fs::write(&sidecar, parsed.decisions.consumed_slice()) {
            eprintln!("{BIN_NAME}: failed to write {sidecar}: {err}");
        }
    }

    let mut rng = StdRng::from_entropy();
    let mut errors = 0;
    for i in 0..10_000 {
        let target = i % session.files.len();
        match planner::one_smart_mutation(&session, target, ChunkedContainer::new, &mut rng) {
            Ok(outcome) => {
                let label = match outcome.kind {
                    MutationKind::NonOptionalReplace => "replace",
                    MutationKind::OptionalReplace => "replace-optional",
                    MutationKind::Insert => "insert",
                    MutationKind::Delete => "delete",
                };
                log::debug!("mutation {i}: {label} on file {target}, {} bytes", outcome.file.len());
            }
            Err(err) => {
                log::debug!("mutation {i} on file {target} skipped: {err}");
                errors += 1;
            }
        }
    }
    if errors > 0 {
        log::info!("{errors} of 10000 mutation attempts produced no candidate pair");
    }
    0
}

fn cmd_test(iterations: usize, decision_size: usize) -> i32 {
    let mut rng = StdRng::from_entropy();
    match roundtrip::run_roundtrip_test(iterations, decision_size, ChunkedContainer::new, &mut rng) {
        Ok(report) => {
            println!(
                "{BIN_NAME}: {} iterations, {} mismatches, {} failures, generate {:?}, parse {:?}",
                report.iterations,
                report.mismatches.len(),
                report.failures,
                report.generate_time,
                report.parse_time
            );
            for (i, mismatch) in report.mismatches.iter().enumerate() {
                let _ = std::fs::write(format!("r0-{i}"), &mismatch.r0);
                let _ = std::fs::write(format!("f0-{i}"), &mismatch.f0);
                let _ = std::fs::write(format!("r1-{i}"), &mismatch.r1);
                let _ = std::fs::write(format!("f1-{i}"), &mismatch.f1);
            }
            if report.all_passed() { 0 } else { (report.mismatches.len() + report.failures) as i32 }
        }
        Err(err) => fail_with(&err),
    }
}

fn cmd_benchmark(iterations: usize, checker: Option<PathBuf>) -> i32 {
    let mut rng = StdRng::from_entropy();
    let start = std::time::Instant::now();
    let mut accepted = 0;
    let mut generated = 0;
    for _ in 0..iterations {
        let mut tape = vec![0u8; MAX_RAND_SIZE.min(4096)];
        rand::RngCore::fill_bytes(&mut rng, &mut tape);
        let mut template = ChunkedContainer::new();
        let Ok((file, _)) = formatfuzzer::generate(tape, &mut template) else { continue };
        generated += 1;
        if let Some(checker) = &checker {
            let tmp = std::env::temp_dir().join(format!("formatfuzzer-bench-{generated}"));
            if std::fs::write(&tmp, &file).is_ok() {
                if let Ok(status) = std::process::Command::new(checker).arg(&tmp).status() {
                    if status.success() {
                        accepted += 1;
                    }
                }
                let _ = std::fs::remove_file(&tmp);
            }
        } else {
            accepted += 1;
        }
    }
    let elapsed = start.elapsed();
    println!(
        "{BIN_NAME}: {generated} files generated, {accepted} accepted, {:.1} files/sec",
        generated as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    0
}

fn cmd_kpaths(k: usize) -> i32 {
    let template = ChunkedContainer::new();
    let graph = formatfuzzer::template::FormatTemplate::reachability_graph(&template);
    for path in reachability::k_paths(&graph, k) {
        println!("{}", path.join(" -> "));
    }
    0
}
