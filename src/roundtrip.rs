//! The Roundtrip Tester (§4.5): generate, parse, regenerate, assert bitwise
//! equality. Mirrors the original `test()` command's timing instrumentation
//! with `std::time::Instant` instead of `gettimeofday`.

use crate::decision_stream::DecisionStream;
use crate::mode::InterpreterContext;
use crate::template::FormatTemplate;
use crate::utils::error::Result;
use rand::RngCore;
use std::time::{Duration, Instant};

/// A single roundtrip mismatch, persisted to disk for offline debugging
/// (`r0`/`f0`/`r1`/`f1` in §4.5).
pub struct Mismatch {
    pub r0: Vec<u8>,
    pub f0: Vec<u8>,
    pub r1: Vec<u8>,
    pub f1: Vec<u8>,
}

pub struct RoundtripReport {
    pub iterations: usize,
    pub mismatches: Vec<Mismatch>,
    /// Iterations where a file was generated but failed to parse or
    /// regenerate — these did not round-trip and must not be conflated with
    /// iterations skipped because the initial generate itself failed.
    pub failures: usize,
    pub generate_time: Duration,
    pub parse_time: Duration,
}

impl RoundtripReport {
    pub fn all_passed(&self) -> bool {
        self.mismatches.is_empty() && self.failures == 0
    }

    /// Bytes of decision-tape entropy processed per second of generation
    /// time, matching the original's throughput report.
    pub fn generate_throughput(&self, bytes_generated: usize) -> f64 {
        let secs = self.generate_time.as_secs_f64();
        if secs == 0.0 { 0.0 } else { bytes_generated as f64 / secs }
    }
}

/// Runs `iterations` rounds of generate → parse → regenerate → compare,
/// refreshing `decision_size` bytes of fresh entropy from `rng` each round.
pub fn run_roundtrip_test<T: FormatTemplate>(
    iterations: usize,
    decision_size: usize,
    template_factory: impl Fn() -> T,
    rng: &mut impl RngCore,
) -> Result<RoundtripReport> {
    let mut mismatches = Vec::new();
    let mut failures = 0;
    let mut generate_time = Duration::ZERO;
    let mut parse_time = Duration::ZERO;

    for i in 0..iterations {
        let mut tape = vec![0u8; decision_size];
        rng.fill_bytes(&mut tape);

        let gen_start = Instant::now();
        let mut gen_ctx = InterpreterContext::for_generate(DecisionStream::from_bytes(tape.clone())?, i);
        let mut template = template_factory();
        let outcome = template.run(&mut gen_ctx);
        generate_time += gen_start.elapsed();
        if !outcome.is_success() {
            continue;
        }
        let (file0, rand0) = gen_ctx.into_generated();
        let f0 = file0.into_vec();

        let parse_start = Instant::now();
        let mut parse_ctx = InterpreterContext::for_parse(f0.clone(), i);
        let mut template = template_factory();
        let outcome = template.run(&mut parse_ctx);
        parse_time += parse_start.elapsed();
        if !outcome.is_success() {
            log::warn!("roundtrip iteration {i}: generated file failed to parse");
            failures += 1;
            continue;
        }
        let (_, rand1) = parse_ctx.into_generated();

        let gen_start = Instant::now();
        let mut regen_ctx =
            InterpreterContext::for_generate(DecisionStream::from_bytes(rand1.consumed_slice().to_vec())?, i);
        let mut template = template_factory();
        let outcome = template.run(&mut regen_ctx);
        generate_time += gen_start.elapsed();
        if !outcome.is_success() {
            log::warn!("roundtrip iteration {i}: recovered decision stream failed to regenerate");
            failures += 1;
            continue;
        }
        let (file1, _) = regen_ctx.into_generated();
        let f1 = file1.into_vec();

        if f0 != f1 {
            log::warn!("roundtrip iteration {i}: mismatch, {} bytes vs {} bytes", f0.len(), f1.len());
            mismatches.push(Mismatch {
                r0: rand0.consumed_slice().to_vec(),
                f0,
                r1: rand1.consumed_slice().to_vec(),
                f1,
            });
        }
    }

    Ok(RoundtripReport { iterations, mismatches, failures, generate_time, parse_time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::chunked::ChunkedContainer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn reference_template_roundtrips_cleanly() {
        let mut rng = StdRng::seed_from_u64(7);
        let report = run_roundtrip_test(200, 24, ChunkedContainer::new, &mut rng).unwrap();
        assert_eq!(report.iterations, 200);
        assert!(
            report.all_passed(),
            "roundtrip mismatches: {}, failures: {}",
            report.mismatches.len(),
            report.failures
        );
    }
}
