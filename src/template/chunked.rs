//! A reference `FormatTemplate`: a simplified chunked container in the
//! spirit of PNG/IFF, grounded in the teacher's `iff::iff` reader/writer
//! (chunk id + big-endian length + payload) generalized to the
//! decision-stream-driven generate/parse duality §4.1 requires.
//!
//! Layout:
//!
//! ```text
//! "FFUZ"                          -- fixed magic, untracked as a chunk
//! IHDR  width:u32  height:u32      -- non-optional, fixed-size
//! (tEXt  len:u8  payload:[u8;len])* -- zero or more optional chunks
//! IEND  crc:u32                   -- non-optional, crc32 of everything before it
//! ```
//!
//! `IHDR` and `IEND` are never optional or deletable; `tEXt` chunks are
//! optional, appendable (another `tEXt` may follow), and deletable whenever
//! followed by another optional chunk.

use crate::mode::InterpreterContext;
use crate::template::{FormatTemplate, TemplateOutcome};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"FFUZ";

/// Upper bound on a `tEXt` chunk's payload length, kept small so generated
/// files stay reasonably sized and so `insert`/`replace` splices terminate
/// quickly when the recipient context happens to read more than expected.
const MAX_TEXT_LEN: u8 = 64;

#[derive(Debug, Default)]
pub struct ChunkedContainer;

impl ChunkedContainer {
    pub fn new() -> Self {
        Self
    }

    fn run_inner(&mut self, ctx: &mut InterpreterContext) -> crate::utils::error::Result<()> {
        ctx.derived_bytes(MAGIC)?;

        ctx.enter_chunk("header", "IHDR");
        ctx.raw_bytes(4)?;
        ctx.raw_bytes(4)?;
        ctx.exit_chunk()?;

        // The trailer below is always a fixed-size 4-byte CRC; the loop's
        // end-of-stream probe must not mistake those trailing bytes for
        // another tEXt chunk.
        ctx.set_trailing_reserve(4);
        let mut index = 0usize;
        loop {
            ctx.record_insertion_point(&format!("text_{index}"), "tEXt");
            let more = ctx.probe_continue()?;
            if !more {
                break;
            }
            ctx.enter_chunk(&format!("text_{index}"), "tEXt");
            let len = ctx.raw_byte()?.min(MAX_TEXT_LEN);
            ctx.raw_bytes(len as usize)?;
            ctx.exit_chunk()?;
            index += 1;
        }
        ctx.set_trailing_reserve(0);

        let crc = crc32fast::hash(ctx.consumed_file_prefix());
        let mut crc_bytes = [0u8; 4];
        BigEndian::write_u32(&mut crc_bytes, crc);
        ctx.enter_chunk("trailer", "IEND");
        ctx.derived_bytes(&crc_bytes)?;
        ctx.exit_chunk()?;

        Ok(())
    }
}

impl FormatTemplate for ChunkedContainer {
    fn run(&mut self, ctx: &mut InterpreterContext) -> TemplateOutcome {
        match self.run_inner(ctx) {
            Ok(()) => TemplateOutcome::Ok,
            Err(err) => TemplateOutcome::Failed(err),
        }
    }

    fn reachability_graph(&self) -> HashMap<String, Vec<String>> {
        let mut graph = HashMap::new();
        graph.insert("file".to_string(), vec!["header".to_string(), "body".to_string()]);
        graph.insert(
            "body".to_string(),
            vec!["text".to_string(), "trailer".to_string()],
        );
        graph.insert("text".to_string(), vec!["body".to_string()]);
        graph.insert("header".to_string(), vec!["body".to_string()]);
        graph.insert("trailer".to_string(), vec![]);
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_stream::DecisionStream;
    use crate::mode::InterpreterContext;

    fn generate(decisions: Vec<u8>) -> Vec<u8> {
        let mut ctx = InterpreterContext::for_generate(
            DecisionStream::from_bytes(decisions).unwrap(),
            0,
        );
        let mut tmpl = ChunkedContainer::new();
        assert!(tmpl.run(&mut ctx).is_success());
        let (file, _) = ctx.into_generated();
        file.into_vec()
    }

    #[test]
    fn generates_magic_header_and_trailer() {
        let file = generate(vec![1, 2, 3, 4, 5, 6, 7, 8, 0]);
        assert_eq!(&file[0..4], MAGIC);
        assert_eq!(file.len(), 4 + 8 + 4);
    }

    #[test]
    fn roundtrips_through_parse_and_regenerate() {
        let decisions = vec![10, 20, 30, 40, 50, 60, 70, 80, 1, 3, b'h', b'i', b'!', 0];
        let file = generate(decisions);

        let mut parse_ctx = InterpreterContext::for_parse(file.clone(), 0);
        parse_ctx.request_all_chunks();
        let mut tmpl = ChunkedContainer::new();
        assert!(tmpl.run(&mut parse_ctx).is_success());
        let (_, recovered) = parse_ctx.into_generated();

        let regenerated = generate(recovered.consumed_slice().to_vec());
        assert_eq!(file, regenerated);
    }

    #[test]
    fn records_header_and_text_chunks() {
        let decisions = vec![10, 20, 30, 40, 50, 60, 70, 80, 1, 2, b'h', b'i', 0];
        let mut ctx = InterpreterContext::for_generate(
            DecisionStream::from_bytes(decisions).unwrap(),
            0,
        );
        ctx.request_all_chunks();
        let mut tmpl = ChunkedContainer::new();
        assert!(tmpl.run(&mut ctx).is_success());

        let header = ctx.chunks().iter().find(|c| c.type_tag == "IHDR").unwrap();
        assert!(!header.optional);
        let text = ctx.chunks().iter().find(|c| c.type_tag == "tEXt").unwrap();
        assert!(text.optional);
        let trailer = ctx.chunks().iter().find(|c| c.type_tag == "IEND").unwrap();
        assert!(!trailer.optional);
    }

    #[test]
    fn rejects_corrupted_magic() {
        let mut file = generate(vec![0, 0, 0, 0, 0, 0, 0, 0, 0]);
        file[0] = b'X';
        let mut ctx = InterpreterContext::for_parse(file, 0);
        let mut tmpl = ChunkedContainer::new();
        assert!(!tmpl.run(&mut ctx).is_success());
    }
}
