//! The interpreter context: the single handle a `FormatTemplate` is driven
//! through, replacing the original tool's process-wide globals
//! (`get_chunk`, `smart_mutation`, `rand_start`, `chunk_name`, ...) with
//! explicit fields on a value the template borrows for the duration of one run.

use crate::chunk::{Chunk, DriftSign, InsertionPoint};
use crate::decision_stream::DecisionStream;
use crate::file_buffer::FileBuffer;
use crate::utils::error::{FuzzError, Result};
use std::collections::HashMap;

/// Which direction the interpreter is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Consume decisions, emit file bytes.
    Generate,
    /// Consume file bytes, emit decisions.
    Parse,
}

/// A `get_chunk` request: locate the chunk whose file-byte range matches.
#[derive(Debug, Clone, Copy)]
pub struct GetChunkRequest {
    pub file_start: usize,
    pub file_end: usize,
}

/// A `smart_mutation` request: the decision-space window a donor chunk now
/// occupies in the target's (patched) decision stream.
#[derive(Debug, Clone, Copy)]
pub struct SmartMutationWindow {
    pub rand_start: usize,
    pub rand_end: usize,
    /// Forces the first probe encountered at `rand_start` to answer "present"
    /// without consuming a decision byte — used by insert, where the donor
    /// chunk is always optional and the splice point has no prior probe of
    /// its own to replay.
    pub force_entry_optional: Option<bool>,
}

struct ChunkFrame {
    name: String,
    type_tag: String,
    start: usize,
    file_start: usize,
    optional: bool,
}

/// The mutable state a `FormatTemplate::run` call is threaded through.
///
/// One `InterpreterContext` is constructed per generate/parse invocation; it
/// does not outlive that call, so nothing here needs to be `Send`/`Sync` or
/// protected by a lock — §5 of the design is single-threaded by construction.
pub struct InterpreterContext {
    mode: Mode,
    decisions: DecisionStream,
    file: FileBuffer,

    /// Parse-mode input: the file bytes being consumed, and a cursor over them.
    input: Vec<u8>,
    input_pos: usize,

    file_index: usize,

    get_all_chunks: bool,
    get_chunk_request: Option<GetChunkRequest>,
    smart_mutation: Option<SmartMutationWindow>,
    is_delete: bool,

    chunk_stack: Vec<ChunkFrame>,
    chunks: Vec<Chunk>,
    insertion_points: Vec<InsertionPoint>,
    variable_types: HashMap<String, String>,
    found_chunk: Option<Chunk>,

    /// Set by `probe_continue` and consumed by the next `enter_chunk`, marking
    /// that chunk `optional`.
    pending_probe: bool,
    /// Index into `chunks` of the most recently exited chunk, valid only until
    /// the next `enter_chunk` call — used to retroactively mark `appendable`
    /// and `following_optional` on that chunk.
    last_chunk_idx: Option<usize>,

    /// Decision-stream consumption observed strictly within the active
    /// `smart_mutation` window, used to compute drift.
    window_consumed_start: Option<usize>,
    drift: Option<DriftSign>,

    /// Bytes at the tail of the parse input that `probe_continue` must not
    /// treat as "more to read" — the fixed-size trailer that always follows
    /// an optional region (a CRC, a terminator tag). Set by the template
    /// immediately before entering a loop of optional chunks.
    trailing_reserve: usize,
}

impl InterpreterContext {
    /// Builds a context for generation from a supplied decision tape.
    pub fn for_generate(decisions: DecisionStream, file_index: usize) -> Self {
        Self::new(Mode::Generate, decisions, Vec::new(), file_index)
    }

    /// Builds a context for parsing an input file.
    pub fn for_parse(input: Vec<u8>, file_index: usize) -> Self {
        Self::new(Mode::Parse, DecisionStream::for_parsing(), input, file_index)
    }

    fn new(mode: Mode, decisions: DecisionStream, input: Vec<u8>, file_index: usize) -> Self {
        Self {
            mode,
            decisions,
            file: FileBuffer::new(),
            input,
            input_pos: 0,
            file_index,
            get_all_chunks: false,
            get_chunk_request: None,
            smart_mutation: None,
            is_delete: false,
            chunk_stack: Vec::new(),
            chunks: Vec::new(),
            insertion_points: Vec::new(),
            variable_types: HashMap::new(),
            found_chunk: None,
            pending_probe: false,
            last_chunk_idx: None,
            window_consumed_start: None,
            drift: None,
            trailing_reserve: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn request_all_chunks(&mut self) {
        self.get_all_chunks = true;
    }

    pub fn request_chunk(&mut self, request: GetChunkRequest) {
        self.get_chunk_request = Some(request);
    }

    pub fn request_smart_mutation(&mut self, window: SmartMutationWindow) {
        if window.rand_start <= window.rand_end {
            self.window_consumed_start = Some(0);
        }
        self.smart_mutation = Some(window);
    }

    pub fn set_is_delete(&mut self, is_delete: bool) {
        self.is_delete = is_delete;
    }

    pub fn is_delete(&self) -> bool {
        self.is_delete
    }

    /// Reserves `n` bytes at the tail of the parse input that `probe_continue`
    /// must treat as unavailable — the fixed-size trailer following the
    /// optional region it is about to loop over. Call this before the loop
    /// and reset it to `0` once the loop has exited, so entering the trailer
    /// chunk itself sees the ordinary end-of-input behavior.
    pub fn set_trailing_reserve(&mut self, n: usize) {
        self.trailing_reserve = n;
    }

    // -- decision / file primitives -----------------------------------------

    /// Reads (generate) or records (parse) one byte of "raw" field data —
    /// a decision byte in generate mode that is echoed straight to the file,
    /// or a file byte in parse mode that is recorded as the decision that
    /// would have produced it.
    pub fn raw_byte(&mut self) -> Result<u8> {
        match self.mode {
            Mode::Generate => {
                let b = self.decisions.read_u8();
                self.file.push(b)?;
                self.note_window_consumption();
                Ok(b)
            }
            Mode::Parse => {
                let b = self.next_input_byte()?;
                self.decisions.push_u8(b)?;
                Ok(b)
            }
        }
    }

    /// Reads (generate) or records (parse) `n` bytes of raw field data.
    pub fn raw_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        (0..n).map(|_| self.raw_byte()).collect()
    }

    /// Emits a byte to the output file that is *derived* (a length field, a
    /// checksum) rather than read from the decision stream — does not touch
    /// the decision cursor in either mode.
    pub fn emit_derived(&mut self, byte: u8) -> Result<()> {
        if self.mode == Mode::Generate {
            self.file.push(byte)?;
        }
        Ok(())
    }

    pub fn emit_derived_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.emit_derived(b)?;
        }
        Ok(())
    }

    /// Patches previously-emitted derived bytes in the output file (used to
    /// back-patch a length field once a chunk's payload size is known).
    pub fn patch_file(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        if self.mode == Mode::Generate {
            self.file.patch(at, bytes)?;
        }
        Ok(())
    }

    pub fn file_position(&self) -> usize {
        match self.mode {
            Mode::Generate => self.file.position(),
            Mode::Parse => self.input_pos,
        }
    }

    /// A derived field (magic bytes, a checksum) that does not touch the
    /// decision stream in either direction: in generate mode it is appended
    /// to the output file; in parse mode the corresponding input bytes are
    /// consumed and checked against the value the template already computed
    /// from what it has read so far. A mismatch means the input isn't a
    /// legal instance of the format at this position.
    pub fn derived_bytes(&mut self, computed: &[u8]) -> Result<()> {
        match self.mode {
            Mode::Generate => self.file.extend(computed),
            Mode::Parse => {
                let actual = self.raw_input_bytes(computed.len())?;
                if actual != computed {
                    return Err(FuzzError::ParseFailure(format!(
                        "derived field mismatch at offset {}: expected {:?}, found {:?}",
                        self.input_pos - computed.len(),
                        computed,
                        actual
                    )));
                }
                Ok(())
            }
        }
    }

    /// The bytes of the artifact produced/consumed so far: emitted file
    /// bytes in generate mode, consumed input bytes in parse mode. Templates
    /// use this to compute checksums over "everything before this point"
    /// symmetrically in both directions.
    pub fn consumed_file_prefix(&self) -> &[u8] {
        match self.mode {
            Mode::Generate => self.file.as_slice(),
            Mode::Parse => &self.input[..self.input_pos],
        }
    }

    fn raw_input_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.input_pos + n > self.input.len() {
            return Err(FuzzError::ParseFailure("unexpected end of input file".into()));
        }
        let bytes = self.input[self.input_pos..self.input_pos + n].to_vec();
        self.input_pos += n;
        Ok(bytes)
    }

    fn next_input_byte(&mut self) -> Result<u8> {
        let b = self
            .input
            .get(self.input_pos)
            .copied()
            .ok_or_else(|| FuzzError::ParseFailure("unexpected end of input file".into()))?;
        self.input_pos += 1;
        Ok(b)
    }

    fn note_window_consumption(&mut self) {
        let Some(window) = self.smart_mutation else { return };
        let pos = self.decisions.consumed();
        if pos > window.rand_start && pos <= window.rand_end + 1 {
            *self.window_consumed_start.get_or_insert(0) += 1;
        }
    }

    // -- probes and chunk lifecycle -------------------------------------------

    /// The end-of-stream / lookahead probe: "is there more to read here?"
    /// Consumes (generate) or produces (parse) exactly one decision byte that
    /// records the answer, so replaying the recovered stream reproduces the
    /// same branch. Also marks the bookkeeping used to derive `optional`,
    /// `appendable`, and `following_optional`.
    pub fn probe_continue(&mut self) -> Result<bool> {
        self.pending_probe = true;
        if let Some(idx) = self.last_chunk_idx {
            if let Some(chunk) = self.chunks.get_mut(idx) {
                chunk.appendable = true;
            }
        }

        if let Some(window) = self.smart_mutation {
            if self.decisions.consumed() == window.rand_start {
                if let Some(forced) = window.force_entry_optional {
                    return Ok(forced);
                }
            }
        }

        match self.mode {
            Mode::Generate => {
                let decided = self.decisions.read_u8() % 2 == 1;
                self.note_window_consumption();
                Ok(decided)
            }
            Mode::Parse => {
                let more = self.input_pos + self.trailing_reserve < self.input.len();
                self.decisions.push_u8(if more { 1 } else { 0 })?;
                Ok(more)
            }
        }
    }

    /// Enters a named chunk. `optional` is derived from whether the most
    /// recent `probe_continue` call is still pending (i.e. happened
    /// immediately before this call with no intervening chunk).
    pub fn enter_chunk(&mut self, name: &str, type_tag: &str) {
        let optional = std::mem::take(&mut self.pending_probe);
        if let Some(idx) = self.last_chunk_idx.take() {
            if let Some(prev) = self.chunks.get_mut(idx) {
                prev.following_optional = optional;
            }
        }
        let start = self.decisions.consumed();
        let file_start = self.file_position();
        self.chunk_stack.push(ChunkFrame {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            start,
            file_start,
            optional,
        });
    }

    /// Exits the most recently entered chunk, finalizing its record.
    pub fn exit_chunk(&mut self) -> Result<()> {
        let frame = self
            .chunk_stack
            .pop()
            .ok_or_else(|| FuzzError::ParseFailure("exit_chunk with no open chunk".into()))?;
        let end = self.decisions.consumed().saturating_sub(1);
        let file_end = self.file_position().saturating_sub(1);
        let chunk = Chunk {
            file_index: self.file_index,
            start: frame.start,
            end,
            file_start: frame.file_start,
            file_end,
            type_tag: frame.type_tag.clone(),
            name: frame.name.clone(),
            optional: frame.optional,
            appendable: false,
            following_optional: false,
        };

        if let Some(req) = self.get_chunk_request {
            if frame.file_start == req.file_start && file_end == req.file_end {
                self.found_chunk = Some(chunk.clone());
            }
        }

        if self.get_all_chunks {
            self.variable_types.insert(chunk.name.clone(), chunk.type_tag.clone());
            self.chunks.push(chunk);
            self.last_chunk_idx = Some(self.chunks.len() - 1);
        } else {
            self.last_chunk_idx = None;
        }
        Ok(())
    }

    /// Records an insertion point — a place where an additional optional
    /// chunk of the given type/name could legally begin. Call this at the
    /// same point `probe_continue` is called to decide whether to start one.
    pub fn record_insertion_point(&mut self, name: &str, type_tag: &str) {
        if !self.get_all_chunks {
            return;
        }
        self.insertion_points.push(InsertionPoint {
            file_index: self.file_index,
            pos: self.decisions.consumed(),
            file_pos: self.file_position(),
            type_tag: type_tag.to_string(),
            name: name.to_string(),
        });
    }

    // -- results --------------------------------------------------------------

    pub fn into_generated(self) -> (FileBuffer, DecisionStream) {
        (self.file, self.decisions)
    }

    pub fn decisions(&self) -> &DecisionStream {
        &self.decisions
    }

    pub fn file_buffer(&self) -> &FileBuffer {
        &self.file
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn insertion_points(&self) -> &[InsertionPoint] {
        &self.insertion_points
    }

    pub fn variable_types(&self) -> &HashMap<String, String> {
        &self.variable_types
    }

    pub fn found_chunk(&self) -> Option<&Chunk> {
        self.found_chunk.as_ref()
    }

    /// Finalizes drift measurement for the active `smart_mutation` window:
    /// compares the decision bytes actually consumed while the cursor was
    /// inside `[rand_start, rand_end]` against the window's expected width.
    pub fn finish_drift(&mut self) -> Option<DriftSign> {
        let window = self.smart_mutation?;
        let expected = window.rand_end + 1 - window.rand_start;
        let actual = self.window_consumed_start.unwrap_or(0);
        let sign = DriftSign::from_counts(expected, actual);
        self.drift = Some(sign);
        Some(sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_exit_records_chunk_with_optional_flag() {
        let mut ctx = InterpreterContext::for_generate(
            DecisionStream::from_bytes(vec![1, 2, 3, 4]).unwrap(),
            0,
        );
        ctx.request_all_chunks();
        ctx.enter_chunk("header", "Header");
        ctx.raw_bytes(2).unwrap();
        ctx.exit_chunk().unwrap();
        assert_eq!(ctx.chunks().len(), 1);
        let c = &ctx.chunks()[0];
        assert!(!c.optional);
        assert_eq!(c.start, 0);
        assert_eq!(c.end, 1);
    }

    #[test]
    fn probe_then_enter_marks_optional_and_prior_appendable() {
        let mut ctx = InterpreterContext::for_generate(
            DecisionStream::from_bytes(vec![0, 0, 1, 9]).unwrap(),
            0,
        );
        ctx.request_all_chunks();
        ctx.enter_chunk("header", "Header");
        ctx.raw_byte().unwrap();
        ctx.exit_chunk().unwrap();

        let present = ctx.probe_continue().unwrap();
        assert!(present); // byte 1 is odd -> continue
        ctx.enter_chunk("text", "Text");
        ctx.raw_byte().unwrap();
        ctx.exit_chunk().unwrap();

        assert_eq!(ctx.chunks().len(), 2);
        assert!(ctx.chunks()[0].appendable);
        assert!(ctx.chunks()[0].following_optional);
        assert!(ctx.chunks()[1].optional);
    }
}
