//! Top-level compression and decompression pipelines.
//!
//! Compression: parse the input's section bodies into integer streams,
//! count paths into the trie, prune and assign, synthesise the read
//! direction algorithm, then rewrite each body through the greedy
//! matcher into framed blocks. The outer file shape (magic, version,
//! section names, block framing) stays at the byte level.
//!
//! Decompression is two-stage per section: the generated `file` function
//! decodes abbreviation indices back into an integer stream, and the
//! replay pump re-encodes that stream as the original body bytes,
//! reframing any nested blocks.

use tracing::debug;

use vassago_core::{
    CompressionFlags, Error, IntFormat, Result, WASM_BINARY_MAGIC, WASM_BINARY_VERSION,
};
use vassago_filt::{FlattenAst, InflateAst, PredefinedSymbol, SymbolTable};
use vassago_interp::{replay, replay_with, ByteStreamWriter, IntStreamWriter, Interpreter, Writer};
use vassago_stream::{ByteReader, ByteStream, IntStream};

use crate::casm;
use crate::codegen::AbbreviationCodegen;
use crate::counter::CounterWriter;
use crate::huffman::{self, HuffmanCodes};
use crate::rewriter::AbbrevAssignWriter;
use crate::trie::CountTrie;

/// Output of a compression run.
#[derive(Debug, Clone)]
pub struct Compressed {
    /// The compressed file (same outer shape as the input).
    pub data: Vec<u8>,
    /// The CASM artifact decoding it (the read-direction algorithm).
    pub algorithm: Vec<u8>,
}

struct ParsedSection {
    name: String,
    body: IntStream,
}

/// Compresses WASM-style binaries against a learned abbreviation table.
pub struct IntCompressor {
    flags: CompressionFlags,
}

impl IntCompressor {
    /// Create a compressor with the given flags.
    pub fn new(flags: CompressionFlags) -> Self {
        IntCompressor { flags }
    }

    /// The configured flags.
    pub fn flags(&self) -> &CompressionFlags {
        &self.flags
    }

    /// Compress `input`, returning the data and its algorithm artifact.
    pub fn compress(&self, input: &[u8]) -> Result<Compressed> {
        let sections = self.parse(input)?;
        debug!(sections = sections.len(), "parsed input");

        let mut trie = CountTrie::new();
        {
            let mut counter = CounterWriter::new(&mut trie, self.flags.length_limit);
            for section in &sections {
                replay(&section.body, &mut counter)?;
                counter.reset_window();
            }
        }
        debug!(int_nodes = trie.int_node_count(), "counted paths");

        trie.prune(self.flags.count_cutoff, self.flags.weight_cutoff);
        let assignments = trie.assign_abbreviations();

        let encoding_root = if self.flags.use_huffman_encoding {
            let weights: Vec<(u32, u64)> = assignments
                .iter()
                .map(|&id| (trie.abbrev_index(id).expect("assigned"), trie.count(id)))
                .collect();
            huffman::build_encoding(&weights)
        } else {
            None
        };
        let codes = encoding_root.as_ref().map(HuffmanCodes::from_tree);

        let symtab = AbbreviationCodegen::new(
            &self.flags,
            &trie,
            &assignments,
            encoding_root.as_ref(),
            true,
        )
        .generate()?;
        let algorithm = flatten_to_casm(&symtab)?;

        let data = self.rewrite(&sections, &trie, codes)?;
        debug!(
            input_len = input.len(),
            output_len = data.len(),
            algorithm_len = algorithm.len(),
            "compressed"
        );
        Ok(Compressed { data, algorithm })
    }

    /// Parse the outer file shape, capturing each section body as an
    /// integer stream (one value per byte under the default parse
    /// algorithm).
    fn parse(&self, input: &[u8]) -> Result<Vec<ParsedSection>> {
        let stream = ByteStream::frozen_from(input.to_vec()).into_shared();
        let mut reader = ByteReader::new(stream);

        let magic = reader.read_u32()?;
        if magic as u32 != WASM_BINARY_MAGIC {
            return Err(Error::malformed(format!("bad magic number {magic:#x}")));
        }
        let version = reader.read_u32()?;
        if version as u32 != WASM_BINARY_VERSION {
            return Err(Error::malformed(format!("unknown version {version:#x}")));
        }

        let mut sections = Vec::new();
        while !reader.at_byte_eob() {
            let name_len = reader.read_varuint32()?;
            let mut name = String::new();
            for _ in 0..name_len {
                name.push(char::from(reader.read_u8()?));
            }
            let size = reader.read_block_size()?;
            reader.push_eob(size)?;
            let mut body = IntStream::new();
            while !reader.at_byte_eob() {
                body.push_value(u64::from(reader.read_u8()?))?;
            }
            reader.pop_eob()?;
            reader.align_to_byte();
            body.freeze();
            sections.push(ParsedSection { name, body });
        }
        Ok(sections)
    }

    fn rewrite(
        &self,
        sections: &[ParsedSection],
        trie: &CountTrie,
        codes: Option<HuffmanCodes>,
    ) -> Result<Vec<u8>> {
        let out = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(out.clone());
        writer.set_minimize_block_size(self.flags.minimize_block_size);

        writer.write_value(u64::from(WASM_BINARY_MAGIC), IntFormat::Uint32)?;
        writer.write_value(u64::from(WASM_BINARY_VERSION), IntFormat::Uint32)?;

        for section in sections {
            writer.write_value(section.name.len() as u64, IntFormat::Varuint32)?;
            for byte in section.name.bytes() {
                writer.write_value(u64::from(byte), IntFormat::Uint8)?;
            }
            writer.write_action(PredefinedSymbol::BlockEnterWriteonly)?;
            match &codes {
                Some(codes) => {
                    // Bit-coded bodies are count-prefixed so the decoder
                    // never reads trailing pad bits as symbols.
                    let temp = ByteStream::new().into_shared();
                    let mut temp_writer = ByteStreamWriter::new(temp.clone());
                    let mut rewriter = AbbrevAssignWriter::new(
                        trie,
                        &mut temp_writer,
                        &self.flags,
                        Some(codes.clone()),
                    );
                    replay(&section.body, &mut rewriter)?;
                    rewriter.finish()?;
                    let groups = rewriter.groups();
                    drop(rewriter);
                    temp_writer.align()?;
                    writer.write_value(groups, IntFormat::Varuint32)?;
                    for &byte in temp.borrow().as_slice() {
                        writer.write_value(u64::from(byte), IntFormat::Uint8)?;
                    }
                }
                None => {
                    let mut rewriter =
                        AbbrevAssignWriter::new(trie, &mut writer, &self.flags, None);
                    replay(&section.body, &mut rewriter)?;
                    rewriter.finish()?;
                }
            }
            writer.write_action(PredefinedSymbol::BlockExitWriteonly)?;
            writer.align()?;
        }
        writer.write_freeze_eof()?;
        let data = out.borrow().as_slice().to_vec();
        Ok(data)
    }
}

/// Decompresses artifacts produced by [`IntCompressor`].
pub struct IntDecompressor {
    flags: CompressionFlags,
}

impl IntDecompressor {
    /// Create a decompressor with the given flags.
    pub fn new(flags: CompressionFlags) -> Self {
        IntDecompressor { flags }
    }

    /// The configured flags.
    pub fn flags(&self) -> &CompressionFlags {
        &self.flags
    }

    /// Decompress `data` using its CASM `algorithm` artifact.
    pub fn decompress(&self, algorithm: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let alg_stream = casm::decode_casm(algorithm)?;
        let symtab = InflateAst::inflate(&alg_stream)?;
        let file_define = symtab.definition_by_name("file").ok_or_else(|| {
            Error::schema(
                "algorithm defines no file function; \
                 CISM-model artifacts need the cism base algorithm installed",
            )
        })?;

        let input = ByteStream::frozen_from(data.to_vec()).into_shared();
        let mut reader = ByteReader::new(input);
        let out = ByteStream::new().into_shared();
        let mut writer = ByteStreamWriter::new(out.clone());
        // Decompressed output always uses canonical minimal framing.
        writer.set_minimize_block_size(true);

        let magic = reader.read_u32()?;
        if magic as u32 != WASM_BINARY_MAGIC {
            return Err(Error::malformed(format!("bad magic number {magic:#x}")));
        }
        writer.write_value(magic, IntFormat::Uint32)?;
        let version = reader.read_u32()?;
        if version as u32 != WASM_BINARY_VERSION {
            return Err(Error::malformed(format!("unknown version {version:#x}")));
        }
        writer.write_value(version, IntFormat::Uint32)?;

        while !reader.at_byte_eob() {
            reader = self.decompress_section(&symtab, file_define, reader, &mut writer)?;
        }
        reader.align_to_byte();
        writer.align()?;
        writer.write_freeze_eof()?;
        let bytes = out.borrow().as_slice().to_vec();
        Ok(bytes)
    }

    fn decompress_section(
        &self,
        symtab: &SymbolTable,
        file_define: vassago_filt::NodeId,
        mut reader: ByteReader,
        writer: &mut ByteStreamWriter,
    ) -> Result<ByteReader> {
        let name_len = reader.read_varuint32()?;
        writer.write_value(name_len, IntFormat::Varuint32)?;
        let mut name = String::new();
        for _ in 0..name_len {
            let byte = reader.read_u8()?;
            writer.write_value(u64::from(byte), IntFormat::Uint8)?;
            name.push(char::from(byte));
        }
        debug!(section = %name, "decompressing section");

        // Stage 1: decode abbreviation indices into an integer stream.
        let size = reader.read_block_size()?;
        reader.push_eob(size)?;
        let ints = IntStream::new().into_shared();
        let mut interp = Interpreter::new(
            symtab,
            reader,
            Box::new(IntStreamWriter::new(ints.clone())),
        );
        let result = interp.eval(file_define);
        reader = interp.into_reader();
        if let Err(err) = result {
            reader.pop_eob_unchecked();
            return Err(err);
        }
        reader.align_to_byte();
        reader.pop_eob()?;
        ints.borrow_mut().freeze();

        // Stage 2: re-encode the integer stream as the section body.
        writer.write_action(PredefinedSymbol::BlockEnterWriteonly)?;
        {
            let ints_ref = ints.borrow();
            replay_with(&ints_ref, writer, IntFormat::Uint8)?;
        }
        writer.write_action(PredefinedSymbol::BlockExitWriteonly)?;
        writer.align()?;
        Ok(reader)
    }
}

fn flatten_to_casm(symtab: &SymbolTable) -> Result<Vec<u8>> {
    let mut stream = IntStream::new();
    FlattenAst::new(symtab, &mut stream).flatten()?;
    casm::encode_casm(&stream)
}
