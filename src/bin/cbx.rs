//! cbx - パイプ向けバイナリ操作ツール
//!
//! エディタと同じチャンクバッファ・検索・置換コアをCLIから使う。

use std::io::{self, BufWriter, Read, Write};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use chx::buffer::{replace_all, ChunkedBuffer, Document, FileSource, MemSource, SearchEngine};
use chx::dump;

/// Binary tool for pipes, sharing the chx editor core
#[derive(Parser, Debug)]
#[command(name = "cbx")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find hex pattern, output matching offsets
    Find {
        /// Hex pattern to search (e.g., "DEADBEEF" or "DE AD BE EF")
        pattern: String,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,

        /// Output format: "hex" (default), "dec", "both"
        #[arg(short, long, default_value = "hex")]
        format: String,
    },

    /// Extract byte range from input
    Slice {
        /// Range in format "start:end" (hex with 0x prefix, or decimal)
        /// Examples: "0:100", "0x100:0x200", "100:"
        range: String,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Replace hex pattern
    Replace {
        /// Pattern to find (hex)
        from: String,

        /// Pattern to replace with (hex)
        to: String,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,

        /// Replace all occurrences (default: first only)
        #[arg(short, long)]
        all: bool,
    },

    /// Patch bytes at specific offsets
    Patch {
        /// Patches in format "offset=hexvalue" (e.g., "0x100=FF" "0x200=DEAD")
        patches: Vec<String>,

        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Readable hex dump (offset, hex, ascii columns)
    Dump {
        /// Input file (default: stdin)
        #[arg(short, long)]
        input: Option<String>,

        /// Minimum offset digits
        #[arg(short, long, default_value = "8")]
        width: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Find { pattern, input, format } => cmd_find(&pattern, input.as_deref(), &format),
        Command::Slice { range, input } => cmd_slice(&range, input.as_deref()),
        Command::Replace { from, to, input, all } => {
            cmd_replace(&from, &to, input.as_deref(), all)
        }
        Command::Patch { patches, input } => cmd_patch(&patches, input.as_deref()),
        Command::Dump { input, width } => cmd_dump(input.as_deref(), width),
    }
}

/// 入力をチャンクバッファとして開く（ファイルはmmap、標準入力はメモリ）
fn open_buffer(path: Option<&str>) -> Result<ChunkedBuffer> {
    match path {
        Some(p) => Ok(ChunkedBuffer::from_source(Box::new(FileSource::open(p)?))),
        None => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(ChunkedBuffer::from_source(Box::new(MemSource::new(data))))
        }
    }
}

/// 入力を編集可能なドキュメントとして開く
fn open_document(path: Option<&str>) -> Result<Document> {
    match path {
        Some(p) => Ok(Document::open(p)?),
        None => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(Document::from_bytes(data))
        }
    }
}

/// HEX文字列をバイト列にパースする
fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if cleaned.len() % 2 != 0 {
        bail!("Hex string must have even length");
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|e| anyhow::anyhow!("Invalid hex: {e}"))
        })
        .collect()
}

/// オフセットをパースする（0x prefix で16進数、それ以外は10進数）
fn parse_offset(s: &str) -> Result<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| anyhow::anyhow!("Invalid hex offset: {e}"))
    } else {
        s.parse().map_err(|e| anyhow::anyhow!("Invalid offset: {e}"))
    }
}

/// "start:end" 形式の範囲をパースする
fn parse_range(s: &str, size: u64) -> Result<(u64, u64)> {
    let Some((start, end)) = s.split_once(':') else {
        bail!("Range must be in format 'start:end'");
    };
    let start = if start.is_empty() { 0 } else { parse_offset(start)? };
    let end = if end.is_empty() { size } else { parse_offset(end)?.min(size) };
    if start > end {
        bail!("Range start {start} exceeds end {end}");
    }
    Ok((start, end))
}

// === Commands ===

fn cmd_find(pattern: &str, input: Option<&str>, format: &str) -> Result<()> {
    let buffer = open_buffer(input)?;
    let needle = parse_hex(pattern)?;
    if needle.is_empty() {
        bail!("Empty pattern");
    }

    let engine = SearchEngine::new();
    let mut from = 0u64;
    while let Some(pos) = engine.index_of(&buffer, &needle, from)? {
        match format {
            "dec" => println!("{pos}"),
            "both" => println!("0x{pos:08X} ({pos})"),
            _ => println!("0x{pos:08X}"),
        }
        from = pos + 1;
    }
    Ok(())
}

fn cmd_slice(range: &str, input: Option<&str>) -> Result<()> {
    let buffer = open_buffer(input)?;
    let (start, end) = parse_range(range, buffer.size())?;

    // バッファからストリームで書き出す（全体をメモリへ並べない）
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    buffer.write(&mut out, start, end - start)?;
    out.flush()?;
    Ok(())
}

fn cmd_replace(from: &str, to: &str, input: Option<&str>, all: bool) -> Result<()> {
    let mut doc = open_document(input)?;
    let from_bytes = parse_hex(from)?;
    let to_bytes = parse_hex(to)?;
    if from_bytes.is_empty() {
        bail!("Empty search pattern");
    }

    if all {
        replace_all(&mut doc, &from_bytes, &to_bytes)?;
    } else {
        let engine = SearchEngine::new();
        if let Some(pos) = engine.index_of(doc.buffer(), &from_bytes, 0)? {
            doc.replace_bytes(pos, from_bytes.len() as u64, &to_bytes)?;
        }
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    doc.write(&mut out, 0, u64::MAX)?;
    out.flush()?;
    Ok(())
}

fn cmd_patch(patches: &[String], input: Option<&str>) -> Result<()> {
    let mut doc = open_document(input)?;

    for patch in patches {
        let Some((offset, value)) = patch.split_once('=') else {
            bail!("Patch must be in format 'offset=hexvalue': {patch}");
        };
        let offset = parse_offset(offset)?;
        let value = parse_hex(value)?;
        if offset + value.len() as u64 > doc.len() {
            bail!(
                "Patch at {} with {} bytes exceeds file size {}",
                offset,
                value.len(),
                doc.len()
            );
        }
        doc.replace_bytes(offset, value.len() as u64, &value)?;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    doc.write(&mut out, 0, u64::MAX)?;
    out.flush()?;
    Ok(())
}

fn cmd_dump(input: Option<&str>, width: usize) -> Result<()> {
    let buffer = open_buffer(input)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    // 桁数は全体サイズで先に決めて、ブロック間で揃える
    let width = dump::address_width(width, buffer.size());

    // 行単位で読みながら整形する
    let block_lines = 4096u64;
    let block = block_lines * dump::BYTES_PER_LINE as u64;
    let mut offset = 0u64;
    while offset < buffer.size() {
        let data = buffer.data(offset, block)?;
        out.write_all(dump::to_readable(&data, offset, width).as_bytes())?;
        offset += data.len() as u64;
    }
    out.flush()?;
    Ok(())
}
