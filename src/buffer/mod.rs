//! バイナリ編集コア
//!
//! チャンク化バッファ、Undoスタック、カーソルモデル、検索エンジンからなる。
//! 表示層はこのモジュールの外側で、`Document` の公開APIだけを使う。

mod chunks;
mod cursor;
mod document;
mod search;
mod undo;

pub use chunks::ChunkedBuffer;
pub use cursor::{CursorModel, EditMode};
pub use document::{Document, Notice};
pub use search::{replace_all, SearchEngine};
pub use undo::{EditCommand, UndoStack};

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

/// クリーン領域のストリーミングと検索窓のブロックサイズ
pub const IO_BLOCK: usize = 0x10000;

/// バッファ操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 位置・長さがバッファ範囲を逸脱した（変更系操作の事前条件違反）
    #[error("position {pos} (+{len}) out of range for size {size}")]
    OutOfRange { pos: u64, len: u64, size: u64 },
}

/// バッキングソース：長さを報告でき、任意位置から読めるバイト列デバイス
pub trait ByteSource {
    /// ソース全体のバイト数
    fn len(&self) -> u64;

    /// `pos` から `buf` を埋められるだけ読む。読めたバイト数を返す
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize, BufferError>;
}

/// メモリ上のバイト列ソース
pub struct MemSource {
    data: Vec<u8>,
}

impl MemSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize, BufferError> {
        let pos = (pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - pos);
        buf[..n].copy_from_slice(&self.data[pos..pos + n]);
        Ok(n)
    }
}

/// ファイルソース（読み取り専用メモリマップ）
///
/// シークなしの任意位置読み取りのため mmap を使う。空ファイルはマップ不可の
/// 環境があるため `None` で持つ。
pub struct FileSource {
    map: Option<Mmap>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BufferError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let map = if len > 0 {
            // SAFETY: 読み取り専用マップ。編集はバッファ側のダーティチャンクが
            // 持つため、保存もテンポラリファイル経由のrenameで元inodeを壊さない
            Some(unsafe { Mmap::map(&file)? })
        } else {
            None
        };
        Ok(Self { map })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.map.as_ref().map_or(0, |m| m.len() as u64)
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<usize, BufferError> {
        let Some(map) = self.map.as_ref() else {
            return Ok(0);
        };
        let pos = (pos as usize).min(map.len());
        let n = buf.len().min(map.len() - pos);
        buf[..n].copy_from_slice(&map[pos..pos + n]);
        Ok(n)
    }
}
