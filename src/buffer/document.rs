//! 編集セッションのファサード
//!
//! チャンクバッファとUndoスタックを束ね、すべての変更をコマンド経由で
//! 流す。表示層が購読する状態変化は通知キューに積み、`take_notices` で
//! 引き取ってもらう（元実装のシグナルに相当）。

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{
    BufferError, ByteSource, ChunkedBuffer, EditCommand, FileSource, MemSource, UndoStack,
};

/// 表示層向けの状態変化通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    SizeChanged(u64),
    ModifiedChanged(bool),
    UndoAvailable(bool),
    RedoAvailable(bool),
}

/// 編集中のバイナリドキュメント
pub struct Document {
    /// ファイルパス
    path: Option<PathBuf>,
    /// バッファ本体
    buffer: ChunkedBuffer,
    /// Undo履歴
    undo_stack: UndoStack,
    /// 読み取り専用フラグ
    readonly: bool,
    /// 未回収の通知
    notices: VecDeque<Notice>,
    // 変化検出用の前回値
    last_size: u64,
    last_modified: bool,
    last_can_undo: bool,
    last_can_redo: bool,
}

impl Document {
    /// 空のドキュメントを作成
    pub fn new() -> Self {
        Self {
            path: None,
            buffer: ChunkedBuffer::new(),
            undo_stack: UndoStack::new(),
            readonly: false,
            notices: VecDeque::new(),
            last_size: 0,
            last_modified: false,
            last_can_undo: false,
            last_can_redo: false,
        }
    }

    /// バイト列から作成
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mut doc = Self::new();
        doc.set_source(Box::new(MemSource::new(data)));
        doc
    }

    /// ファイルから読み込み（読み取り専用mmap）
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BufferError> {
        let path = path.into();
        let source = FileSource::open(&path)?;
        let mut doc = Self::new();
        doc.set_source(Box::new(source));
        tracing::debug!(path = %path.display(), bytes = doc.len(), "opened");
        doc.path = Some(path);
        Ok(doc)
    }

    /// ソースを差し替える。Undo履歴は破棄
    pub fn set_source(&mut self, source: Box<dyn ByteSource>) {
        self.buffer.set_source(source);
        self.undo_stack.clear();
        self.publish();
    }

    fn write_to_path(&self, path: &Path) -> Result<(), BufferError> {
        // いったんテンポラリへ流してからrenameで置き換える。mmap中の元
        // inodeを壊さないので、保存後もクリーン領域の読み出しとUndoが生きる
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.buffer.write(tmp.as_file_mut(), 0, u64::MAX)?;
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|e| BufferError::Io(e.error))?;
        tracing::debug!(path = %path.display(), bytes = self.len(), "saved");
        Ok(())
    }

    /// ファイルに保存し、現在位置を保存済みとする
    pub fn save(&mut self) -> Result<(), BufferError> {
        let Some(path) = self.path.clone() else {
            return Err(BufferError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no file path set",
            )));
        };
        self.write_to_path(&path)?;
        self.undo_stack.set_clean();
        self.publish();
        Ok(())
    }

    /// 別名で保存
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<(), BufferError> {
        let path = path.into();
        self.write_to_path(&path)?;
        self.path = Some(path);
        self.undo_stack.set_clean();
        self.publish();
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 内側のバッファ（読み取り用途）
    pub fn buffer(&self) -> &ChunkedBuffer {
        &self.buffer
    }

    /// 指定位置のバイトを取得
    pub fn get(&self, pos: u64) -> Option<u8> {
        self.buffer.get(pos)
    }

    /// `pos` から最大 `count` バイトを読む（範囲はクランプ）
    pub fn data(&self, pos: u64, count: u64) -> Result<Vec<u8>, BufferError> {
        self.buffer.data(pos, count)
    }

    /// `data` に変更フラグ列を添えて返す
    pub fn data_marked(&self, pos: u64, count: u64) -> Result<(Vec<u8>, Vec<bool>), BufferError> {
        self.buffer.data_marked(pos, count)
    }

    /// `pos` から `count` バイトをシンクへ書き出す（バッファは不変）
    pub fn write<W: Write>(&self, sink: &mut W, pos: u64, count: u64) -> Result<(), BufferError> {
        self.buffer.write(sink, pos, count)
    }

    fn push(&mut self, command: EditCommand) -> Result<u64, BufferError> {
        let pos = self.undo_stack.push(&mut self.buffer, command)?;
        self.publish();
        Ok(pos)
    }

    /// 1バイト挿入
    pub fn insert_byte(&mut self, pos: u64, value: u8) -> Result<(), BufferError> {
        self.check_insert_pos(pos)?;
        self.push(EditCommand::InsertByte { pos, value })?;
        Ok(())
    }

    /// バイト列挿入
    pub fn insert_bytes(&mut self, pos: u64, bytes: Vec<u8>) -> Result<(), BufferError> {
        self.check_insert_pos(pos)?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.push(EditCommand::InsertByteArray { pos, bytes })?;
        Ok(())
    }

    /// `[pos, pos+len)` を削除
    pub fn remove_range(&mut self, pos: u64, len: u64) -> Result<(), BufferError> {
        if len == 0 {
            return Ok(());
        }
        let removed = self.checked_read(pos, len)?;
        self.push(EditCommand::RemoveRange { pos, removed })?;
        Ok(())
    }

    /// 1バイト上書き
    pub fn overwrite_byte(&mut self, pos: u64, value: u8) -> Result<(), BufferError> {
        let old_value = self.checked_read(pos, 1)?[0];
        self.push(EditCommand::OverwriteByte { pos, old_value, new_value: value })?;
        Ok(())
    }

    /// `[pos, pos+len)` を `bytes` で置き換える（長さが違ってもよい）
    pub fn replace_bytes(&mut self, pos: u64, len: u64, bytes: &[u8]) -> Result<(), BufferError> {
        let old_bytes = self.checked_read(pos, len)?;
        if old_bytes == bytes {
            return Ok(());
        }
        self.push(EditCommand::OverwriteByteArray {
            pos,
            old_bytes,
            new_bytes: bytes.to_vec(),
        })?;
        Ok(())
    }

    fn check_insert_pos(&self, pos: u64) -> Result<(), BufferError> {
        if pos > self.len() {
            return Err(BufferError::OutOfRange { pos, len: 0, size: self.len() });
        }
        Ok(())
    }

    /// 変更系の事前条件チェックを兼ねた読み取り（範囲外は即エラー）
    fn checked_read(&self, pos: u64, len: u64) -> Result<Vec<u8>, BufferError> {
        if pos.checked_add(len).is_none_or(|end| end > self.len()) {
            return Err(BufferError::OutOfRange { pos, len, size: self.len() });
        }
        self.buffer.data(pos, len)
    }

    /// 直前の操作を取り消す。作用位置を返す（境界では `None`）
    pub fn undo(&mut self) -> Result<Option<u64>, BufferError> {
        let pos = self.undo_stack.undo(&mut self.buffer)?;
        self.publish();
        Ok(pos)
    }

    /// 取り消した操作をやり直す
    pub fn redo(&mut self) -> Result<Option<u64>, BufferError> {
        let pos = self.undo_stack.redo(&mut self.buffer)?;
        self.publish();
        Ok(pos)
    }

    /// 保存済み位置まで巻き戻す（保存点が失われていれば何もしない）
    pub fn revert_to_clean(&mut self) -> Result<Option<u64>, BufferError> {
        let Some(clean) = self.undo_stack.clean_index() else {
            return Ok(None);
        };
        let pos = self.undo_stack.set_index(&mut self.buffer, clean)?;
        self.publish();
        Ok(pos)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_stack.can_redo()
    }

    pub fn is_modified(&self) -> bool {
        self.undo_stack.is_modified()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// ファイル名を取得
    pub fn filename(&self) -> Option<&str> {
        self.path.as_ref().and_then(|p| p.file_name()).and_then(|s| s.to_str())
    }

    /// 溜まった通知を引き取る
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// 状態変化を通知キューへ反映する
    fn publish(&mut self) {
        let size = self.buffer.size();
        if size != self.last_size {
            self.last_size = size;
            self.notices.push_back(Notice::SizeChanged(size));
        }
        let modified = self.undo_stack.is_modified();
        if modified != self.last_modified {
            self.last_modified = modified;
            self.notices.push_back(Notice::ModifiedChanged(modified));
        }
        let can_undo = self.undo_stack.can_undo();
        if can_undo != self.last_can_undo {
            self.last_can_undo = can_undo;
            self.notices.push_back(Notice::UndoAvailable(can_undo));
        }
        let can_redo = self.undo_stack.can_redo();
        if can_redo != self.last_can_redo {
            self.last_can_redo = can_redo;
            self.notices.push_back(Notice::RedoAvailable(can_redo));
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
