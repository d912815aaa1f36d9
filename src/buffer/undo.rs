//! Undo/Redoコマンドログ
//!
//! すべての変更を自己逆変換可能なコマンドとして積む。スタックは実行位置
//! `index` と保存位置 `clean_index` を持ち、`index != clean_index` が
//! 「変更あり」。単発バイト編集の連続（ニブル入力や連打削除）は直前の
//! コマンドへ統合され、1回のUndoで巻き戻せる1ステップになる。

use super::{BufferError, ChunkedBuffer};

/// 編集コマンド
///
/// それぞれが取り消しに必要なデータを自分で抱える。積まれた後に変わるのは
/// 統合可否フラグだけで、中身は統合時以外は不変。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    InsertByte { pos: u64, value: u8 },
    InsertByteArray { pos: u64, bytes: Vec<u8> },
    RemoveRange { pos: u64, removed: Vec<u8> },
    OverwriteByte { pos: u64, old_value: u8, new_value: u8 },
    /// 長さの異なる置換も表せる上書き（適用は削除+挿入）
    OverwriteByteArray { pos: u64, old_bytes: Vec<u8>, new_bytes: Vec<u8> },
}

impl EditCommand {
    /// コマンドが作用する先頭バイト位置
    pub fn pos(&self) -> u64 {
        match self {
            EditCommand::InsertByte { pos, .. }
            | EditCommand::InsertByteArray { pos, .. }
            | EditCommand::RemoveRange { pos, .. }
            | EditCommand::OverwriteByte { pos, .. }
            | EditCommand::OverwriteByteArray { pos, .. } => *pos,
        }
    }

    fn apply(&self, buffer: &mut ChunkedBuffer) -> Result<(), BufferError> {
        match self {
            EditCommand::InsertByte { pos, value } => buffer.insert_byte(*pos, *value),
            EditCommand::InsertByteArray { pos, bytes } => buffer.insert_bytes(*pos, bytes),
            EditCommand::RemoveRange { pos, removed } => {
                buffer.remove_range(*pos, removed.len() as u64)
            }
            EditCommand::OverwriteByte { pos, new_value, .. } => {
                buffer.overwrite_byte(*pos, *new_value)
            }
            EditCommand::OverwriteByteArray { pos, old_bytes, new_bytes } => {
                if old_bytes.len() == new_bytes.len() {
                    buffer.overwrite_bytes(*pos, new_bytes)
                } else {
                    buffer.remove_range(*pos, old_bytes.len() as u64)?;
                    buffer.insert_bytes(*pos, new_bytes)
                }
            }
        }
    }

    fn revert(&self, buffer: &mut ChunkedBuffer) -> Result<(), BufferError> {
        match self {
            EditCommand::InsertByte { pos, .. } => buffer.remove_range(*pos, 1),
            EditCommand::InsertByteArray { pos, bytes } => {
                buffer.remove_range(*pos, bytes.len() as u64)
            }
            EditCommand::RemoveRange { pos, removed } => buffer.insert_bytes(*pos, removed),
            EditCommand::OverwriteByte { pos, old_value, .. } => {
                buffer.overwrite_byte(*pos, *old_value)
            }
            EditCommand::OverwriteByteArray { pos, old_bytes, new_bytes } => {
                if old_bytes.len() == new_bytes.len() {
                    buffer.overwrite_bytes(*pos, old_bytes)
                } else {
                    buffer.remove_range(*pos, new_bytes.len() as u64)?;
                    buffer.insert_bytes(*pos, old_bytes)
                }
            }
        }
    }

    /// `next` を自分へ取り込めたら `true`
    ///
    /// 統合できるのはバイト単位編集の連続だけ：同一バイトへの上書き
    /// （2ニブル入力）、隣接バイトへの上書き・挿入、同位置/直前位置の
    /// 1バイト削除（Delete連打・Backspace連打）。
    fn merge(&mut self, next: &EditCommand) -> bool {
        enum Outcome {
            No,
            Done,
            Promote(EditCommand),
        }

        let outcome = match (&mut *self, next) {
            (
                EditCommand::OverwriteByte { pos, old_value, new_value },
                EditCommand::OverwriteByte { pos: np, old_value: no, new_value: nn },
            ) => {
                if *np == *pos && *no == *new_value {
                    *new_value = *nn;
                    Outcome::Done
                } else if *np == *pos + 1 {
                    Outcome::Promote(EditCommand::OverwriteByteArray {
                        pos: *pos,
                        old_bytes: vec![*old_value, *no],
                        new_bytes: vec![*new_value, *nn],
                    })
                } else {
                    Outcome::No
                }
            }
            (
                EditCommand::OverwriteByteArray { pos, old_bytes, new_bytes },
                EditCommand::OverwriteByte { pos: np, old_value: no, new_value: nn },
            ) if old_bytes.len() == new_bytes.len() => {
                let end = *pos + new_bytes.len() as u64;
                if *np == end {
                    old_bytes.push(*no);
                    new_bytes.push(*nn);
                    Outcome::Done
                } else if *np + 1 == end && new_bytes.last() == Some(no) {
                    // 末尾バイトへの2ニブル目
                    if let Some(last) = new_bytes.last_mut() {
                        *last = *nn;
                    }
                    Outcome::Done
                } else {
                    Outcome::No
                }
            }
            (
                EditCommand::InsertByte { pos, value },
                EditCommand::InsertByte { pos: np, value: nv },
            ) if *np == *pos + 1 => Outcome::Promote(EditCommand::InsertByteArray {
                pos: *pos,
                bytes: vec![*value, *nv],
            }),
            (
                EditCommand::InsertByteArray { pos, bytes },
                EditCommand::InsertByte { pos: np, value: nv },
            ) if *np == *pos + bytes.len() as u64 => {
                bytes.push(*nv);
                Outcome::Done
            }
            (
                EditCommand::RemoveRange { pos, removed },
                EditCommand::RemoveRange { pos: np, removed: nr },
            ) if nr.len() == 1 => {
                if *np == *pos {
                    // Delete：後続バイトを続けて削った
                    removed.extend_from_slice(nr);
                    Outcome::Done
                } else if *np + 1 == *pos {
                    // Backspace：手前のバイトを削った
                    *pos = *np;
                    removed.insert(0, nr[0]);
                    Outcome::Done
                } else {
                    Outcome::No
                }
            }
            _ => Outcome::No,
        };

        match outcome {
            Outcome::No => false,
            Outcome::Done => true,
            Outcome::Promote(command) => {
                *self = command;
                true
            }
        }
    }
}

struct Entry {
    command: EditCommand,
    /// 次のpushでの統合対象になれるか。Undo/Redoで折り返したら閉じる
    mergeable: bool,
}

/// 多段Undo/Redoスタック
pub struct UndoStack {
    entries: Vec<Entry>,
    /// 次に実行（Redo）するコマンドの位置。`[0, entries.len()]`
    index: usize,
    /// 保存済みとみなす位置。保存点が履歴ごと切り捨てられたら `None`
    clean_index: Option<usize>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            // 読み込み直後のバッファはそれ自体が保存済み状態
            clean_index: Some(0),
        }
    }

    /// コマンドを適用して積む。Redo側の履歴は捨てる
    ///
    /// 戻り値はコマンドの作用位置（カーソル追従用）。
    pub fn push(
        &mut self,
        buffer: &mut ChunkedBuffer,
        command: EditCommand,
    ) -> Result<u64, BufferError> {
        command.apply(buffer)?;
        let pos = command.pos();

        if self.index < self.entries.len() {
            self.entries.truncate(self.index);
            if self.clean_index.is_some_and(|clean| clean > self.index) {
                self.clean_index = None;
            }
        }

        // 統合は保存点の直後には行わない（変更ありへの遷移が消えるため）
        if self.index > 0 && self.clean_index != Some(self.index) {
            let last = &mut self.entries[self.index - 1];
            if last.mergeable && last.command.merge(&command) {
                return Ok(pos);
            }
        }

        self.entries.push(Entry { command, mergeable: true });
        self.index += 1;
        Ok(pos)
    }

    /// 直前のコマンドを取り消す。境界ではノーオペで `None`
    pub fn undo(&mut self, buffer: &mut ChunkedBuffer) -> Result<Option<u64>, BufferError> {
        if self.index == 0 {
            return Ok(None);
        }
        let entry = &self.entries[self.index - 1];
        entry.command.revert(buffer)?;
        let pos = entry.command.pos();
        self.index -= 1;
        self.entries[self.index].mergeable = false;
        Ok(Some(pos))
    }

    /// 取り消したコマンドをやり直す。境界ではノーオペで `None`
    pub fn redo(&mut self, buffer: &mut ChunkedBuffer) -> Result<Option<u64>, BufferError> {
        if self.index >= self.entries.len() {
            return Ok(None);
        }
        let entry = &self.entries[self.index];
        entry.command.apply(buffer)?;
        let pos = entry.command.pos();
        self.entries[self.index].mergeable = false;
        self.index += 1;
        Ok(Some(pos))
    }

    /// `target` までUndo/Redoを繰り返して実行位置を合わせる
    ///
    /// 保存位置への巻き戻し（revert）に使う。最後に作用した位置を返す。
    pub fn set_index(
        &mut self,
        buffer: &mut ChunkedBuffer,
        target: usize,
    ) -> Result<Option<u64>, BufferError> {
        let target = target.min(self.entries.len());
        let mut last = None;
        while self.index > target {
            last = self.undo(buffer)?;
        }
        while self.index < target {
            last = self.redo(buffer)?;
        }
        Ok(last)
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.entries.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 保存済み位置（未設定・到達不能なら `None`）
    pub fn clean_index(&self) -> Option<usize> {
        self.clean_index
    }

    /// 現在位置を保存済みとする
    pub fn set_clean(&mut self) {
        self.clean_index = Some(self.index);
    }

    pub fn is_modified(&self) -> bool {
        match self.clean_index {
            None => true,
            Some(clean) => clean != self.index,
        }
    }

    /// 全履歴を捨てる（ソース差し替え時）
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
        self.clean_index = Some(0);
    }

    /// 積まれているコマンド数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemSource;

    fn buffer(bytes: &[u8]) -> ChunkedBuffer {
        ChunkedBuffer::from_source(Box::new(MemSource::new(bytes.to_vec())))
    }

    fn contents(buffer: &ChunkedBuffer) -> Vec<u8> {
        buffer.data(0, u64::MAX).unwrap()
    }

    #[test]
    fn insert_undo_redo() {
        // "Hello" に 0x21 を追記 → Undo → Redo
        let mut buf = buffer(&[0x48, 0x65, 0x6C, 0x6C, 0x6F]);
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::InsertByte { pos: 5, value: 0x21 })
            .unwrap();
        assert_eq!(contents(&buf), &[0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x21]);
        assert_eq!(stack.undo(&mut buf).unwrap(), Some(5));
        assert_eq!(contents(&buf), &[0x48, 0x65, 0x6C, 0x6C, 0x6F]);
        assert_eq!(stack.redo(&mut buf).unwrap(), Some(5));
        assert_eq!(contents(&buf), &[0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x21]);
    }

    #[test]
    fn boundary_is_noop() {
        let mut buf = buffer(b"ab");
        let mut stack = UndoStack::new();
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
        assert_eq!(stack.undo(&mut buf).unwrap(), None);
        assert_eq!(stack.redo(&mut buf).unwrap(), None);
        assert_eq!(contents(&buf), b"ab");
    }

    #[test]
    fn undo_redo_round_trip_every_depth() {
        let mut buf = buffer(b"0123456789");
        let mut stack = UndoStack::new();
        let commands = [
            EditCommand::OverwriteByte { pos: 0, old_value: b'0', new_value: 0xAA },
            EditCommand::RemoveRange { pos: 3, removed: b"34".to_vec() },
            EditCommand::InsertByteArray { pos: 1, bytes: vec![1, 2, 3] },
            EditCommand::OverwriteByteArray {
                pos: 2,
                old_bytes: vec![2, 3],
                new_bytes: vec![9, 9, 9, 9],
            },
        ];
        let mut snapshots = vec![contents(&buf)];
        for command in commands {
            stack.push(&mut buf, command).unwrap();
            snapshots.push(contents(&buf));
        }
        let final_state = contents(&buf);
        for depth in 1..=snapshots.len() - 1 {
            for _ in 0..depth {
                stack.undo(&mut buf).unwrap();
            }
            assert_eq!(contents(&buf), snapshots[snapshots.len() - 1 - depth]);
            for _ in 0..depth {
                stack.redo(&mut buf).unwrap();
            }
            assert_eq!(contents(&buf), final_state);
        }
    }

    #[test]
    fn push_discards_redo_tail() {
        let mut buf = buffer(b"abc");
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: b'a', new_value: b'X' })
            .unwrap();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 2, old_value: b'c', new_value: b'Y' })
            .unwrap();
        stack.undo(&mut buf).unwrap();
        assert!(stack.can_redo());
        stack
            .push(&mut buf, EditCommand::InsertByte { pos: 0, value: b'!' })
            .unwrap();
        assert!(!stack.can_redo());
        assert_eq!(stack.len(), 2);
        assert_eq!(contents(&buf), b"!Xbc");
    }

    #[test]
    fn clean_index_tracks_saved_state() {
        let mut buf = buffer(b"abc");
        let mut stack = UndoStack::new();
        // 読み込み直後は未変更
        assert!(!stack.is_modified());

        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: b'a', new_value: b'X' })
            .unwrap();
        assert!(stack.is_modified());

        stack.set_clean();
        assert!(!stack.is_modified());

        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 1, old_value: b'b', new_value: b'Y' })
            .unwrap();
        assert!(stack.is_modified());

        // 保存位置までUndoすれば未変更へ戻る
        stack.undo(&mut buf).unwrap();
        assert!(!stack.is_modified());
    }

    #[test]
    fn clean_index_lost_when_truncated() {
        let mut buf = buffer(b"abc");
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: b'a', new_value: b'X' })
            .unwrap();
        stack.set_clean(); // clean = 1
        stack.undo(&mut buf).unwrap();
        // 保存点より手前で新しい編集 → 保存点は履歴ごと消える
        stack
            .push(&mut buf, EditCommand::InsertByte { pos: 0, value: b'!' })
            .unwrap();
        assert_eq!(stack.clean_index(), None);
        assert!(stack.is_modified());
        // どこへ動かしても未変更にはならない
        stack.undo(&mut buf).unwrap();
        assert!(stack.is_modified());
    }

    #[test]
    fn nibble_pair_merges_into_one_step() {
        // 同一バイトへの2回の上書き（上位ニブル→確定値）は1ステップ
        let mut buf = buffer(&[0x00, 0x11]);
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: 0x00, new_value: 0xA0 })
            .unwrap();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: 0xA0, new_value: 0xAB })
            .unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(contents(&buf), &[0xAB, 0x11]);
        stack.undo(&mut buf).unwrap();
        assert_eq!(contents(&buf), &[0x00, 0x11]);
    }

    #[test]
    fn adjacent_overwrites_merge_into_one_step() {
        // 連続する5バイトの打ち込みが1回のUndoで戻る
        let mut buf = buffer(&[0u8; 8]);
        let mut stack = UndoStack::new();
        for pos in 0..5u64 {
            stack
                .push(
                    &mut buf,
                    EditCommand::OverwriteByte { pos, old_value: 0, new_value: 0x10 + pos as u8 },
                )
                .unwrap();
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(contents(&buf), &[0x10, 0x11, 0x12, 0x13, 0x14, 0, 0, 0]);
        stack.undo(&mut buf).unwrap();
        assert_eq!(contents(&buf), &[0u8; 8]);
        assert!(!stack.can_undo());
    }

    #[test]
    fn merged_run_accepts_trailing_nibble_fix() {
        // 連結済みバーストの末尾バイトに2ニブル目が来るケース
        let mut buf = buffer(&[0u8; 4]);
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: 0, new_value: 0x10 })
            .unwrap();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 1, old_value: 0, new_value: 0xA0 })
            .unwrap();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 1, old_value: 0xA0, new_value: 0xAB })
            .unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(contents(&buf), &[0x10, 0xAB, 0, 0]);
        stack.undo(&mut buf).unwrap();
        assert_eq!(contents(&buf), &[0u8; 4]);
    }

    #[test]
    fn backspace_run_merges() {
        let mut buf = buffer(b"abcdef");
        let mut stack = UndoStack::new();
        // pos 3, 2, 1 の順で1バイトずつ削る（Backspace連打）
        for pos in [3u64, 2, 1] {
            let removed = buf.data(pos, 1).unwrap();
            stack
                .push(&mut buf, EditCommand::RemoveRange { pos, removed })
                .unwrap();
        }
        assert_eq!(stack.len(), 1);
        assert_eq!(contents(&buf), b"aef");
        stack.undo(&mut buf).unwrap();
        assert_eq!(contents(&buf), b"abcdef");
    }

    #[test]
    fn no_merge_across_clean_point() {
        let mut buf = buffer(&[0u8; 4]);
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: 0, new_value: 1 })
            .unwrap();
        stack.set_clean();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 1, old_value: 0, new_value: 2 })
            .unwrap();
        // 統合されていれば index が保存位置のまま動かず「未変更」に見えてしまう
        assert_eq!(stack.len(), 2);
        assert!(stack.is_modified());
    }

    #[test]
    fn no_merge_after_undo_redo() {
        let mut buf = buffer(&[0u8; 4]);
        let mut stack = UndoStack::new();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 0, old_value: 0, new_value: 1 })
            .unwrap();
        stack.undo(&mut buf).unwrap();
        stack.redo(&mut buf).unwrap();
        stack
            .push(&mut buf, EditCommand::OverwriteByte { pos: 1, old_value: 0, new_value: 2 })
            .unwrap();
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn variable_length_overwrite_round_trips() {
        let mut buf = buffer(b"aXXb");
        let mut stack = UndoStack::new();
        stack
            .push(
                &mut buf,
                EditCommand::OverwriteByteArray {
                    pos: 1,
                    old_bytes: b"XX".to_vec(),
                    new_bytes: b"12345".to_vec(),
                },
            )
            .unwrap();
        assert_eq!(contents(&buf), b"a12345b");
        stack.undo(&mut buf).unwrap();
        assert_eq!(contents(&buf), b"aXXb");
        stack.redo(&mut buf).unwrap();
        assert_eq!(contents(&buf), b"a12345b");
    }

    #[test]
    fn set_index_walks_to_clean() {
        let mut buf = buffer(b"abc");
        let mut stack = UndoStack::new();
        for (pos, value) in [(0u64, b'X'), (1, b'Y'), (2, b'Z')] {
            let old = buf.get(pos).unwrap();
            stack
                .push(
                    &mut buf,
                    EditCommand::OverwriteByte { pos, old_value: old, new_value: value },
                )
                .unwrap();
            stack.entries.last_mut().unwrap().mergeable = false; // 個別ステップとして検査
        }
        stack.set_index(&mut buf, 0).unwrap();
        assert_eq!(contents(&buf), b"abc");
        assert!(!stack.is_modified());
        stack.set_index(&mut buf, 3).unwrap();
        assert_eq!(contents(&buf), b"XYZ");
    }
}
