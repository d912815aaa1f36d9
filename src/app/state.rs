use std::path::PathBuf;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};

use super::{Action, EditMode, KeyMod, PrefixKey};
use crate::buffer::{CursorModel, Document, Notice, SearchEngine};
use crate::clipboard::{self, HexFormat};
use crate::dump;
use crate::encoding::{self, CharEncoding};
use crate::ui::{HexView, ViewMode};

/// 置換モード状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    #[default]
    Off,
    /// 検索パターン入力中
    EnteringSearch,
    /// 置換パターン入力中
    EnteringReplace,
    /// 確認中（y/n/!/q）
    Confirming,
}

/// プロンプト入力モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptMode {
    #[default]
    Off,
    /// アドレスジャンプ入力中
    GotoAddress,
    /// ファイルパス入力中（開く）
    OpenFile,
    /// ファイルパス入力中（別名保存）
    SaveAs,
    /// コマンド入力中 (M-x)
    Command,
    /// コマンド引数入力中
    CommandArg,
}

/// 確認モード（未保存変更時）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmMode {
    #[default]
    Off,
    /// 終了確認
    Quit,
    /// ファイルを開く確認（パスを保持）
    OpenFile(String),
}

/// アプリケーション状態
pub struct App {
    /// 編集中のドキュメント
    document: Document,
    /// カーソルと選択
    cursor: CursorModel,
    /// 検索エンジン
    search: SearchEngine,
    /// 表示オフセット（バイト、行頭揃え）
    offset: u64,
    /// 表示可能な行数
    visible_rows: usize,
    /// HEX/ASCIIモード
    hex_mode: bool,
    /// 編集モード
    edit_mode: EditMode,
    /// マーク（C-space）が有効か。有効な間は移動で選択が伸びる
    mark_active: bool,
    /// プレフィックスキー状態（C-x等）
    prefix_key: PrefixKey,
    /// 文字エンコーディング
    encoding: CharEncoding,
    /// 終了フラグ
    should_quit: bool,
    /// ステータスメッセージ
    status_message: Option<String>,
    /// 検索モード
    search_mode: bool,
    /// 後方検索か
    search_backwards: bool,
    /// 検索クエリ（入力中の文字列）
    search_query: String,
    /// 前回の検索クエリ（検索再利用用）
    last_search_query: String,
    /// 検索開始位置（検索キャンセル時に戻る位置、バイト）
    search_start_pos: u64,
    /// 置換モード
    replace_mode: ReplaceMode,
    /// 置換先パターン
    replace_with: String,
    /// プロンプト入力モード
    prompt_mode: PromptMode,
    /// プロンプト入力内容
    prompt_input: String,
    /// 確認モード
    confirm_mode: ConfirmMode,
    /// 実行中のコマンド名（引数入力用）
    current_command: String,
}

impl App {
    /// 新しいアプリケーションを作成
    pub fn new(bytes_per_row: usize) -> Self {
        Self {
            document: Document::new(),
            cursor: CursorModel::new(bytes_per_row),
            search: SearchEngine::new(),
            offset: 0,
            visible_rows: 24,
            hex_mode: true,
            edit_mode: EditMode::Overwrite,
            mark_active: false,
            prefix_key: PrefixKey::None,
            encoding: CharEncoding::Utf8,
            should_quit: false,
            status_message: None,
            search_mode: false,
            search_backwards: false,
            search_query: String::new(),
            last_search_query: String::new(),
            search_start_pos: 0,
            replace_mode: ReplaceMode::Off,
            replace_with: String::new(),
            prompt_mode: PromptMode::Off,
            prompt_input: String::new(),
            confirm_mode: ConfirmMode::Off,
            current_command: String::new(),
        }
    }

    /// 全角英数記号（U+FF01〜U+FF5E）を半角に変換
    fn normalize_fullwidth(c: char) -> char {
        let cp = c as u32;
        if (0xFF01..=0xFF5E).contains(&cp) {
            char::from_u32(cp - 0xFF00 + 0x20).unwrap_or(c)
        } else if c == '　' {
            ' '
        } else {
            c
        }
    }

    /// HEX文字の正規化（全角→半角、小文字→大文字）
    fn normalize_hex_char(c: char) -> Option<char> {
        let c = Self::normalize_fullwidth(c).to_ascii_uppercase();
        c.is_ascii_hexdigit().then_some(c)
    }

    /// ファイルを開く
    pub fn open(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.document = Document::open(path)?;
        self.after_load();
        Ok(())
    }

    /// バイト列から読み込み（標準入力用）
    pub fn load_bytes(&mut self, data: Vec<u8>) {
        self.document = Document::from_bytes(data);
        self.after_load();
    }

    fn after_load(&mut self) {
        self.offset = 0;
        self.cursor.set_position(0, self.document.len(), self.edit_mode);
        self.cursor.reset_selection();
        self.mark_active = false;
        self.document.take_notices();
    }

    /// 終了すべきかどうか
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// ファイル名を取得
    pub fn filename(&self) -> Option<&str> {
        self.document.filename()
    }

    /// 変更されているかどうか
    pub fn is_modified(&self) -> bool {
        self.document.is_modified()
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.document.set_readonly(readonly);
    }

    /// ドキュメントから溜まった通知を引き取る（タイトル更新用）
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.document.take_notices()
    }

    /// 表示可能行数を設定
    pub fn set_visible_rows(&mut self, rows: usize) {
        self.visible_rows = rows.saturating_sub(2).max(1); // ヘッダー＋ステータス分
        self.cursor.set_visible_rows(self.visible_rows);
    }

    fn size(&self) -> u64 {
        self.document.len()
    }

    /// カーソル位置が表示範囲内になるようにスクロール
    fn ensure_cursor_visible(&mut self) {
        let bpr = self.cursor.bytes_per_line() as u64;
        let cursor_row = self.cursor.byte_position() / bpr;
        let offset_row = self.offset / bpr;
        let rows = self.visible_rows as u64;

        if cursor_row < offset_row {
            self.offset = cursor_row * bpr;
        } else if cursor_row >= offset_row + rows {
            self.offset = (cursor_row - rows + 1) * bpr;
        }
    }

    /// 移動後の共通処理（マーク中なら選択を伸ばす）
    fn after_move(&mut self) {
        if self.mark_active {
            self.cursor.extend_selection();
        } else {
            self.cursor.reset_selection();
        }
        self.ensure_cursor_visible();
    }

    /// 選択付き移動（Shift+矢印）
    fn select_move(&mut self, movement: impl FnOnce(&mut CursorModel, u64, EditMode)) {
        let size = self.size();
        let mode = self.edit_mode;
        self.mark_active = true;
        movement(&mut self.cursor, size, mode);
        self.cursor.extend_selection();
        self.ensure_cursor_visible();
    }

    /// HEX入力処理（1桁＝1ニブル）
    fn input_hex(&mut self, ch: char) {
        if self.document.is_readonly() {
            return;
        }
        let Some(digit) = Self::normalize_hex_char(ch).and_then(|c| c.to_digit(16)) else {
            return;
        };
        let digit = digit as u8;
        let byte_pos = self.cursor.byte_position();

        let result = if self.cursor.nibble() == 0 {
            // 上位ニブル
            match self.edit_mode {
                EditMode::Overwrite => {
                    let Some(current) = self.document.get(byte_pos) else {
                        return;
                    };
                    self.document.overwrite_byte(byte_pos, (digit << 4) | (current & 0x0F))
                }
                EditMode::Insert => self.document.insert_byte(byte_pos, digit << 4),
            }
        } else {
            // 下位ニブル：1桁目で入ったバイトを確定させる
            let Some(current) = self.document.get(byte_pos) else {
                return;
            };
            self.document.overwrite_byte(byte_pos, (current & 0xF0) | digit)
        };

        match result {
            Ok(()) => {
                self.cursor.set_position(
                    self.cursor.position() as i64 + 1,
                    self.size(),
                    self.edit_mode,
                );
                self.mark_active = false;
                self.cursor.reset_selection();
                self.ensure_cursor_visible();
            }
            Err(e) => self.status_message = Some(format!("Edit failed: {e}")),
        }
    }

    /// ASCII入力処理（文字をバッファのエンコーディングに変換して入力）
    fn input_ascii(&mut self, ch: char) {
        if self.document.is_readonly() {
            return;
        }
        let Some(bytes) = encoding::encode_char(ch, self.encoding) else {
            self.status_message =
                Some(format!("Cannot encode '{}' in {}", ch, self.encoding.name()));
            return;
        };
        if bytes.is_empty() {
            return;
        }

        let pos = self.cursor.byte_position();
        let result = match self.edit_mode {
            EditMode::Overwrite => {
                // 末尾へはみ出す分は追記になる
                let fit = (self.size() - pos).min(bytes.len() as u64) as usize;
                self.document
                    .replace_bytes(pos, fit as u64, &bytes[..fit])
                    .and_then(|()| self.document.insert_bytes(pos + fit as u64, bytes[fit..].to_vec()))
            }
            EditMode::Insert => self.document.insert_bytes(pos, bytes.clone()),
        };

        match result {
            Ok(()) => {
                self.cursor.set_position(
                    (2 * (pos + bytes.len() as u64)) as i64,
                    self.size(),
                    self.edit_mode,
                );
                self.mark_active = false;
                self.cursor.reset_selection();
                self.ensure_cursor_visible();
            }
            Err(e) => self.status_message = Some(format!("Edit failed: {e}")),
        }
    }

    /// カーソル位置（または選択範囲）のバイトを削除
    ///
    /// 上書きモードではゼロ埋め、挿入モードでは詰める。
    fn delete_byte(&mut self) {
        if self.document.is_readonly() {
            return;
        }
        let result = if let Some((begin, end)) = self.cursor.selection() {
            let len = end - begin;
            let r = match self.edit_mode {
                EditMode::Overwrite => {
                    self.document.replace_bytes(begin, len, &vec![0u8; len as usize])
                }
                EditMode::Insert => self.document.remove_range(begin, len),
            };
            self.cursor.set_position(2 * begin as i64, self.size(), self.edit_mode);
            r
        } else {
            let pos = self.cursor.byte_position();
            if pos >= self.size() {
                return;
            }
            let r = match self.edit_mode {
                EditMode::Overwrite => self.document.overwrite_byte(pos, 0),
                EditMode::Insert => self.document.remove_range(pos, 1),
            };
            self.cursor.set_position(2 * pos as i64, self.size(), self.edit_mode);
            r
        };
        if let Err(e) = result {
            self.status_message = Some(format!("Delete failed: {e}"));
        }
        self.mark_active = false;
        self.cursor.reset_selection();
        self.ensure_cursor_visible();
    }

    /// 手前のバイトを削除
    fn delete_byte_back(&mut self) {
        if self.document.is_readonly() {
            return;
        }
        if self.cursor.has_selection() {
            self.delete_byte();
            return;
        }
        let pos = self.cursor.byte_position();
        if pos == 0 {
            return;
        }
        let pos = pos - 1;
        let result = match self.edit_mode {
            EditMode::Overwrite => self.document.overwrite_byte(pos, 0),
            EditMode::Insert => self.document.remove_range(pos, 1),
        };
        if let Err(e) = result {
            self.status_message = Some(format!("Delete failed: {e}"));
        }
        self.cursor.set_position(2 * pos as i64, self.size(), self.edit_mode);
        self.mark_active = false;
        self.cursor.reset_selection();
        self.ensure_cursor_visible();
    }

    /// 選択開始（マークを設定）
    fn start_selection(&mut self) {
        self.mark_active = true;
        self.cursor.reset_selection();
        self.status_message = Some("Mark set".to_string());
    }

    /// 選択解除
    fn clear_selection(&mut self) {
        self.mark_active = false;
        self.cursor.reset_selection();
    }

    /// 選択範囲をコピー (M-w)
    fn copy(&mut self) {
        if let Some((begin, end)) = self.cursor.selection() {
            if let Ok(data) = self.document.data(begin, end - begin) {
                let _ = clipboard::copy_hex_to_all(&data, HexFormat::Spaced);
                self.status_message = Some(format!("Copied {} bytes", data.len()));
                self.clear_selection();
            }
        } else {
            self.status_message = Some("No selection".to_string());
        }
    }

    /// 選択範囲をカット (C-w)
    ///
    /// 上書きモードではゼロ埋め、挿入モードでは詰める（削除と同じ規則）。
    fn cut(&mut self) {
        if self.document.is_readonly() {
            return;
        }
        let Some((begin, end)) = self.cursor.selection() else {
            self.status_message = Some("No selection".to_string());
            return;
        };
        let len = end - begin;
        if let Ok(data) = self.document.data(begin, len) {
            let _ = clipboard::copy_hex_to_all(&data, HexFormat::Spaced);
            let result = match self.edit_mode {
                EditMode::Overwrite => {
                    self.document.replace_bytes(begin, len, &vec![0u8; len as usize])
                }
                EditMode::Insert => self.document.remove_range(begin, len),
            };
            if let Err(e) = result {
                self.status_message = Some(format!("Cut failed: {e}"));
                return;
            }
            self.cursor.set_position(2 * begin as i64, self.size(), self.edit_mode);
            self.clear_selection();
            self.ensure_cursor_visible();
            self.status_message = Some(format!("Cut {len} bytes"));
        }
    }

    /// システムクリップボードからペースト (C-y)
    fn paste(&mut self) {
        let content = match arboard::Clipboard::new().and_then(|mut cb| cb.get_text()) {
            Ok(text) => text,
            Err(_) => {
                self.status_message = Some("Clipboard empty or unavailable".to_string());
                return;
            }
        };
        self.paste_text(&content);
    }

    /// ペースト内容をバイト列として取り込む（Bracketed Paste兼用）
    fn paste_text(&mut self, content: &str) {
        if self.document.is_readonly() {
            return;
        }
        let trimmed = content.trim();
        let bytes = if Self::looks_like_hex(trimmed) {
            Self::normalized_hex_to_bytes(trimmed).unwrap_or_else(|| content.as_bytes().to_vec())
        } else {
            content.as_bytes().to_vec()
        };
        if bytes.is_empty() {
            return;
        }

        // 選択範囲があれば削除してから挿入
        if let Some((begin, end)) = self.cursor.selection() {
            if self.document.remove_range(begin, end - begin).is_err() {
                return;
            }
            self.cursor.set_position(2 * begin as i64, self.size(), self.edit_mode);
            self.clear_selection();
        }

        let pos = self.cursor.byte_position();
        let result = match self.edit_mode {
            EditMode::Overwrite => {
                let fit = (self.size() - pos).min(bytes.len() as u64) as usize;
                self.document
                    .replace_bytes(pos, fit as u64, &bytes[..fit])
                    .and_then(|()| self.document.insert_bytes(pos + fit as u64, bytes[fit..].to_vec()))
            }
            EditMode::Insert => self.document.insert_bytes(pos, bytes.clone()),
        };

        match result {
            Ok(()) => {
                self.cursor.set_position(
                    (2 * (pos + bytes.len() as u64)) as i64,
                    self.size(),
                    self.edit_mode,
                );
                self.cursor.reset_selection();
                self.ensure_cursor_visible();
                self.status_message = Some(format!("Pasted {} bytes", bytes.len()));
            }
            Err(e) => self.status_message = Some(format!("Paste failed: {e}")),
        }
    }

    /// 文字列がHEX形式かどうかを判定（全角文字も考慮）
    fn looks_like_hex(s: &str) -> bool {
        if s.is_empty() {
            return false;
        }
        let normalized = Self::normalize_hex_string(s);
        normalized.len() % 2 == 0
            && normalized.len() >= 2
            && normalized.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// HEX文字列を正規化（全角→半角、小文字→大文字、区切り・0x除去）
    fn normalize_hex_string(s: &str) -> String {
        s.chars()
            .filter_map(|c| {
                if matches!(c, ' ' | ',' | '{' | '}' | '\n' | '\r' | '\t') {
                    return None;
                }
                if matches!(c, 'x' | 'X' | 'ｘ' | 'Ｘ') {
                    return None;
                }
                Self::normalize_hex_char(c)
            })
            .collect()
    }

    /// 正規化されたHEX文字列をバイト列に変換
    fn normalized_hex_to_bytes(s: &str) -> Option<Vec<u8>> {
        let normalized = Self::normalize_hex_string(s);
        if normalized.len() % 2 != 0 {
            return None;
        }
        let chars: Vec<char> = normalized.chars().collect();
        let mut bytes = Vec::with_capacity(chars.len() / 2);
        for pair in chars.chunks(2) {
            let high = pair[0].to_digit(16)?;
            let low = pair[1].to_digit(16)?;
            bytes.push(((high << 4) | low) as u8);
        }
        Some(bytes)
    }

    /// 検索クエリをバイト列に変換
    fn search_query_to_bytes(&self) -> Vec<u8> {
        let trimmed = self.search_query.trim();
        if Self::looks_like_hex(trimmed) {
            Self::normalized_hex_to_bytes(trimmed)
                .unwrap_or_else(|| self.search_query.as_bytes().to_vec())
        } else {
            self.search_query.as_bytes().to_vec()
        }
    }

    /// 置換パターンをバイト列に変換
    fn replace_with_to_bytes(&self) -> Vec<u8> {
        let trimmed = self.replace_with.trim();
        if Self::looks_like_hex(trimmed) {
            Self::normalized_hex_to_bytes(trimmed)
                .unwrap_or_else(|| self.replace_with.as_bytes().to_vec())
        } else {
            self.replace_with.as_bytes().to_vec()
        }
    }

    /// マッチ位置へジャンプして選択する。カーソルはマッチの前か後ろへ
    fn jump_to_match(&mut self, pos: u64, len: u64, cursor_after: bool) {
        let size = self.size();
        self.cursor.set_position(2 * pos as i64, size, self.edit_mode);
        self.cursor.reset_selection();
        self.cursor.set_position(2 * (pos + len) as i64, size, self.edit_mode);
        self.cursor.extend_selection();
        if !cursor_after {
            self.cursor.set_position(2 * pos as i64, size, self.edit_mode);
        }
        self.mark_active = false;
        self.ensure_cursor_visible();
    }

    /// 前方検索（現在位置から後ろへ、ラップアラウンドあり）
    fn find_next(&mut self) {
        let pattern = self.search_query_to_bytes();
        if pattern.is_empty() {
            return;
        }
        let from = self.cursor.byte_position();
        match self.search.index_of(self.document.buffer(), &pattern, from) {
            Ok(Some(pos)) => {
                self.jump_to_match(pos, pattern.len() as u64, true);
                self.status_message = Some(format!("Found at {pos:08X}"));
            }
            Ok(None) => {
                // 先頭からやり直す
                match self.search.index_of(self.document.buffer(), &pattern, 0) {
                    Ok(Some(pos)) if pos < from => {
                        self.jump_to_match(pos, pattern.len() as u64, true);
                        self.status_message = Some(format!("Wrapped, found at {pos:08X}"));
                    }
                    _ => self.status_message = Some("Not found".to_string()),
                }
            }
            Err(e) => self.status_message = Some(format!("Search failed: {e}")),
        }
    }

    /// 後方検索（現在位置から前へ、ラップアラウンドあり）
    fn find_prev(&mut self) {
        let pattern = self.search_query_to_bytes();
        if pattern.is_empty() {
            return;
        }
        let cursor = self.cursor.byte_position();
        let from = cursor.saturating_sub(1);
        let found = if cursor == 0 {
            Ok(None)
        } else {
            self.search.last_index_of(self.document.buffer(), &pattern, from)
        };
        match found {
            Ok(Some(pos)) => {
                self.jump_to_match(pos, pattern.len() as u64, false);
                self.status_message = Some(format!("Found at {pos:08X}"));
            }
            Ok(None) => {
                // 末尾からやり直す
                match self.search.last_index_of(self.document.buffer(), &pattern, self.size()) {
                    Ok(Some(pos)) if pos > cursor => {
                        self.jump_to_match(pos, pattern.len() as u64, false);
                        self.status_message = Some(format!("Wrapped, found at {pos:08X}"));
                    }
                    _ => self.status_message = Some("Not found".to_string()),
                }
            }
            Err(e) => self.status_message = Some(format!("Search failed: {e}")),
        }
    }

    /// インクリメンタル検索を実行
    fn do_incremental_search(&mut self) {
        let pattern = self.search_query_to_bytes();
        if pattern.is_empty() {
            return;
        }
        let buffer = self.document.buffer();
        let result = if self.search_backwards {
            self.search
                .last_index_of(buffer, &pattern, self.search_start_pos)
                .unwrap_or(None)
                .or_else(|| self.search.last_index_of(buffer, &pattern, self.size()).unwrap_or(None))
        } else {
            self.search
                .index_of(buffer, &pattern, self.search_start_pos)
                .unwrap_or(None)
                .or_else(|| self.search.index_of(buffer, &pattern, 0).unwrap_or(None))
        };
        if let Some(pos) = result {
            self.jump_to_match(pos, pattern.len() as u64, !self.search_backwards);
        }
    }

    /// 置換用の次のマッチを検索（カーソルはマッチ先頭に置く）
    fn find_next_for_replace(&mut self) {
        let pattern = self.search_query_to_bytes();
        if pattern.is_empty() {
            self.replace_mode = ReplaceMode::Off;
            return;
        }
        let from = self.cursor.byte_position();
        match self.search.index_of(self.document.buffer(), &pattern, from) {
            Ok(Some(pos)) => {
                self.jump_to_match(pos, pattern.len() as u64, false);
                self.status_message = Some(format!("Replace? (y/n/!/q) at {pos:08X}"));
            }
            _ => {
                self.replace_mode = ReplaceMode::Off;
                self.clear_selection();
                self.status_message = Some("No more matches".to_string());
            }
        }
    }

    /// 現在のマッチを置換する
    fn do_replace_current(&mut self) {
        let from_bytes = self.search_query_to_bytes();
        let to_bytes = self.replace_with_to_bytes();
        if from_bytes.is_empty() {
            return;
        }
        let pos = self.cursor.byte_position();
        // カーソル位置がパターンとマッチするときだけ置換する
        let Ok(current) = self.document.data(pos, from_bytes.len() as u64) else {
            return;
        };
        if current != from_bytes {
            return;
        }
        if let Err(e) = self.document.replace_bytes(pos, from_bytes.len() as u64, &to_bytes) {
            self.status_message = Some(format!("Replace failed: {e}"));
            return;
        }
        self.cursor.set_position(
            (2 * (pos + to_bytes.len() as u64)) as i64,
            self.size(),
            self.edit_mode,
        );
        self.cursor.reset_selection();
        self.ensure_cursor_visible();
    }

    /// 残り全てを置換（カーソル位置から末尾まで）
    fn do_replace_all_remaining(&mut self) {
        let from_bytes = self.search_query_to_bytes();
        let to_bytes = self.replace_with_to_bytes();
        if from_bytes.is_empty() {
            self.replace_mode = ReplaceMode::Off;
            return;
        }
        let mut from = self.cursor.byte_position();
        let mut count = 0u64;
        loop {
            match self.search.index_of(self.document.buffer(), &from_bytes, from) {
                Ok(Some(pos)) => {
                    if let Err(e) =
                        self.document.replace_bytes(pos, from_bytes.len() as u64, &to_bytes)
                    {
                        self.status_message = Some(format!("Replace failed: {e}"));
                        break;
                    }
                    // 空の置換でも必ず前進させる
                    from = pos + (to_bytes.len() as u64).max(1);
                    count += 1;
                }
                _ => break,
            }
        }
        self.cursor.clamp(self.size(), self.edit_mode);
        self.clear_selection();
        self.ensure_cursor_visible();
        self.replace_mode = ReplaceMode::Off;
        self.status_message = Some(format!("Replaced {count} occurrences"));
    }

    /// アクションを実行
    pub fn execute(&mut self, action: Action) {
        if !matches!(action, Action::EnterCtrlX) {
            self.status_message = None;
        }

        let size = self.size();
        let mode = self.edit_mode;
        match action {
            Action::Quit => {
                if self.document.is_modified() {
                    self.confirm_mode = ConfirmMode::Quit;
                } else {
                    self.should_quit = true;
                }
            }
            Action::Save => self.do_save(),
            Action::SaveAs => {
                self.prompt_mode = PromptMode::SaveAs;
                self.prompt_input = self.document.filename().unwrap_or("").to_string();
            }
            Action::OpenFile => {
                self.prompt_mode = PromptMode::OpenFile;
                self.prompt_input.clear();
            }
            Action::Revert => {
                match self.document.revert_to_clean() {
                    Ok(Some(pos)) => {
                        self.cursor.set_position(2 * pos as i64, self.size(), mode);
                        self.cursor.clamp(self.size(), mode);
                        self.ensure_cursor_visible();
                        self.status_message = Some("Reverted to saved state".to_string());
                    }
                    Ok(None) => {
                        self.status_message = Some("Nothing to revert".to_string());
                    }
                    Err(e) => self.status_message = Some(format!("Revert failed: {e}")),
                }
                self.clear_selection();
            }
            // カーソル移動
            Action::CursorUp => {
                self.cursor.move_prev_line(size, mode);
                self.after_move();
            }
            Action::CursorDown => {
                self.cursor.move_next_line(size, mode);
                self.after_move();
            }
            Action::CursorLeft => {
                self.cursor.move_prev_char(size, mode);
                self.after_move();
            }
            Action::CursorRight => {
                self.cursor.move_next_char(size, mode);
                self.after_move();
            }
            Action::CursorHome => {
                self.cursor.move_line_start(size, mode);
                self.after_move();
            }
            Action::CursorEnd => {
                self.cursor.move_line_end(size, mode);
                self.after_move();
            }
            Action::PageUp => {
                self.cursor.move_prev_page(size, mode);
                self.after_move();
            }
            Action::PageDown => {
                self.cursor.move_next_page(size, mode);
                self.after_move();
            }
            Action::GotoBeginning => {
                self.cursor.move_doc_start(size, mode);
                self.after_move();
            }
            Action::GotoEnd => {
                self.cursor.move_doc_end(size, mode);
                self.after_move();
            }
            Action::StartGoto => {
                self.prompt_mode = PromptMode::GotoAddress;
                self.prompt_input.clear();
            }
            // 選択操作
            Action::StartSelection => self.start_selection(),
            Action::SelectAll => {
                self.cursor.select_all(size, mode);
                self.mark_active = false;
                self.ensure_cursor_visible();
            }
            Action::SelectUp => self.select_move(CursorModel::move_prev_line),
            Action::SelectDown => self.select_move(CursorModel::move_next_line),
            Action::SelectLeft => self.select_move(CursorModel::move_prev_char),
            Action::SelectRight => self.select_move(CursorModel::move_next_char),
            // クリップボード
            Action::Copy => self.copy(),
            Action::Cut => self.cut(),
            Action::Paste => self.paste(),
            // 編集
            Action::Delete => self.delete_byte(),
            Action::Backspace => self.delete_byte_back(),
            // モード切替
            Action::ToggleMode => self.hex_mode = !self.hex_mode,
            Action::ToggleEditMode => {
                self.edit_mode = match self.edit_mode {
                    EditMode::Overwrite => EditMode::Insert,
                    EditMode::Insert => EditMode::Overwrite,
                };
                // 合法範囲がモードで変わるので収め直す
                self.cursor.clamp(self.size(), self.edit_mode);
            }
            Action::ToggleEncoding => {
                self.encoding = self.encoding.next();
                self.status_message = Some(format!("Encoding: {}", self.encoding.name()));
            }
            // 入力
            Action::InputHex(ch) => self.input_hex(ch),
            Action::InputAscii(ch) => self.input_ascii(ch),
            // プレフィックスキー
            Action::EnterCtrlX => {
                self.prefix_key = PrefixKey::CtrlX;
                self.status_message = Some("C-x-".to_string());
            }
            Action::Cancel => {
                self.prefix_key = PrefixKey::None;
                self.clear_selection();
                self.status_message = Some("Quit".to_string());
            }
            // Undo/Redo
            Action::Undo => match self.document.undo() {
                Ok(Some(pos)) => {
                    self.cursor.set_position(2 * pos as i64, self.size(), mode);
                    self.cursor.clamp(self.size(), mode);
                    self.clear_selection();
                    self.ensure_cursor_visible();
                    self.status_message = Some("Undo".to_string());
                }
                Ok(None) => self.status_message = Some("Nothing to undo".to_string()),
                Err(e) => self.status_message = Some(format!("Undo failed: {e}")),
            },
            Action::Redo => match self.document.redo() {
                Ok(Some(pos)) => {
                    self.cursor.set_position(2 * pos as i64, self.size(), mode);
                    self.cursor.clamp(self.size(), mode);
                    self.clear_selection();
                    self.ensure_cursor_visible();
                    self.status_message = Some("Redo".to_string());
                }
                Ok(None) => self.status_message = Some("Nothing to redo".to_string()),
                Err(e) => self.status_message = Some(format!("Redo failed: {e}")),
            },
            // 検索
            Action::StartSearch => {
                self.search_mode = true;
                self.search_backwards = false;
                self.search_query.clear();
                self.search_start_pos = self.cursor.byte_position();
            }
            Action::StartSearchBack => {
                self.search_mode = true;
                self.search_backwards = true;
                self.search_query.clear();
                self.search_start_pos = self.cursor.byte_position();
            }
            // 置換
            Action::StartReplace => {
                self.replace_mode = ReplaceMode::EnteringSearch;
                self.search_query.clear();
                self.replace_with.clear();
                self.search_start_pos = self.cursor.byte_position();
            }
            // コマンド実行 (M-x)
            Action::ExecuteCommand => {
                self.prompt_mode = PromptMode::Command;
                self.prompt_input.clear();
                self.current_command.clear();
            }
            Action::None => {}
        }
    }

    fn do_save(&mut self) {
        match self.document.save() {
            Ok(()) => self.status_message = Some("Saved".to_string()),
            Err(e) => self.status_message = Some(format!("Save failed: {e}")),
        }
    }

    /// イベントを処理
    pub fn handle_event(&mut self) -> Result<()> {
        if !event::poll(std::time::Duration::from_millis(100))? {
            return Ok(());
        }
        match event::read()? {
            // ペーストイベント（Bracketed Paste Mode）
            Event::Paste(content) => {
                if self.search_mode {
                    self.search_query.push_str(&content);
                    self.do_incremental_search();
                } else {
                    self.paste_text(&content);
                }
            }
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    return Ok(());
                }

                if self.search_mode {
                    self.handle_search_key(key);
                    return Ok(());
                }
                if self.replace_mode != ReplaceMode::Off {
                    self.handle_replace_key(key);
                    return Ok(());
                }
                if self.prompt_mode != PromptMode::Off {
                    self.handle_prompt_key(key);
                    return Ok(());
                }
                if self.confirm_mode != ConfirmMode::Off {
                    self.handle_confirm_key(key);
                    return Ok(());
                }

                let mods = KeyMod {
                    ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
                    shift: key.modifiers.contains(KeyModifiers::SHIFT),
                    alt: key.modifiers.contains(KeyModifiers::ALT),
                };

                let action = match self.prefix_key {
                    PrefixKey::None => Action::from_key(key.code, mods),
                    PrefixKey::CtrlX => {
                        self.prefix_key = PrefixKey::None;
                        Action::from_key_after_ctrl_x(key.code, mods)
                    }
                };

                if action != Action::None {
                    self.execute(action);
                } else if let KeyCode::Char(ch) = key.code {
                    if !mods.ctrl && !mods.alt {
                        if self.hex_mode {
                            self.execute(Action::InputHex(ch));
                        } else {
                            self.execute(Action::InputAscii(ch));
                        }
                    }
                }
            }
            Event::FocusGained | Event::FocusLost => {}
            _ => {}
        }
        Ok(())
    }

    /// 検索モード中のキー処理
    fn handle_search_key(&mut self, key: crossterm::event::KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            // Escape / C-g: 検索キャンセル、開始位置へ戻る
            KeyCode::Esc | KeyCode::Char('g') if ctrl || key.code == KeyCode::Esc => {
                self.search_mode = false;
                self.cursor.set_position(
                    2 * self.search_start_pos as i64,
                    self.size(),
                    self.edit_mode,
                );
                self.clear_selection();
                self.ensure_cursor_visible();
                self.status_message = Some("Cancelled".to_string());
            }
            // Enter: 検索確定
            KeyCode::Enter => {
                self.search_mode = false;
                if self.search_query.is_empty() {
                    self.status_message = Some("Search cancelled".to_string());
                } else {
                    self.last_search_query = self.search_query.clone();
                    self.status_message = Some(format!("I-search: {}", self.search_query));
                }
            }
            // C-s: 次を検索
            KeyCode::Char('s') if ctrl => {
                if self.search_query.is_empty() && !self.last_search_query.is_empty() {
                    self.search_query = self.last_search_query.clone();
                }
                self.find_next();
            }
            // C-r: 前を検索
            KeyCode::Char('r') if ctrl => {
                if self.search_query.is_empty() && !self.last_search_query.is_empty() {
                    self.search_query = self.last_search_query.clone();
                }
                self.find_prev();
            }
            KeyCode::Backspace => {
                self.search_query.pop();
                if self.search_query.is_empty() {
                    self.cursor.set_position(
                        2 * self.search_start_pos as i64,
                        self.size(),
                        self.edit_mode,
                    );
                    self.clear_selection();
                    self.ensure_cursor_visible();
                } else {
                    self.do_incremental_search();
                }
            }
            KeyCode::Char(ch) if !ctrl => {
                self.search_query.push(ch);
                self.do_incremental_search();
            }
            _ => {}
        }
    }

    /// 置換モード中のキー処理
    fn handle_replace_key(&mut self, key: crossterm::event::KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match self.replace_mode {
            ReplaceMode::EnteringSearch => match key.code {
                KeyCode::Esc | KeyCode::Char('g') if ctrl || key.code == KeyCode::Esc => {
                    self.replace_mode = ReplaceMode::Off;
                    self.status_message = Some("Cancelled".to_string());
                }
                KeyCode::Enter => {
                    if self.search_query.is_empty() {
                        self.replace_mode = ReplaceMode::Off;
                        self.status_message = Some("Empty search pattern".to_string());
                    } else {
                        self.replace_mode = ReplaceMode::EnteringReplace;
                    }
                }
                KeyCode::Backspace => {
                    self.search_query.pop();
                }
                KeyCode::Char(ch) if !ctrl => self.search_query.push(ch),
                _ => {}
            },
            ReplaceMode::EnteringReplace => match key.code {
                KeyCode::Esc | KeyCode::Char('g') if ctrl || key.code == KeyCode::Esc => {
                    self.replace_mode = ReplaceMode::Off;
                    self.status_message = Some("Cancelled".to_string());
                }
                KeyCode::Enter => {
                    self.replace_mode = ReplaceMode::Confirming;
                    self.find_next_for_replace();
                }
                KeyCode::Backspace => {
                    self.replace_with.pop();
                }
                KeyCode::Char(ch) if !ctrl => self.replace_with.push(ch),
                _ => {}
            },
            ReplaceMode::Confirming => {
                let normalized = match key.code {
                    KeyCode::Char(c) => KeyCode::Char(Self::normalize_fullwidth(c)),
                    other => other,
                };
                match normalized {
                    // y: この箇所を置換して次へ
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Char(' ') => {
                        self.do_replace_current();
                        self.find_next_for_replace();
                    }
                    // n: スキップして次へ
                    KeyCode::Char('n') | KeyCode::Char('N') => {
                        let pattern_len = self.search_query_to_bytes().len() as u64;
                        self.cursor.set_position(
                            2 * (self.cursor.byte_position() + pattern_len.max(1)) as i64,
                            self.size(),
                            self.edit_mode,
                        );
                        self.find_next_for_replace();
                    }
                    // !: 残り全てを置換
                    KeyCode::Char('!') => self.do_replace_all_remaining(),
                    // q / Escape / C-g: 終了
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        self.replace_mode = ReplaceMode::Off;
                        self.clear_selection();
                        self.status_message = Some("Query replace finished".to_string());
                    }
                    KeyCode::Char('g') if ctrl => {
                        self.replace_mode = ReplaceMode::Off;
                        self.clear_selection();
                        self.status_message = Some("Query replace finished".to_string());
                    }
                    _ => {}
                }
            }
            ReplaceMode::Off => {}
        }
    }

    /// プロンプトモード中のキー処理
    fn handle_prompt_key(&mut self, key: crossterm::event::KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc | KeyCode::Char('g') if ctrl || key.code == KeyCode::Esc => {
                self.prompt_mode = PromptMode::Off;
                self.status_message = Some("Cancelled".to_string());
            }
            KeyCode::Enter => self.execute_prompt(),
            KeyCode::Backspace => {
                self.prompt_input.pop();
            }
            KeyCode::Char(ch) if !ctrl => self.prompt_input.push(ch),
            _ => {}
        }
    }

    /// プロンプト入力を実行
    fn execute_prompt(&mut self) {
        let input = self.prompt_input.clone();
        let mode = self.prompt_mode;
        self.prompt_mode = PromptMode::Off;

        match mode {
            PromptMode::GotoAddress => self.goto_address(&input),
            PromptMode::OpenFile => {
                if self.document.is_modified() {
                    self.confirm_mode = ConfirmMode::OpenFile(input);
                } else {
                    self.open_file(&input);
                }
            }
            PromptMode::SaveAs => self.save_as(&input),
            PromptMode::Command => self.dispatch_command(&input),
            PromptMode::CommandArg => self.execute_command_with_arg(&input),
            PromptMode::Off => {}
        }
    }

    /// コマンドをディスパッチ
    fn dispatch_command(&mut self, cmd: &str) {
        let cmd = cmd.trim().to_lowercase();
        match cmd.as_str() {
            "goto" | "g" => {
                self.prompt_mode = PromptMode::GotoAddress;
                self.prompt_input.clear();
            }
            "save" | "s" => self.do_save(),
            "quit" | "q" => self.execute(Action::Quit),
            "revert" => self.execute(Action::Revert),
            "fill" | "f" => {
                if self.cursor.has_selection() {
                    self.current_command = "fill".to_string();
                    self.prompt_mode = PromptMode::CommandArg;
                    self.prompt_input.clear();
                } else {
                    self.status_message = Some("No selection".to_string());
                }
            }
            "insert" | "i" => {
                self.current_command = "insert".to_string();
                self.prompt_mode = PromptMode::CommandArg;
                self.prompt_input.clear();
            }
            "help" | "?" | "h" => {
                self.status_message = Some(
                    "Commands: fill(f) insert(i) goto(g) save(s) revert quit(q) help(?)"
                        .to_string(),
                );
            }
            "" => {}
            _ => {
                self.status_message = Some(format!("Unknown command: {cmd} (try 'help')"));
            }
        }
    }

    /// コマンドを引数付きで実行
    fn execute_command_with_arg(&mut self, arg: &str) {
        let cmd = std::mem::take(&mut self.current_command);
        match cmd.as_str() {
            "fill" => self.cmd_fill(arg),
            "insert" => self.cmd_insert(arg),
            _ => self.status_message = Some(format!("Unknown command: {cmd}")),
        }
    }

    /// fill コマンド: 選択範囲を指定バイトで埋める（1コマンドでUndo可能）
    fn cmd_fill(&mut self, arg: &str) {
        let Some(byte) = Self::parse_byte(arg.trim()) else {
            self.status_message = Some("Invalid byte value".to_string());
            return;
        };
        let Some((begin, end)) = self.cursor.selection() else {
            self.status_message = Some("No selection".to_string());
            return;
        };
        let len = end - begin;
        match self.document.replace_bytes(begin, len, &vec![byte; len as usize]) {
            Ok(()) => {
                self.status_message = Some(format!("Filled {len} bytes with {byte:02X}"));
                self.clear_selection();
            }
            Err(e) => self.status_message = Some(format!("Fill failed: {e}")),
        }
    }

    /// insert コマンド: 指定個数のバイトを挿入（1コマンドでUndo可能）
    fn cmd_insert(&mut self, arg: &str) {
        // フォーマット: "count byte" or "count" (既定 00)
        let parts: Vec<&str> = arg.trim().split_whitespace().collect();
        let (count, byte) = match parts.len() {
            1 => (Self::parse_number(parts[0]), Some(0u8)),
            2 => (Self::parse_number(parts[0]), Self::parse_byte(parts[1])),
            _ => {
                self.status_message = Some("Usage: insert <count> [byte]".to_string());
                return;
            }
        };
        let (Some(count), Some(byte)) = (count, byte) else {
            self.status_message = Some("Invalid count or byte value".to_string());
            return;
        };
        if count == 0 {
            self.status_message = Some("Count must be > 0".to_string());
            return;
        }

        let pos = self.cursor.byte_position();
        match self.document.insert_bytes(pos, vec![byte; count]) {
            Ok(()) => {
                self.status_message = Some(format!("Inserted {count} bytes of {byte:02X}"));
                self.ensure_cursor_visible();
            }
            Err(e) => self.status_message = Some(format!("Insert failed: {e}")),
        }
    }

    /// 数値をパース（0x prefix または 10進数）
    fn parse_number(s: &str) -> Option<usize> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            usize::from_str_radix(hex, 16).ok()
        } else {
            s.parse().ok()
        }
    }

    /// バイト値をパース
    fn parse_byte(s: &str) -> Option<u8> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u8::from_str_radix(hex, 16).ok()
        } else if s.len() <= 2 && !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit()) {
            u8::from_str_radix(s, 16).ok()
        } else {
            s.parse().ok()
        }
    }

    /// アドレスにジャンプ
    fn goto_address(&mut self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            self.status_message = Some("No address".to_string());
            return;
        }

        // 0x プレフィックスまたは h サフィックスで16進数
        let addr = if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16)
        } else if let Some(hex) = input.strip_suffix('h').or_else(|| input.strip_suffix('H')) {
            u64::from_str_radix(hex, 16)
        } else if input.chars().all(|c| c.is_ascii_hexdigit())
            && input.chars().any(|c| c.is_ascii_alphabetic())
        {
            // A-Fを含む場合は16進数として解釈
            u64::from_str_radix(input, 16)
        } else {
            input.parse()
        };

        match addr {
            Ok(addr) if addr <= self.size() => {
                self.cursor.set_position(2 * addr as i64, self.size(), self.edit_mode);
                self.clear_selection();
                self.ensure_cursor_visible();
                self.status_message = Some(format!("Jumped to {addr:08X}"));
            }
            Ok(addr) => {
                self.status_message =
                    Some(format!("Address {:X} exceeds file size {:X}", addr, self.size()));
            }
            Err(_) => self.status_message = Some("Invalid address".to_string()),
        }
    }

    /// チルダ展開
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// ファイルを開く
    fn open_file(&mut self, path: &str) {
        let path = path.trim();
        if path.is_empty() {
            self.status_message = Some("No file specified".to_string());
            return;
        }
        let expanded = Self::expand_path(path);
        match self.open(&expanded) {
            Ok(()) => self.status_message = Some(format!("Opened: {}", expanded.display())),
            Err(e) => self.status_message = Some(format!("Failed to open: {e}")),
        }
    }

    /// 別名保存
    fn save_as(&mut self, path: &str) {
        let path = path.trim();
        if path.is_empty() {
            self.status_message = Some("No file specified".to_string());
            return;
        }
        let expanded = Self::expand_path(path);
        match self.document.save_as(&expanded) {
            Ok(()) => self.status_message = Some(format!("Saved: {}", expanded.display())),
            Err(e) => self.status_message = Some(format!("Failed to save: {e}")),
        }
    }

    /// 確認モード中のキー処理
    fn handle_confirm_key(&mut self, key: crossterm::event::KeyEvent) {
        let normalized = match key.code {
            KeyCode::Char(c) => KeyCode::Char(Self::normalize_fullwidth(c)),
            other => other,
        };
        match normalized {
            // y: 保存して実行
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(e) = self.document.save() {
                    self.status_message = Some(format!("Save failed: {e}"));
                    self.confirm_mode = ConfirmMode::Off;
                    return;
                }
                self.execute_confirmed_action();
            }
            // n: 保存せずに実行
            KeyCode::Char('n') | KeyCode::Char('N') => self.execute_confirmed_action(),
            // c / Escape / C-g: キャンセル
            KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Esc => {
                self.confirm_mode = ConfirmMode::Off;
                self.status_message = Some("Cancelled".to_string());
            }
            KeyCode::Char('g') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.confirm_mode = ConfirmMode::Off;
                self.status_message = Some("Cancelled".to_string());
            }
            _ => {}
        }
    }

    /// 確認後のアクションを実行
    fn execute_confirmed_action(&mut self) {
        let mode = std::mem::take(&mut self.confirm_mode);
        match mode {
            ConfirmMode::Quit => self.should_quit = true,
            ConfirmMode::OpenFile(path) => self.open_file(&path),
            ConfirmMode::Off => {}
        }
    }

    /// 選択範囲の数値解釈をフォーマット
    fn format_selection_info(&self, begin: u64, end: u64) -> String {
        let len = end - begin;
        let Ok(bytes) = self.document.data(begin, len) else {
            return format!("Selection: {len} bytes");
        };

        let mut parts = vec![format!("{len} bytes")];
        match bytes.len() {
            1 => {
                parts.push(format!("u8:{} i8:{}", bytes[0], bytes[0] as i8));
            }
            2 => {
                let pair = [bytes[0], bytes[1]];
                let le = u16::from_le_bytes(pair);
                let be = u16::from_be_bytes(pair);
                parts.push(format!("u16 LE:{le} BE:{be}"));
                parts.push(format!("i16 LE:{} BE:{}", le as i16, be as i16));
            }
            4 => {
                let quad = [bytes[0], bytes[1], bytes[2], bytes[3]];
                let le = u32::from_le_bytes(quad);
                let be = u32::from_be_bytes(quad);
                parts.push(format!("u32 LE:{le} BE:{be}"));
                let f_le = f32::from_le_bytes(quad);
                let f_be = f32::from_be_bytes(quad);
                if f_le.is_finite() || f_be.is_finite() {
                    parts.push(format!("f32 LE:{f_le:.6} BE:{f_be:.6}"));
                }
            }
            8 => {
                let oct = [
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ];
                let le = u64::from_le_bytes(oct);
                let be = u64::from_be_bytes(oct);
                parts.push(format!("u64 LE:{le} BE:{be}"));
            }
            3 | 5..=7 => parts.push(format!("({bytes:02X?})")),
            _ => {}
        }
        format!(" {}", parts.join(" | "))
    }

    /// UIを描画
    pub fn draw(&mut self, frame: &mut Frame) {
        let size = frame.area();
        self.set_visible_rows(size.height as usize);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // メイン
                Constraint::Length(1), // ステータス
            ])
            .split(size);

        // 表示窓だけ読む
        let bpr = self.cursor.bytes_per_line();
        let window_len = (self.visible_rows * bpr) as u64;
        let (data, marked) = self
            .document
            .data_marked(self.offset, window_len)
            .unwrap_or_default();

        let hex_view = HexView::new(&data, &marked)
            .window_start(self.offset)
            .total_size(self.document.len())
            .cursor(self.cursor.byte_position(), self.cursor.nibble())
            .selection(self.cursor.selection())
            .bytes_per_row(bpr)
            .encoding(self.encoding)
            .addr_width(dump::address_width(dump::DEFAULT_ADDR_WIDTH, self.document.len()))
            .mode(if self.hex_mode { ViewMode::Hex } else { ViewMode::Ascii });
        frame.render_widget(hex_view, layout[0]);

        // ステータスバー
        let filename = self.document.filename().unwrap_or("[New]");
        let modified = if self.document.is_modified() { "[+]" } else { "" };
        let mode_str = if self.hex_mode { "HEX" } else { "ASC" };
        let edit_str = match self.edit_mode {
            EditMode::Overwrite => "OVR",
            EditMode::Insert => "INS",
        };

        let status = if self.search_mode {
            format!("I-search{}: {}_", if self.search_backwards { " backward" } else { "" }, self.search_query)
        } else if self.replace_mode == ReplaceMode::EnteringSearch {
            format!("Query replace: {}_", self.search_query)
        } else if self.replace_mode == ReplaceMode::EnteringReplace {
            format!("Query replace {} with: {}_", self.search_query, self.replace_with)
        } else if self.prompt_mode == PromptMode::GotoAddress {
            format!("Goto address: {}_", self.prompt_input)
        } else if self.prompt_mode == PromptMode::OpenFile {
            format!("Open file: {}_", self.prompt_input)
        } else if self.prompt_mode == PromptMode::SaveAs {
            format!("Save as: {}_", self.prompt_input)
        } else if self.prompt_mode == PromptMode::Command {
            format!("M-x {}_", self.prompt_input)
        } else if self.prompt_mode == PromptMode::CommandArg {
            let prompt = match self.current_command.as_str() {
                "fill" => "Fill with byte (hex):",
                "insert" => "Insert (count [byte]):",
                _ => "Arg:",
            };
            format!("{} {}_", prompt, self.prompt_input)
        } else if self.confirm_mode != ConfirmMode::Off {
            "Save changes? (y)es (n)o (c)ancel".to_string()
        } else if let Some(ref msg) = self.status_message {
            format!(" {filename}{modified} | {msg}")
        } else if let Some((begin, end)) = self.cursor.selection() {
            format!(" {filename}{modified} |{}", self.format_selection_info(begin, end))
        } else {
            format!(
                " {}{} | {:08X}/{:08X} | {} {} | {}",
                filename,
                modified,
                self.cursor.byte_position(),
                self.document.len(),
                mode_str,
                edit_str,
                self.encoding.name(),
            )
        };

        let status_widget =
            Paragraph::new(status).style(Style::default().bg(Color::DarkGray).fg(Color::White));
        frame.render_widget(status_widget, layout[1]);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with(bytes: &[u8]) -> App {
        let mut app = App::new(16);
        app.load_bytes(bytes.to_vec());
        app
    }

    fn contents(app: &App) -> Vec<u8> {
        app.document.data(0, u64::MAX).unwrap()
    }

    #[test]
    fn hex_input_overwrites_nibble_wise() {
        let mut app = app_with(&[0x00, 0x11]);
        app.execute(Action::InputHex('a'));
        // 上位ニブルだけ反映、カーソルは下位ニブルへ
        assert_eq!(contents(&app), &[0xA0, 0x11]);
        assert_eq!(app.cursor.nibble(), 1);
        app.execute(Action::InputHex('b'));
        assert_eq!(contents(&app), &[0xAB, 0x11]);
        // バイト確定で次のバイトへ
        assert_eq!(app.cursor.byte_position(), 1);
        assert_eq!(app.cursor.nibble(), 0);
        // 2ニブルで1ステップのUndo
        app.execute(Action::Undo);
        assert_eq!(contents(&app), &[0x00, 0x11]);
    }

    #[test]
    fn hex_input_insert_mode() {
        let mut app = app_with(&[0xFF]);
        app.execute(Action::ToggleEditMode); // Insert
        app.execute(Action::InputHex('1'));
        app.execute(Action::InputHex('2'));
        assert_eq!(contents(&app), &[0x12, 0xFF]);
    }

    #[test]
    fn delete_semantics_follow_edit_mode() {
        let mut app = app_with(&[1, 2, 3]);
        // 上書きモード：ゼロ埋め
        app.execute(Action::Delete);
        assert_eq!(contents(&app), &[0, 2, 3]);
        // 挿入モード：詰める
        app.execute(Action::ToggleEditMode);
        app.execute(Action::Delete);
        assert_eq!(contents(&app), &[2, 3]);
    }

    #[test]
    fn backspace_deletes_previous_byte() {
        let mut app = app_with(&[1, 2, 3]);
        app.execute(Action::ToggleEditMode); // Insert
        app.execute(Action::CursorRight);
        app.execute(Action::CursorRight);
        app.execute(Action::Backspace);
        assert_eq!(contents(&app), &[1, 3]);
        assert_eq!(app.cursor.byte_position(), 1);
    }

    #[test]
    fn mark_extends_selection_on_plain_moves() {
        let mut app = app_with(&[0u8; 32]);
        app.execute(Action::StartSelection);
        app.execute(Action::CursorRight);
        app.execute(Action::CursorRight);
        assert_eq!(app.cursor.selection(), Some((0, 2)));
        // キャンセルで解除
        app.execute(Action::Cancel);
        assert!(!app.cursor.has_selection());
    }

    #[test]
    fn goto_parses_hex_and_decimal() {
        let mut app = app_with(&[0u8; 64]);
        app.goto_address("0x10");
        assert_eq!(app.cursor.byte_position(), 0x10);
        app.goto_address("20");
        assert_eq!(app.cursor.byte_position(), 20);
        app.goto_address("1Fh");
        assert_eq!(app.cursor.byte_position(), 0x1F);
        app.goto_address("999");
        assert_eq!(app.cursor.byte_position(), 0x1F); // 範囲外は動かない
    }

    #[test]
    fn fill_command_is_single_undo_step() {
        let mut app = app_with(&[0u8; 8]);
        app.execute(Action::StartSelection);
        for _ in 0..4 {
            app.execute(Action::CursorRight);
        }
        app.cmd_fill("ff");
        assert_eq!(contents(&app), &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        app.execute(Action::Undo);
        assert_eq!(contents(&app), &[0u8; 8]);
    }

    #[test]
    fn query_replace_all_remaining_advances_on_empty_replacement() {
        let mut app = app_with(&[0xAA, 0xBB, 0xAA]);
        app.search_query = "AA".to_string();
        app.replace_with = String::new();
        app.do_replace_all_remaining();
        assert_eq!(contents(&app), &[0xBB]);
    }

    #[test]
    fn incremental_search_jumps_and_selects() {
        let mut app = app_with(b"hello world hello");
        app.execute(Action::StartSearch);
        app.search_query = "world".to_string();
        app.do_incremental_search();
        assert_eq!(app.cursor.selection(), Some((6, 11)));
    }
}
