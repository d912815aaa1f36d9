mod state;

pub use state::App;

use crossterm::event::KeyCode;

pub use crate::buffer::EditMode;

/// プレフィックスキー状態（Emacs 2ストローク用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixKey {
    #[default]
    None,
    /// C-x を押した状態
    CtrlX,
}

/// アプリケーションアクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Save,
    SaveAs,
    OpenFile,
    Revert,

    // カーソル移動
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    PageUp,
    PageDown,
    GotoBeginning, // M-< バッファ先頭
    GotoEnd,       // M-> バッファ末尾（EOF）
    StartGoto,     // M-g アドレスジャンプ

    // 編集
    InputHex(char),
    InputAscii(char),
    Delete,
    Backspace,
    ToggleMode,     // HEX <-> ASCII
    ToggleEditMode, // Insert <-> Overwrite

    // 選択
    StartSelection,
    SelectAll,
    SelectUp,
    SelectDown,
    SelectLeft,
    SelectRight,

    // クリップボード
    Copy,  // M-w: コピー
    Cut,   // C-w: カット (kill-region)
    Paste, // C-y: ペースト

    // 表示
    ToggleEncoding,

    // 検索・置換
    StartSearch,     // C-s: 前方検索
    StartSearchBack, // C-r: 後方検索
    StartReplace,    // M-%: query-replace

    // Undo/Redo
    Undo,
    Redo,

    // その他
    ExecuteCommand, // M-x
    EnterCtrlX,
    Cancel, // C-g

    None,
}

/// キー修飾子
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMod {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Action {
    /// キーコードからアクションに変換（Emacsキーバインド）
    pub fn from_key(key: KeyCode, mods: KeyMod) -> Self {
        let KeyMod { ctrl, shift, alt } = mods;

        match (key, ctrl, alt, shift) {
            // プレフィックスキーとキャンセル
            (KeyCode::Char('x'), true, false, false) => Action::EnterCtrlX,
            (KeyCode::Char('g'), true, false, false) => Action::Cancel,
            (KeyCode::Esc, _, _, _) => Action::Cancel,

            // Emacsカーソル移動
            (KeyCode::Char('f'), true, false, false) => Action::CursorRight,
            (KeyCode::Char('b'), true, false, false) => Action::CursorLeft,
            (KeyCode::Char('n'), true, false, false) => Action::CursorDown,
            (KeyCode::Char('p'), true, false, false) => Action::CursorUp,
            (KeyCode::Char('a'), true, false, false) => Action::CursorHome,
            (KeyCode::Char('e'), true, false, false) => Action::CursorEnd,
            (KeyCode::Char('v'), true, false, false) => Action::PageDown,
            (KeyCode::Char('v'), false, true, false) => Action::PageUp,
            (KeyCode::Char('<'), false, true, _) => Action::GotoBeginning,
            (KeyCode::Char('>'), false, true, _) => Action::GotoEnd,
            (KeyCode::Char('g'), false, true, _) => Action::StartGoto,

            // 矢印キー
            (KeyCode::Up, false, false, false) => Action::CursorUp,
            (KeyCode::Down, false, false, false) => Action::CursorDown,
            (KeyCode::Left, false, false, false) => Action::CursorLeft,
            (KeyCode::Right, false, false, false) => Action::CursorRight,
            // Shift+矢印キー: 選択
            (KeyCode::Up, false, false, true) => Action::SelectUp,
            (KeyCode::Down, false, false, true) => Action::SelectDown,
            (KeyCode::Left, false, false, true) => Action::SelectLeft,
            (KeyCode::Right, false, false, true) => Action::SelectRight,
            (KeyCode::Home, _, _, _) => Action::CursorHome,
            (KeyCode::End, _, _, _) => Action::CursorEnd,
            (KeyCode::PageUp, _, _, _) => Action::PageUp,
            (KeyCode::PageDown, _, _, _) => Action::PageDown,

            // モード切替
            (KeyCode::Tab, false, false, _) => Action::ToggleMode,
            (KeyCode::Insert, false, false, _) => Action::ToggleEditMode,

            // 編集
            (KeyCode::Char('d'), true, false, false) => Action::Delete,
            (KeyCode::Delete, false, false, _) => Action::Delete,
            (KeyCode::Backspace, false, false, _) => Action::Backspace,

            // 選択・クリップボード
            (KeyCode::Char(' '), true, false, false) => Action::StartSelection,
            (KeyCode::Char('w'), true, false, false) => Action::Cut,
            (KeyCode::Char('w'), false, true, false) => Action::Copy,
            (KeyCode::Char('y'), true, false, false) => Action::Paste,

            // Undo: C-u / Redo: C-/
            (KeyCode::Char('u'), true, false, false) => Action::Undo,
            (KeyCode::Char('/'), true, false, false) => Action::Redo,

            // 検索: C-s (前方), C-r (後方)、置換: M-%
            (KeyCode::Char('s'), true, false, false) => Action::StartSearch,
            (KeyCode::Char('r'), true, false, false) => Action::StartSearchBack,
            (KeyCode::Char('%'), false, true, _) => Action::StartReplace,

            // エンコーディング切替: F2
            (KeyCode::F(2), false, false, _) => Action::ToggleEncoding,

            // コマンド実行: M-x
            (KeyCode::Char('x'), false, true, false) => Action::ExecuteCommand,

            _ => Action::None,
        }
    }

    /// C-x の後のキーを処理
    pub fn from_key_after_ctrl_x(key: KeyCode, mods: KeyMod) -> Self {
        let KeyMod { ctrl, .. } = mods;

        match (key, ctrl) {
            // C-x C-c: 終了
            (KeyCode::Char('c'), true) => Action::Quit,
            // C-x C-s: 保存
            (KeyCode::Char('s'), true) => Action::Save,
            // C-x C-w: 別名保存
            (KeyCode::Char('w'), true) => Action::SaveAs,
            // C-x C-f: ファイルを開く
            (KeyCode::Char('f'), true) => Action::OpenFile,
            // C-x h: 全選択
            (KeyCode::Char('h'), false) => Action::SelectAll,
            // C-x C-r: 保存時の状態へ戻す
            (KeyCode::Char('r'), true) => Action::Revert,

            // C-g: キャンセル
            (KeyCode::Char('g'), true) => Action::Cancel,
            (KeyCode::Esc, _) => Action::Cancel,

            // その他は無効
            _ => Action::Cancel,
        }
    }
}
