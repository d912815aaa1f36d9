//! chx - チャンクバッファ方式のターミナル16進エディタ
//!
//! TUIエディタ (chx) とパイプ向けCLIツール (cbx) の共通ライブラリ。

pub mod app;
pub mod buffer;
pub mod clipboard;
pub mod dump;
pub mod encoding;
pub mod ui;
