//! chx - チャンクバッファ方式のターミナル16進エディタ

use std::io::{self, IsTerminal, Read, Write as _};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange},
    execute, queue,
    terminal::{
        disable_raw_mode, enable_raw_mode, BeginSynchronizedUpdate, EndSynchronizedUpdate,
        EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};

use chx::app::App;
use chx::buffer::Notice;

/// Terminal hex editor for large files
#[derive(Parser, Debug)]
#[command(name = "chx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to open
    #[arg(value_name = "FILE")]
    file: Option<String>,

    /// Bytes per row (default: 16)
    #[arg(short, long, default_value = "16")]
    bytes_per_row: usize,

    /// Read-only mode
    #[arg(short, long)]
    readonly: bool,
}

/// CHX_LOG にパスが入っていればそこへログを書く
///
/// TUIはターミナルを占有するので、ログは標準出力へ出さない。
fn init_logging() {
    let Some(path) = std::env::var_os("CHX_LOG") else {
        return;
    };
    let Ok(file) = std::fs::File::create(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    // 標準入力からデータを読み込む（パイプされている場合）
    let stdin_data = if !io::stdin().is_terminal() {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Some(data)
    } else {
        None
    };

    // ターミナルの初期化
    // Alternate Screenでスクロールによるバッファ移動を防止
    // Bracketed Pasteでペースト内容を一括取り込み
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, args, stdin_data);

    // ターミナルの後処理
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    args: Args,
    stdin_data: Option<Vec<u8>>,
) -> Result<()> {
    let mut app = App::new(args.bytes_per_row.max(1));
    app.set_readonly(args.readonly);

    // データを読み込む（優先順位: ファイル > 標準入力）
    if let Some(ref path) = args.file {
        app.open(path)?;
    } else if let Some(data) = stdin_data {
        app.load_bytes(data);
    }

    update_title(terminal.backend_mut(), &app)?;

    loop {
        // Synchronized Update: 描画のちらつきを防止
        queue!(terminal.backend_mut(), BeginSynchronizedUpdate)?;
        terminal.draw(|f| app.draw(f))?;
        queue!(terminal.backend_mut(), EndSynchronizedUpdate)?;
        terminal.backend_mut().flush()?;

        app.handle_event()?;

        // 変更状態が切り替わったらタイトルへ反映
        if app
            .take_notices()
            .iter()
            .any(|n| matches!(n, Notice::ModifiedChanged(_)))
        {
            update_title(terminal.backend_mut(), &app)?;
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// ウィンドウタイトルを更新
fn update_title(backend: &mut CrosstermBackend<io::Stdout>, app: &App) -> Result<()> {
    let title = format!(
        "chx - {}{}",
        app.filename().unwrap_or("[New File]"),
        if app.is_modified() { " [+]" } else { "" }
    );
    execute!(backend, SetTitle(&title))?;
    Ok(())
}
