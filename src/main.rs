//! A2EDIT - Apple II RPG save/resource editor
//!
//! A2EDIT は ProDOS ディスクイメージ上のゲームデータを編集するツールです。
//!
//! # 機能
//! - ボリューム情報・ディレクトリ一覧の表示
//! - ゲームファイルのカテゴリ一覧
//! - ファイルの取り出し・書き込み・バイト単位の修正
//! - 書き戻し失敗時のジャーナル確認
//!
//! # 使用方法
//! ```
//! a2edit catalog ultima3.po
//! a2edit poke --image ultima3.po ROST 0x10 63
//! ```

use a2edit::bridge::DiskTool;
use a2edit::catalog::Session;
use a2edit::config::Config;
use a2edit::journal::Journal;
use a2edit::transaction::CommitOutcome;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A2EDIT - Apple II RPG save/resource editor
#[derive(Parser, Debug)]
#[command(name = "a2edit")]
#[command(author = "A2RS Project")]
#[command(version = "0.2.0")]
#[command(about = "A2EDIT - Apple II RPG save/resource editor", long_about = None)]
struct Args {
    /// 設定ファイル（省略時は実行ファイルと同じディレクトリの a2edit_config.json）
    #[arg(long, global = true)]
    config: Option<String>,

    /// 詳細ログ（debug レベル）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ディスクツールの場所を表示
    Locate,

    /// ボリューム情報を表示
    Info {
        /// ディスクイメージ（省略時は前回のイメージ）
        image: Option<String>,
    },

    /// ディレクトリ一覧
    List {
        image: Option<String>,
        /// ProDOS ディレクトリ
        #[arg(long, default_value = "/")]
        path: String,
    },

    /// ゲームファイルをカテゴリ別に表示
    Catalog {
        image: Option<String>,
    },

    /// ファイルを取り出す（出力先を省略するとダンプ表示）
    Export {
        #[arg(long)]
        image: Option<String>,
        /// ファイル名（例: ROST）
        name: String,
        /// 出力ファイル
        #[arg(short, long)]
        output: Option<String>,
    },

    /// ホストのファイルをディスクへ書き込む
    Import {
        #[arg(long)]
        image: Option<String>,
        name: String,
        /// 書き込むファイル
        file: String,
    },

    /// バイトを書き換える
    Poke {
        #[arg(long)]
        image: Option<String>,
        name: String,
        /// オフセット（10進または0x付き16進）
        offset: String,
        /// 16進バイト列（例: 63 or 6300FF）
        bytes: String,
    },

    /// 書き戻し失敗のジャーナルを確認
    Journal {
        image: Option<String>,
        /// ジャーナルを削除
        #[arg(long)]
        clear: bool,
    },
}

/// ログレベルを決定（RUST_LOG 未設定時は warn）
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// オフセットをパース（10進 or 0x/$ 付き16進）
fn parse_offset(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix('$') {
        usize::from_str_radix(hex, 16)
    } else {
        s.parse::<usize>()
    };
    parsed.map_err(|e| format!("Invalid offset {:?}: {}", s, e))
}

/// 16進バイト列をパース（空白区切り可）
fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(format!("Invalid hex bytes: {:?}", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex bytes {:?}: {}", s, e))
        })
        .collect()
}

/// パッチ範囲（データに収まらなければ None）
fn patch_range(offset: usize, len: usize, data_len: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(len).filter(|&end| end <= data_len)?;
    Some(offset..end)
}

/// 16バイト単位のダンプ
fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:04X}: ", row * 16));
        for b in chunk {
            out.push_str(&format!("{:02X} ", b));
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push(' ');
        for &b in chunk {
            // Apple II のテキストは上位ビットが立っている
            let c = b & 0x7F;
            out.push(if (0x20..0x7F).contains(&c) { c as char } else { '.' });
        }
        out.push('\n');
    }
    out
}

fn report_outcome(outcome: &CommitOutcome) -> Result<(), String> {
    match outcome {
        CommitOutcome::Clean => {
            println!("No changes.");
            Ok(())
        }
        CommitOutcome::Committed(names) => {
            println!("Wrote {}", names.join(", "));
            Ok(())
        }
        CommitOutcome::Partial { written, failed, journal } => {
            if !written.is_empty() {
                println!("Wrote {}", written.join(", "));
            }
            let journal = journal
                .as_ref()
                .map(|p| format!("; see journal {}", p.display()))
                .unwrap_or_default();
            Err(format!("Failed to write {}{}", failed.join(", "), journal))
        }
    }
}

struct App {
    config: Config,
    config_path: PathBuf,
    tool: DiskTool,
}

impl App {
    fn image(&self, image: Option<&str>) -> Result<PathBuf, String> {
        self.config
            .image_or_last(image)
            .ok_or_else(|| "No disk image given and no previous image recorded".to_string())
    }

    /// 使用したイメージを設定に記録
    fn remember(&mut self, image: &Path) {
        let image = image.display().to_string();
        if self.config.last_image.as_deref() == Some(image.as_str()) {
            return;
        }
        self.config.last_image = Some(image);
        if let Err(e) = self.config.save_to(&self.config_path) {
            log::warn!("{}", e);
        }
    }

    fn open_session(&self, image: &Path) -> Result<Session<'_>, String> {
        let scratch_root = self.config.scratch_root_path();
        Session::open_in(&self.tool, image, scratch_root.as_deref()).map_err(|e| e.to_string())
    }

    fn run(&mut self, command: Command) -> Result<(), String> {
        match command {
            Command::Locate => match self.tool.locate() {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => Err(format!(
                    "Disk tool not found; checked: {}",
                    self.tool.checked_locations().join(", ")
                )),
            },

            Command::Info { image } => {
                let image = self.image(image.as_deref())?;
                let info = self.tool.info(&image).map_err(|e| e.to_string())?;
                if let Some(error) = info.error() {
                    return Err(format!("{}: {}", image.display(), error));
                }
                for (key, value) in info.fields() {
                    println!("{}: {}", key, value);
                }
                self.remember(&image);
                Ok(())
            }

            Command::List { image, path } => {
                let image = self.image(image.as_deref())?;
                let entries = self.tool.list(&image, &path).map_err(|e| e.to_string())?;
                for entry in &entries {
                    println!("{:<16} {:<5} {:>7}", entry.name, entry.file_type, entry.size);
                }
                println!("{} file(s)", entries.len());
                self.remember(&image);
                Ok(())
            }

            Command::Catalog { image } => {
                let image = self.image(image.as_deref())?;
                let session = self.open_session(&image)?;
                if session.catalog().is_empty() {
                    println!("No known game files on {}", image.display());
                }
                for spec in session.catalog().categories() {
                    println!("{} [{}]", spec.title, spec.key);
                    for entry in session.files_in(spec.key) {
                        println!("  {:<6} {}", entry.name, entry.label);
                    }
                }
                session.close();
                self.remember(&image);
                Ok(())
            }

            Command::Export { image, name, output } => {
                let image = self.image(image.as_deref())?;
                let session = self.open_session(&image)?;
                let data = session
                    .read(&name)
                    .ok_or_else(|| format!("{} not found on {}", name, image.display()))?;
                session.close();
                match output {
                    Some(output) => {
                        fs::write(&output, &data)
                            .map_err(|e| format!("Failed to write {}: {}", output, e))?;
                        println!("Exported {} ({} bytes) to {}", name, data.len(), output);
                    }
                    None => print!("{}", hex_dump(&data)),
                }
                self.remember(&image);
                Ok(())
            }

            Command::Import { image, name, file } => {
                let image = self.image(image.as_deref())?;
                let data = fs::read(&file).map_err(|e| format!("Failed to read {}: {}", file, e))?;
                let session = self.open_session(&image)?;
                session.write(&name, data);
                let outcome = session.close();
                self.remember(&image);
                report_outcome(&outcome)
            }

            Command::Poke { image, name, offset, bytes } => {
                let image = self.image(image.as_deref())?;
                let offset = parse_offset(&offset)?;
                let patch = parse_hex_bytes(&bytes)?;
                let session = self.open_session(&image)?;
                let Some(mut data) = session.read(&name) else {
                    session.close();
                    return Err(format!("{} not found on {}", name, image.display()));
                };
                let Some(range) = patch_range(offset, patch.len(), data.len()) else {
                    session.close();
                    return Err(format!(
                        "Patch of {} bytes at {} is outside {} ({} bytes)",
                        patch.len(),
                        offset,
                        name,
                        data.len()
                    ));
                };
                data[range].copy_from_slice(&patch);
                {
                    let save = session.make_save_callback(&name);
                    save(&data);
                }
                let outcome = session.close();
                self.remember(&image);
                report_outcome(&outcome)
            }

            Command::Journal { image, clear } => {
                let image = self.image(image.as_deref())?;
                let journal = Journal::for_image(&image);
                if !journal.exists() {
                    println!("No journal for {}", image.display());
                    return Ok(());
                }
                let names = journal.read_names().map_err(|e| e.to_string())?;
                let modified = journal
                    .modified()
                    .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                println!("Journal {} (written {})", journal.path().display(), modified);
                println!("An earlier commit did not finish; these files may be stale:");
                for name in &names {
                    println!("  {}", name);
                }
                if clear {
                    journal.clear().map_err(|e| e.to_string())?;
                    println!("Journal removed.");
                }
                Ok(())
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    let (config, config_path) = Config::load_with_options(args.config.as_deref());
    let tool = DiskTool::new(config.locator());
    let mut app = App {
        config,
        config_path,
        tool,
    };

    if let Err(e) = app.run(args.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
