//! サブプロセス実行
//!
//! ディスクツールの呼び出しはすべて `CommandRunner` を経由する。
//! 本番では `SystemRunner` が実際にプロセスを起動し、テストでは
//! 決め打ちの結果を返す実装に差し替える。

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;

/// 1回の実行結果（標準出力・標準エラーはテキストとして保持）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 終了コード（シグナル終了時は None）
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// 終了コードの説明
    pub fn exit_description(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// 失敗時の診断メッセージ（stderr → stdout → 終了コードの順）
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        self.exit_description()
    }
}

/// プロセス実行の抽象
pub trait CommandRunner {
    /// `program args...` を実行して出力を回収する
    ///
    /// 終了コードが 0 以外でも `Ok` を返す。`Err` は起動自体の失敗のみ。
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput>;
}

/// `std::process::Command` による実装
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
