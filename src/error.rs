//! エラー型
//!
//! ディスクツール呼び出しで発生するエラーの分類。
//! ツールが実行できたが失敗した場合は、ほとんどの操作で値（`false`、空リスト、
//! `VolumeInfo::error`）として返され、ここには来ない。

use thiserror::Error;

/// ディスク操作の結果型
pub type DiskResult<T> = Result<T, DiskError>;

/// ディスク操作のエラー
#[derive(Error, Debug)]
pub enum DiskError {
    /// ディスクツールが見つからない（確認した場所を列挙）
    #[error("disk tool not found; checked: {}", .checked.join(", "))]
    ToolNotFound { checked: Vec<String> },

    /// ツールは起動したが結果が使えない
    #[error("disk tool `{verb}` failed: {message}")]
    ToolFailed { verb: &'static str, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
