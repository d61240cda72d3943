//! A2EDIT - Apple II RPG save/resource editor
//!
//! ProDOS ディスクイメージ上のセーブ・リソースファイルを編集するための
//! トランザクション層:
//! - 外部ツール（diskiigs）によるイメージの展開と書き戻し
//! - `NAME#TTAAAA` 形式のファイルタイプサフィックス
//! - 読み込みキャッシュ／書き込みステージング／ジャーナル付きコミット
//! - ファイル名によるカテゴリ分類

pub mod error;
pub mod naming;
pub mod runner;
pub mod locator;
pub mod bridge;
pub mod journal;
pub mod transaction;
pub mod catalog;
pub mod config;

#[cfg(test)]
mod testing;

pub use bridge::DiskTool;
pub use catalog::{Catalog, Session};
pub use error::{DiskError, DiskResult};
pub use transaction::{CommitOutcome, DiskTransaction};
