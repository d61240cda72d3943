//! 書き戻しジャーナル
//!
//! フラッシュ開始直前に書き戻し対象の名前を `<image>.journal` に記録し、
//! 全件成功したら削除する。トランザクション終了後に残っていれば
//! 一部の書き込みが失敗したことを意味する（自動再実行はしない）。

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// ジャーナルファイルの拡張子
pub const JOURNAL_EXTENSION: &str = "journal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// イメージと同じ場所の `<image>.journal`
    pub fn for_image(image: &Path) -> Self {
        let mut name: OsString = image.as_os_str().to_owned();
        name.push(".");
        name.push(JOURNAL_EXTENSION);
        Journal {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// 名前を1行ずつ書き出す（既存の内容は置き換え）
    pub fn record<I, S>(&self, names: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = String::new();
        for name in names {
            body.push_str(name.as_ref());
            body.push('\n');
        }
        fs::write(&self.path, body)
    }

    /// 記録された名前（無ければ空）
    pub fn read_names(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(body) => Ok(body
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// 最終更新時刻
    pub fn modified(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    /// 削除（存在しなければ何もしない）
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
