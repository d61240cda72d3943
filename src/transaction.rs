//! ディスクイメージのトランザクション
//!
//! 開始時にイメージ全体を一時ディレクトリへ展開し、読み込みはキャッシュから、
//! 書き込みはステージングに積むだけにする。終了時（`close` または `Drop`）に
//! ステージングされたファイルだけをツール経由で書き戻す。
//!
//! 書き戻しの前にジャーナルを作り、全件成功した場合のみ削除する。
//! 一部失敗しても `close` はエラーを返さない（警告ログとジャーナルが残る）。
//! 展開ディレクトリは成否にかかわらず最後に削除する。

use crate::bridge::DiskTool;
use crate::error::DiskResult;
use crate::journal::Journal;
use crate::naming::{canonical_name, FileEntry, DEFAULT_AUX_TYPE, DEFAULT_FILE_TYPE};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 展開ディレクトリ名の接頭辞
const SCRATCH_PREFIX: &str = "a2edit-";

/// 展開ディレクトリ内の1ファイル
#[derive(Debug, Clone)]
struct ScratchFile {
    entry: FileEntry,
    path: PathBuf,
}

/// 書き戻しの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// 書き込みなし
    Clean,
    /// 全件書き戻し済み
    Committed(Vec<String>),
    /// 一部失敗（ジャーナルが残っている）
    Partial {
        written: Vec<String>,
        failed: Vec<String>,
        /// ジャーナル自体を書けなかった場合は None
        journal: Option<PathBuf>,
    },
}

impl CommitOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CommitOutcome::Partial { .. })
    }
}

/// 1回の open/close サイクル
pub struct DiskTransaction<'t> {
    tool: &'t DiskTool,
    image: PathBuf,
    scratch: Option<TempDir>,
    /// 正規名 → 展開ファイル（タイプ情報の索引を兼ねる）
    listing: BTreeMap<String, ScratchFile>,
    read_cache: HashMap<String, Vec<u8>>,
    write_stage: BTreeMap<String, Vec<u8>>,
    finished: bool,
}

impl<'t> DiskTransaction<'t> {
    /// イメージを展開してトランザクションを開始
    pub fn open(tool: &'t DiskTool, image: impl Into<PathBuf>) -> DiskResult<Self> {
        Self::open_in(tool, image, None)
    }

    /// 展開ディレクトリの親を指定して開始
    ///
    /// ツールが見つからない等で展開に失敗した場合、展開ディレクトリは
    /// 削除されてエラーが返る。
    pub fn open_in(
        tool: &'t DiskTool,
        image: impl Into<PathBuf>,
        scratch_root: Option<&Path>,
    ) -> DiskResult<Self> {
        let image = image.into();

        // このセッションの書き戻しで上書き・削除されるので先に内容を出す
        if let Some(warning) = stale_journal_warning(&Journal::for_image(&image)) {
            log::warn!("{}", warning);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        log::info!("Extracting {} to {}", image.display(), scratch.path().display());
        // `?` で抜けると scratch が drop されディレクトリも消える
        if !tool.extract_all(&image, scratch.path())? {
            log::warn!("Extraction of {} was incomplete", image.display());
        }
        let listing = scan_scratch(scratch.path())?;
        log::info!("Extracted {} file(s) from {}", listing.len(), image.display());

        Ok(DiskTransaction {
            tool,
            image,
            scratch: Some(scratch),
            listing,
            read_cache: HashMap::new(),
            write_stage: BTreeMap::new(),
            finished: false,
        })
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    /// 展開されたファイルの正規名（ソート済み）
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.listing.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = canonical_name(name);
        self.write_stage.contains_key(&key) || self.listing.contains_key(&key)
    }

    /// ファイル名とタイプ情報（新規ファイルはデフォルトタイプ）
    pub fn entry(&self, name: &str) -> Option<FileEntry> {
        let key = canonical_name(name);
        if let Some(file) = self.listing.get(&key) {
            return Some(file.entry.clone());
        }
        self.write_stage
            .contains_key(&key)
            .then(|| FileEntry::untyped(&key))
    }

    /// ファイルを読む（ステージング → キャッシュ → 展開ディレクトリ）
    ///
    /// 見つからなければ None。
    pub fn read(&mut self, name: &str) -> Option<Vec<u8>> {
        let key = canonical_name(name);
        if let Some(data) = self.write_stage.get(&key) {
            return Some(data.clone());
        }
        if let Some(data) = self.read_cache.get(&key) {
            return Some(data.clone());
        }

        let file = self.listing.get(&key)?;
        match fs::read(&file.path) {
            Ok(data) => {
                log::debug!("Read {} ({} bytes)", file.entry.on_disk_name(), data.len());
                self.read_cache.insert(key, data.clone());
                Some(data)
            }
            Err(e) => {
                log::warn!("Failed to read {}: {}", file.path.display(), e);
                None
            }
        }
    }

    /// 書き込みをステージング（同名は置き換え）
    pub fn write(&mut self, name: &str, data: impl Into<Vec<u8>>) {
        let key = canonical_name(name);
        let data = data.into();
        log::debug!("Staged {} ({} bytes)", key, data.len());
        self.write_stage.insert(key, data);
    }

    /// ステージングを取り消す
    pub fn discard(&mut self, name: &str) -> bool {
        self.write_stage.remove(&canonical_name(name)).is_some()
    }

    pub fn staged_names(&self) -> impl Iterator<Item = &str> {
        self.write_stage.keys().map(String::as_str)
    }

    pub fn is_dirty(&self) -> bool {
        !self.write_stage.is_empty()
    }

    /// 書き戻して終了
    pub fn close(mut self) -> CommitOutcome {
        self.finish()
    }

    fn finish(&mut self) -> CommitOutcome {
        self.finished = true;
        let outcome = self.flush();
        self.remove_scratch();
        outcome
    }

    fn type_of(&self, key: &str) -> (u8, u16) {
        match self.listing.get(key) {
            Some(file) => (file.entry.file_type, file.entry.aux_type),
            None => (DEFAULT_FILE_TYPE, DEFAULT_AUX_TYPE),
        }
    }

    fn flush(&mut self) -> CommitOutcome {
        if self.write_stage.is_empty() {
            return CommitOutcome::Clean;
        }

        let journal = Journal::for_image(&self.image);
        let journaled = match journal.record(self.write_stage.keys()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to write journal {}: {}", journal.path().display(), e);
                false
            }
        };

        let mut written = Vec::new();
        let mut failed = Vec::new();
        for (name, data) in &self.write_stage {
            let (file_type, aux_type) = self.type_of(name);
            let ok = match self.tool.write(&self.image, name, data, file_type, aux_type) {
                Ok(ok) => ok,
                Err(e) => {
                    log::warn!("Write-back of {} failed: {}", name, e);
                    false
                }
            };
            if ok {
                log::info!(
                    "Wrote {} ({} bytes, type ${:02X}, aux ${:04X})",
                    name,
                    data.len(),
                    file_type,
                    aux_type
                );
                written.push(name.clone());
            } else {
                failed.push(name.clone());
            }
        }

        if failed.is_empty() {
            if let Err(e) = journal.clear() {
                log::warn!("Failed to remove journal {}: {}", journal.path().display(), e);
            }
            self.write_stage.clear();
            return CommitOutcome::Committed(written);
        }

        if journaled {
            log::warn!(
                "{} of {} file(s) were not written back to {} ({}); journal kept at {}",
                failed.len(),
                failed.len() + written.len(),
                self.image.display(),
                failed.join(", "),
                journal.path().display()
            );
        } else {
            log::warn!(
                "{} of {} file(s) were not written back to {} ({}); no journal could be written",
                failed.len(),
                failed.len() + written.len(),
                self.image.display(),
                failed.join(", ")
            );
        }
        CommitOutcome::Partial {
            written,
            failed,
            journal: journaled.then(|| journal.path().to_path_buf()),
        }
    }

    fn remove_scratch(&mut self) {
        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for DiskTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

/// 前回の失敗で残ったジャーナルの警告文（無ければ None）
fn stale_journal_warning(journal: &Journal) -> Option<String> {
    if !journal.exists() {
        return None;
    }
    let names = match journal.read_names() {
        Ok(names) if names.is_empty() => "no names recorded".to_string(),
        Ok(names) => names.join(", "),
        Err(e) => format!("unreadable: {}", e),
    };
    Some(format!(
        "Journal {} from an earlier failed commit is still present ({}); it will be replaced by this session's commit",
        journal.path().display(),
        names
    ))
}

/// 展開ディレクトリを走査して正規名の索引を作る
///
/// サブディレクトリ内のファイルは `DIR/NAME` の形で登録する。
fn scan_scratch(dir: &Path) -> io::Result<BTreeMap<String, ScratchFile>> {
    let mut paths = Vec::new();
    collect_files(dir, &mut Vec::new(), &mut paths)?;
    paths.sort();

    let mut listing = BTreeMap::new();
    for (prefix, path) in paths {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let leaf = FileEntry::from_on_disk_name(&file_name.to_string_lossy());
        let entry = if prefix.is_empty() {
            leaf
        } else {
            FileEntry::new(
                &format!("{}/{}", prefix, leaf.name),
                leaf.file_type,
                leaf.aux_type,
            )
        };
        if listing.contains_key(&entry.name) {
            log::debug!("Ignoring duplicate {} in scratch directory", path.display());
            continue;
        }
        listing.insert(entry.name.clone(), ScratchFile { entry, path });
    }
    Ok(listing)
}

/// (親ディレクトリの相対パス, ファイルパス) を再帰的に集める
fn collect_files(
    dir: &Path,
    parents: &mut Vec<String>,
    out: &mut Vec<(String, PathBuf)>,
) -> io::Result<()> {
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let file_type = dir_entry.file_type()?;
        if file_type.is_dir() {
            parents.push(dir_entry.file_name().to_string_lossy().into_owned());
            collect_files(&dir_entry.path(), parents, out)?;
            parents.pop();
        } else if file_type.is_file() {
            out.push((parents.join("/"), dir_entry.path()));
        }
    }
    Ok(())
}
