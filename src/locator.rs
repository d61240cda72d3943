//! ディスクツールの探索
//!
//! 探索順は `ToolLocatorConfig` が持つリゾルバのリスト順。
//! 標準構成: 環境変数 `DISKIIGS_PATH` → `PATH` → ビルド出力の定位置。

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// ツールのパスを上書きする環境変数
pub const TOOL_ENV_VAR: &str = "DISKIIGS_PATH";

/// ツールの実行ファイル名（拡張子なし）
pub const TOOL_NAME: &str = "diskiigs";

/// 1つの探索方法
pub struct Resolver {
    /// エラーメッセージに出す確認場所
    label: String,
    resolve: Box<dyn Fn() -> Option<PathBuf>>,
}

impl Resolver {
    pub fn new<F>(label: impl Into<String>, resolve: F) -> Self
    where
        F: Fn() -> Option<PathBuf> + 'static,
    {
        Resolver {
            label: label.into(),
            resolve: Box::new(resolve),
        }
    }

    /// 環境変数で指定されたパス
    pub fn env_var(var: &str) -> Self {
        let name = var.to_string();
        Self::new(format!("${}", var), move || {
            env::var_os(&name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .filter(|p| is_executable_file(p))
        })
    }

    /// 固定パス（設定ファイルの指定など）
    pub fn fixed(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(label, move || Some(path.clone()).filter(|p| is_executable_file(p)))
    }

    /// 実行時の `PATH` から検索
    pub fn search_path(tool_name: &str) -> Self {
        let tool_name = tool_name.to_string();
        Self::new("PATH", move || {
            let path = env::var_os("PATH")?;
            find_in_dirs(env::split_paths(&path), &tool_name)
        })
    }

    /// 候補パスの一覧（先頭から順に）
    pub fn candidates(paths: Vec<PathBuf>) -> Vec<Self> {
        paths
            .into_iter()
            .map(|p| Self::fixed(p.display().to_string(), p))
            .collect()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn resolve(&self) -> Option<PathBuf> {
        (self.resolve)()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("label", &self.label).finish()
    }
}

/// ツール探索の設定
#[derive(Debug, Default)]
pub struct ToolLocatorConfig {
    resolvers: Vec<Resolver>,
}

impl ToolLocatorConfig {
    pub fn new(resolvers: Vec<Resolver>) -> Self {
        ToolLocatorConfig { resolvers }
    }

    /// 標準の探索順
    pub fn standard() -> Self {
        let mut resolvers = vec![
            Resolver::env_var(TOOL_ENV_VAR),
            Resolver::search_path(TOOL_NAME),
        ];
        resolvers.extend(Resolver::candidates(default_candidates()));
        Self::new(resolvers)
    }

    /// 末尾に探索方法を追加
    pub fn push(&mut self, resolver: Resolver) {
        self.resolvers.push(resolver);
    }

    /// 指定位置に探索方法を挿入
    pub fn insert(&mut self, index: usize, resolver: Resolver) {
        let index = index.min(self.resolvers.len());
        self.resolvers.insert(index, resolver);
    }

    /// 最初に見つかったパス。見つからなければ None
    pub fn locate(&self) -> Option<PathBuf> {
        for resolver in &self.resolvers {
            if let Some(path) = resolver.resolve() {
                log::debug!("disk tool resolved via {}: {}", resolver.label(), path.display());
                return Some(path);
            }
        }
        None
    }

    /// 確認する場所の一覧（探索順）
    pub fn checked_locations(&self) -> Vec<String> {
        self.resolvers.iter().map(|r| r.label().to_string()).collect()
    }
}

/// プラットフォームの実行ファイル名
pub fn exe_name(tool_name: &str) -> String {
    format!("{}{}", tool_name, env::consts::EXE_SUFFIX)
}

/// ディレクトリ群から実行ファイルを探す
pub fn find_in_dirs<I>(dirs: I, tool_name: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let file_name = exe_name(tool_name);
    dirs.into_iter()
        .filter(|d| !d.as_os_str().is_empty())
        .map(|d| d.join(&file_name))
        .find(|p| is_executable_file(p))
}

/// ビルド出力の定位置
///
/// ツールをソースからビルドしてインストールしていない場合を想定。
pub fn default_candidates() -> Vec<PathBuf> {
    let file_name = exe_name(TOOL_NAME);
    let mut bases: Vec<PathBuf> = vec![PathBuf::from(".")];
    if let Some(home) = home_dir() {
        bases.push(home.join(TOOL_NAME));
        bases.push(home.join("src").join(TOOL_NAME));
    }
    bases.push(PathBuf::from("..").join(TOOL_NAME));

    let mut candidates = Vec::new();
    for base in bases {
        for profile in ["release", "debug"] {
            candidates.push(base.join("target").join(profile).join(&file_name));
        }
    }
    candidates
}

fn home_dir() -> Option<PathBuf> {
    let var: OsString = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE"))?;
    if var.is_empty() {
        None
    } else {
        Some(PathBuf::from(var))
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_tool(dir: &Path) -> PathBuf {
        let path = dir.join(exe_name(TOOL_NAME));
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn test_env_override_wins_over_path() {
        let locator = ToolLocatorConfig::new(vec![
            Resolver::new("$DISKIIGS_PATH", || Some(PathBuf::from("/opt/custom/diskiigs"))),
            Resolver::new("PATH", || Some(PathBuf::from("/usr/bin/diskiigs"))),
        ]);
        assert_eq!(locator.locate(), Some(PathBuf::from("/opt/custom/diskiigs")));
    }

    #[test]
    fn test_falls_through_to_later_resolver() {
        let locator = ToolLocatorConfig::new(vec![
            Resolver::new("$DISKIIGS_PATH", || None),
            Resolver::new("PATH", || None),
            Resolver::new("./target/release/diskiigs", || {
                Some(PathBuf::from("./target/release/diskiigs"))
            }),
        ]);
        assert_eq!(locator.locate(), Some(PathBuf::from("./target/release/diskiigs")));
    }

    #[test]
    fn test_not_found_is_none() {
        let locator = ToolLocatorConfig::new(vec![
            Resolver::new("$DISKIIGS_PATH", || None),
            Resolver::new("PATH", || None),
        ]);
        assert_eq!(locator.locate(), None);
        assert_eq!(locator.checked_locations(), vec!["$DISKIIGS_PATH", "PATH"]);
    }

    #[test]
    fn test_standard_order() {
        let labels = ToolLocatorConfig::standard().checked_locations();
        assert_eq!(labels[0], "$DISKIIGS_PATH");
        assert_eq!(labels[1], "PATH");
        assert!(labels[2..].iter().any(|l| l.contains("release")));
    }

    #[test]
    fn test_find_in_dirs() {
        let empty = tempfile::tempdir().unwrap();
        let with_tool = tempfile::tempdir().unwrap();
        let tool = make_tool(with_tool.path());
        let found = find_in_dirs(
            vec![empty.path().to_path_buf(), with_tool.path().to_path_buf()],
            TOOL_NAME,
        );
        assert_eq!(found, Some(tool));
        assert_eq!(find_in_dirs(vec![empty.path().to_path_buf()], TOOL_NAME), None);
    }

    #[test]
    fn test_fixed_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Resolver::fixed("config", dir.path().join("nope"));
        assert_eq!(missing.resolve(), None);
        let tool = make_tool(dir.path());
        let present = Resolver::fixed("config", tool.clone());
        assert_eq!(present.resolve(), Some(tool));
        // ディレクトリは実行ファイルとみなさない
        assert_eq!(Resolver::fixed("dir", dir.path()).resolve(), None);
    }
}
