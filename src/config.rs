//! 設定ファイル管理モジュール
//!
//! ツールの場所や最後に開いたイメージをJSON形式で永続化

use crate::locator::{Resolver, ToolLocatorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 設定ファイルのデフォルトファイル名
const CONFIG_FILENAME: &str = "a2edit_config.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 相対パスを実行ファイルディレクトリからの絶対パスに解決
pub fn resolve_path(relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_exe_dir().join(relative)
    }
}

/// 設定ファイルのパスを取得
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join(CONFIG_FILENAME)
}

/// エディタ設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// ディスクツールのパス（環境変数の次、PATHより前に確認）
    #[serde(default)]
    pub tool_path: Option<String>,
    /// 追加のツール候補（標準の候補の後に確認）
    #[serde(default)]
    pub extra_candidates: Vec<String>,
    /// 最後に使用したディスクイメージ
    #[serde(default)]
    pub last_image: Option<String>,
    /// 展開用一時ディレクトリの親（未設定ならシステムの一時ディレクトリ）
    #[serde(default)]
    pub scratch_root: Option<String>,
}

impl Config {
    /// 設定ファイルを読み込む（実行ファイルと同じディレクトリから）
    pub fn load() -> Self {
        Self::load_from(get_config_path())
    }

    /// オプション指定で設定ファイルを読み込む
    /// config_path が指定されていればそれを、なければ実行ファイルディレクトリの
    /// a2edit_config.json を使う
    pub fn load_with_options(config_path: Option<&str>) -> (Self, PathBuf) {
        let config_file_path = match config_path {
            Some(path) => PathBuf::from(path),
            None => get_config_path(),
        };
        let config = Self::load_from(&config_file_path);
        (config, config_file_path)
    }

    /// 指定したパスから設定を読み込む
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 設定ファイルを保存する（実行ファイルと同じディレクトリに）
    pub fn save(&self) -> Result<(), String> {
        self.save_to(get_config_path())
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// ツール探索の設定を組み立てる
    /// 優先順位:
    /// 1. 環境変数 DISKIIGS_PATH
    /// 2. 設定ファイルの tool_path
    /// 3. PATH
    /// 4. ビルド出力の定位置
    /// 5. extra_candidates
    pub fn locator(&self) -> ToolLocatorConfig {
        let mut locator = ToolLocatorConfig::standard();
        // 環境変数の次、PATH より前
        if let Some(tool_path) = &self.tool_path {
            locator.insert(
                1,
                Resolver::fixed(
                    format!("config tool_path ({})", tool_path),
                    resolve_path(tool_path),
                ),
            );
        }
        for candidate in Resolver::candidates(
            self.extra_candidates.iter().map(|c| resolve_path(c)).collect(),
        ) {
            locator.push(candidate);
        }
        locator
    }

    /// 展開用一時ディレクトリの親
    pub fn scratch_root_path(&self) -> Option<PathBuf> {
        self.scratch_root.as_deref().map(resolve_path)
    }

    /// 引数で指定されたイメージ、なければ最後に使用したイメージ
    pub fn image_or_last(&self, image: Option<&str>) -> Option<PathBuf> {
        image
            .map(PathBuf::from)
            .or_else(|| self.last_image.as_ref().map(PathBuf::from))
    }
}
