//! 外部ディスクツール（diskiigs）へのブリッジ
//!
//! ProDOS イメージの読み書きは自前で行わず、すべて外部ツールに委譲する。
//! ツールの実行失敗（0以外の終了コード）は値で返し、`Err` になるのは
//! ツールが見つからない・起動できない場合のみ。

use crate::error::{DiskError, DiskResult};
use crate::locator::ToolLocatorConfig;
use crate::naming::{canonical_name, encode_suffix, FileEntry};
use crate::runner::{CommandOutput, CommandRunner, SystemRunner};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// `info` の結果（`Key: Value` 行の集合）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    fields: BTreeMap<String, String>,
}

impl VolumeInfo {
    /// ツール失敗時に入るキー
    pub const ERROR_KEY: &'static str = "error";

    /// 失敗時の診断メッセージ
    pub fn error(&self) -> Option<&str> {
        self.get(Self::ERROR_KEY)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    fn failed(message: String) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(Self::ERROR_KEY.to_string(), message);
        VolumeInfo { fields }
    }
}

/// `list -l` の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    /// ツール表記のタイプ（"BIN", "TXT", "$06" など）
    pub file_type: String,
    pub size: u64,
}

/// 単体展開したファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub entry: FileEntry,
    pub data: Vec<u8>,
}

/// ディスクツール
pub struct DiskTool {
    locator: ToolLocatorConfig,
    runner: Box<dyn CommandRunner>,
}

impl DiskTool {
    pub fn new(locator: ToolLocatorConfig) -> Self {
        Self::with_runner(locator, Box::new(SystemRunner))
    }

    pub fn with_runner(locator: ToolLocatorConfig, runner: Box<dyn CommandRunner>) -> Self {
        DiskTool { locator, runner }
    }

    /// ツールのパス（見つからなければ None）
    pub fn locate(&self) -> Option<PathBuf> {
        self.locator.locate()
    }

    /// 確認した場所の一覧
    pub fn checked_locations(&self) -> Vec<String> {
        self.locator.checked_locations()
    }

    /// `info <image>`
    pub fn info(&self, image: &Path) -> DiskResult<VolumeInfo> {
        let out = self.run("info", vec!["info".into(), image.into()])?;
        if !out.success() {
            return Ok(VolumeInfo::failed(out.diagnostic()));
        }
        Ok(parse_info(&out.stdout))
    }

    /// `list -l <image> <path>`
    pub fn list(&self, image: &Path, path: &str) -> DiskResult<Vec<ListEntry>> {
        let out = self.run("list", vec!["list".into(), "-l".into(), image.into(), path.into()])?;
        if !out.success() {
            log::debug!("list {} failed: {}", path, out.diagnostic());
            return Ok(Vec::new());
        }
        Ok(parse_list(&out.stdout))
    }

    /// `extract <image> <prodos-path> -o <tmp>` で1ファイルを取り出す
    pub fn extract(&self, image: &Path, prodos_path: &str) -> DiskResult<Option<ExtractedFile>> {
        let tmp = tempfile::Builder::new().prefix("a2edit-extract-").tempdir()?;
        let out = self.run(
            "extract",
            vec![
                "extract".into(),
                image.into(),
                prodos_path.into(),
                "-o".into(),
                tmp.path().into(),
            ],
        )?;
        if !out.success() {
            log::debug!("extract {} failed: {}", prodos_path, out.diagnostic());
            return Ok(None);
        }

        let wanted = canonical_name(leaf_name(prodos_path));
        let mut fallback = None;
        for dir_entry in fs::read_dir(tmp.path())? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let on_disk = dir_entry.file_name().to_string_lossy().into_owned();
            let entry = FileEntry::from_on_disk_name(&on_disk);
            if entry.name == wanted {
                let data = fs::read(dir_entry.path())?;
                return Ok(Some(ExtractedFile { entry, data }));
            }
            if fallback.is_none() {
                fallback = Some((entry, dir_entry.path()));
            }
        }

        // ツールが別名で書き出した場合は唯一のファイルを採用
        match fallback {
            Some((entry, path)) => {
                let data = fs::read(path)?;
                Ok(Some(ExtractedFile { entry, data }))
            }
            None => Ok(None),
        }
    }

    /// `extract-all <image> -o <out_dir>`
    pub fn extract_all(&self, image: &Path, out_dir: &Path) -> DiskResult<bool> {
        fs::create_dir_all(out_dir)?;
        let out = self.run(
            "extract-all",
            vec!["extract-all".into(), image.into(), "-o".into(), out_dir.into()],
        )?;
        if !out.success() {
            log::warn!("extract-all {} failed: {}", image.display(), out.diagnostic());
        }
        Ok(out.success())
    }

    /// `add <image> <name#TTAAAA> --to <dir>` でファイルを書き込む
    ///
    /// `name` は `DIR/NAME` 形式も可。ステージングファイルは使い捨ての
    /// 一時ディレクトリに置く。
    pub fn write(
        &self,
        image: &Path,
        name: &str,
        data: &[u8],
        file_type: u8,
        aux_type: u16,
    ) -> DiskResult<bool> {
        let program = self.program()?;
        let (dir, leaf) = split_prodos_path(name);

        let staging = tempfile::Builder::new().prefix("a2edit-add-").tempdir()?;
        let local = staging.path().join(encode_suffix(leaf, file_type, aux_type));
        fs::write(&local, data)?;

        let out = self.run_program(
            &program,
            "add",
            vec!["add".into(), image.into(), local.into(), "--to".into(), dir.into()],
        )?;
        if !out.success() {
            log::warn!("add {} to {} failed: {}", name, image.display(), out.diagnostic());
        }
        Ok(out.success())
    }

    fn program(&self) -> DiskResult<PathBuf> {
        self.locate().ok_or_else(|| DiskError::ToolNotFound {
            checked: self.checked_locations(),
        })
    }

    fn run(&self, verb: &'static str, args: Vec<OsString>) -> DiskResult<CommandOutput> {
        let program = self.program()?;
        self.run_program(&program, verb, args)
    }

    /// 起動失敗は `ToolFailed` として返す
    fn run_program(
        &self,
        program: &Path,
        verb: &'static str,
        args: Vec<OsString>,
    ) -> DiskResult<CommandOutput> {
        log::debug!("run {} {:?}", program.display(), args);
        self.runner
            .run(program, &args)
            .map_err(|e| DiskError::ToolFailed {
                verb,
                message: e.to_string(),
            })
    }
}

/// `Key: Value` 行をパース
pub fn parse_info(stdout: &str) -> VolumeInfo {
    let mut fields = BTreeMap::new();
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields.insert(key.to_string(), value.trim().to_string());
        }
    }
    VolumeInfo { fields }
}

/// `list -l` の出力をパース（ヘッダ・区切り・空行は読み飛ばす）
pub fn parse_list(stdout: &str) -> Vec<ListEntry> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_separator(trimmed) {
            continue;
        }
        let cols: Vec<&str> = trimmed.split_whitespace().collect();
        if cols.len() < 3 || cols[0].eq_ignore_ascii_case("name") {
            continue;
        }
        let Ok(size) = cols[2].parse::<u64>() else {
            continue;
        };
        entries.push(ListEntry {
            name: cols[0].to_string(),
            file_type: cols[1].to_string(),
            size,
        });
    }
    entries
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '=' | '+' | ' '))
}

/// `DIR/NAME` → ("/DIR", "NAME")、`NAME` → ("/", "NAME")
fn split_prodos_path(name: &str) -> (String, &str) {
    let trimmed = name.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, leaf)) => (format!("/{}", dir), leaf),
        None => ("/".to_string(), trimmed),
    }
}

fn leaf_name(prodos_path: &str) -> &str {
    prodos_path.rsplit('/').next().unwrap_or(prodos_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Resolver;
    use crate::testing::{fake_tool, FakeDiskTool};

    #[test]
    fn test_parse_info() {
        let info = parse_info("Volume: ULTIMA\nFormat: ProDOS\nFree Blocks: 12\n\nnoise line\n");
        assert_eq!(info.get("Volume"), Some("ULTIMA"));
        assert_eq!(info.get("Free Blocks"), Some("12"));
        assert_eq!(info.error(), None);
        assert_eq!(info.fields().len(), 3);
    }

    #[test]
    fn test_parse_list() {
        let stdout = "\
Name             Type   Size  Modified
---------------- ----  -----  --------
ROST             BIN    1280  01-JAN-86
TEXT             BIN    1024

SUBDIR           DIR     512
bogus line
";
        let entries = parse_list(stdout);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            ListEntry {
                name: "ROST".to_string(),
                file_type: "BIN".to_string(),
                size: 1280,
            }
        );
        assert_eq!(entries[2].file_type, "DIR");
    }

    #[test]
    fn test_split_prodos_path() {
        assert_eq!(split_prodos_path("ROST"), ("/".to_string(), "ROST"));
        assert_eq!(split_prodos_path("GAME/ROST"), ("/GAME".to_string(), "ROST"));
        assert_eq!(split_prodos_path("/A/B/C"), ("/A/B".to_string(), "C"));
    }

    #[test]
    fn test_info_failure_has_error_field() {
        let fake = FakeDiskTool::new();
        fake.fail_verb("info", "not a ProDOS image");
        let tool = fake_tool(&fake);
        let info = tool.info(Path::new("/disks/u3.po")).unwrap();
        assert_eq!(info.error(), Some("not a ProDOS image"));
    }

    #[test]
    fn test_list_failure_is_empty() {
        let fake = FakeDiskTool::new();
        fake.fail_verb("list", "no such directory");
        let tool = fake_tool(&fake);
        assert!(tool.list(Path::new("/disks/u3.po"), "/").unwrap().is_empty());
    }

    #[test]
    fn test_list_uses_long_format() {
        let fake = FakeDiskTool::new();
        fake.add_file("ROST#069500", vec![0; 1280]);
        let tool = fake_tool(&fake);
        let entries = tool.list(Path::new("/disks/u3.po"), "/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ROST");
        assert_eq!(entries[0].size, 1280);
        let calls = fake.calls();
        assert_eq!(calls[0][..2], ["list".to_string(), "-l".to_string()]);
    }

    #[test]
    fn test_tool_not_found_names_locations() {
        let locator = ToolLocatorConfig::new(vec![
            Resolver::new("$DISKIIGS_PATH", || None),
            Resolver::new("PATH", || None),
            Resolver::new("./target/release/diskiigs", || None),
        ]);
        let tool = DiskTool::with_runner(locator, Box::new(FakeDiskTool::new()));
        let err = tool.info(Path::new("x.po")).unwrap_err();
        match err {
            DiskError::ToolNotFound { checked } => {
                assert_eq!(checked, vec!["$DISKIIGS_PATH", "PATH", "./target/release/diskiigs"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            tool.write(Path::new("x.po"), "ROST", b"", 6, 0),
            Err(DiskError::ToolNotFound { .. })
        ));
    }

    #[test]
    fn test_extract_single_file() {
        let fake = FakeDiskTool::new();
        fake.add_file("ROST#069500", vec![7; 16]);
        fake.add_file("TEXT#060800", vec![1; 4]);
        let tool = fake_tool(&fake);
        let file = tool.extract(Path::new("u3.po"), "rost").unwrap().unwrap();
        assert_eq!(file.entry, FileEntry::new("ROST", 0x06, 0x9500));
        assert_eq!(file.data, vec![7; 16]);
        assert!(tool.extract(Path::new("u3.po"), "NOPE").unwrap().is_none());
    }

    #[test]
    fn test_extract_all_creates_dir() {
        let fake = FakeDiskTool::new();
        fake.add_file("PRTY#060000", vec![0; 64]);
        let tool = fake_tool(&fake);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        assert!(tool.extract_all(Path::new("u3.po"), &out).unwrap());
        assert!(out.join("PRTY#060000").is_file());

        fake.fail_verb("extract-all", "read error");
        assert!(!tool.extract_all(Path::new("u3.po"), &out).unwrap());
    }

    #[test]
    fn test_write_stages_suffixed_file() {
        let fake = FakeDiskTool::new();
        let tool = fake_tool(&fake);
        assert!(tool
            .write(Path::new("u3.po"), "GAME/ROST", &[1, 2, 3], 0x06, 0x9500)
            .unwrap());
        let writes = fake.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].name, "ROST");
        assert_eq!(writes[0].dir, "/GAME");
        assert_eq!(writes[0].file_type, 0x06);
        assert_eq!(writes[0].aux_type, 0x9500);
        assert_eq!(writes[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_spawn_failure_is_tool_failed() {
        struct SpawnFails;
        impl CommandRunner for SpawnFails {
            fn run(&self, _program: &Path, _args: &[OsString]) -> std::io::Result<CommandOutput> {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
            }
        }
        let locator = ToolLocatorConfig::new(vec![Resolver::new("fixed", || {
            Some(PathBuf::from("/usr/bin/diskiigs"))
        })]);
        let tool = DiskTool::with_runner(locator, Box::new(SpawnFails));
        assert!(matches!(
            tool.write(Path::new("u3.po"), "ROST", &[0], 0x06, 0),
            Err(DiskError::ToolFailed { verb: "add", .. })
        ));
        assert!(matches!(
            tool.info(Path::new("u3.po")),
            Err(DiskError::ToolFailed { verb: "info", .. })
        ));
    }

    #[test]
    fn test_write_failure_is_false() {
        let fake = FakeDiskTool::new();
        fake.fail_write("ROST");
        let tool = fake_tool(&fake);
        assert!(!tool.write(Path::new("u3.po"), "ROST", &[0], 0x06, 0).unwrap());
        // 失敗しても呼び出し自体は記録される
        assert_eq!(fake.writes().len(), 1);
    }
}
