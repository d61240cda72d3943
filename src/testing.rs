//! テスト用のディスクツール代替
//!
//! メモリ上のファイル集合を「ディスクイメージ」として、diskiigs の
//! 各コマンドを模倣する。`add` の呼び出しはすべて記録する。

use crate::bridge::DiskTool;
use crate::locator::{Resolver, ToolLocatorConfig};
use crate::naming::{canonical_name, decode_suffix};
use crate::runner::{CommandOutput, CommandRunner};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const FAKE_TOOL_PATH: &str = "/fake/bin/diskiigs";

/// 記録された `add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub name: String,
    pub dir: String,
    pub file_type: u8,
    pub aux_type: u16,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    /// ディスク上のファイル（`NAME#TTAAAA` → 内容）
    files: BTreeMap<String, Vec<u8>>,
    failing_verbs: HashMap<String, String>,
    failing_writes: HashSet<String>,
    calls: Vec<Vec<String>>,
    writes: Vec<RecordedWrite>,
}

/// 状態を共有するハンドル（clone してツールに渡す）
#[derive(Clone, Default)]
pub struct FakeDiskTool {
    state: Rc<RefCell<FakeState>>,
}

impl FakeDiskTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, on_disk_name: &str, data: Vec<u8>) {
        self.state
            .borrow_mut()
            .files
            .insert(on_disk_name.to_string(), data);
    }

    /// 指定コマンドを終了コード1で失敗させる
    pub fn fail_verb(&self, verb: &str, message: &str) {
        self.state
            .borrow_mut()
            .failing_verbs
            .insert(verb.to_string(), message.to_string());
    }

    /// 指定ファイルの `add` だけ失敗させる
    pub fn fail_write(&self, name: &str) {
        self.state
            .borrow_mut()
            .failing_writes
            .insert(canonical_name(name));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.borrow().calls.clone()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.borrow().writes.clone()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        let wanted = canonical_name(name);
        let state = self.state.borrow();
        state
            .files
            .iter()
            .find(|(on_disk, _)| canonical_name(&decode_suffix(on_disk).0) == wanted)
            .map(|(_, data)| data.clone())
    }

    fn handle(&self, args: &[String]) -> io::Result<CommandOutput> {
        let verb = args.first().map(String::as_str).unwrap_or("");
        if let Some(message) = self.state.borrow().failing_verbs.get(verb) {
            return Ok(failure(message));
        }
        match verb {
            "info" => {
                let count = self.state.borrow().files.len();
                Ok(success(format!(
                    "Volume: FAKE\nFormat: ProDOS\nFiles: {}\n",
                    count
                )))
            }
            "list" => {
                let mut stdout = String::from("Name             Type  Size\n---------------- ---- -----\n");
                for (on_disk, data) in &self.state.borrow().files {
                    let (name, _, _) = decode_suffix(on_disk);
                    stdout.push_str(&format!("{:<16} BIN  {}\n", name, data.len()));
                }
                Ok(success(stdout))
            }
            "extract" => {
                let wanted = canonical_name(args[2].rsplit('/').next().unwrap_or(""));
                let out_dir = PathBuf::from(&args[4]);
                let state = self.state.borrow();
                let hit = state
                    .files
                    .iter()
                    .find(|(on_disk, _)| canonical_name(&decode_suffix(on_disk).0) == wanted);
                match hit {
                    Some((on_disk, data)) => {
                        fs::write(out_dir.join(on_disk), data)?;
                        Ok(success(String::new()))
                    }
                    None => Ok(failure("file not found")),
                }
            }
            "extract-all" => {
                let out_dir = PathBuf::from(&args[3]);
                for (on_disk, data) in &self.state.borrow().files {
                    fs::write(out_dir.join(on_disk), data)?;
                }
                Ok(success(String::new()))
            }
            "add" => {
                let local = Path::new(&args[2]);
                let dir = args[4].clone();
                let file_name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let (name, file_type, aux_type) = decode_suffix(&file_name);
                let data = fs::read(local)?;
                let mut state = self.state.borrow_mut();
                state.writes.push(RecordedWrite {
                    name: name.clone(),
                    dir,
                    file_type,
                    aux_type,
                    data: data.clone(),
                });
                if state.failing_writes.contains(&canonical_name(&name)) {
                    return Ok(failure("disk full"));
                }
                let canonical = canonical_name(&name);
                state
                    .files
                    .retain(|on_disk, _| canonical_name(&decode_suffix(on_disk).0) != canonical);
                state.files.insert(file_name, data);
                Ok(success(String::new()))
            }
            _ => Ok(failure("unknown command")),
        }
    }
}

impl CommandRunner for FakeDiskTool {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        assert_eq!(program, Path::new(FAKE_TOOL_PATH));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.state.borrow_mut().calls.push(args.clone());
        self.handle(&args)
    }
}

/// FakeDiskTool を使う DiskTool
pub fn fake_tool(fake: &FakeDiskTool) -> DiskTool {
    let locator = ToolLocatorConfig::new(vec![Resolver::new("fake", || {
        Some(PathBuf::from(FAKE_TOOL_PATH))
    })]);
    DiskTool::with_runner(locator, Box::new(fake.clone()))
}

/// ツールが見つからない DiskTool
pub fn missing_tool() -> DiskTool {
    let locator = ToolLocatorConfig::new(vec![
        Resolver::new("$DISKIIGS_PATH", || None),
        Resolver::new("PATH", || None),
    ]);
    DiskTool::with_runner(locator, Box::new(FakeDiskTool::new()))
}

fn success(stdout: String) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        stdout,
        stderr: String::new(),
    }
}

fn failure(message: &str) -> CommandOutput {
    CommandOutput {
        status: Some(1),
        stdout: String::new(),
        stderr: format!("{}\n", message),
    }
}
