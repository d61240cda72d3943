//! ProDOS ファイル名サフィックス
//!
//! 展開ディレクトリやディスクへ書き戻すファイルは `NAME#TTAAAA` 形式で
//! ファイルタイプ（2桁16進）と補助タイプ（4桁16進）を保持する。

/// サフィックスが無い／壊れている場合のファイルタイプ（BIN）
pub const DEFAULT_FILE_TYPE: u8 = 0x06;
/// サフィックスが無い／壊れている場合の補助タイプ
pub const DEFAULT_AUX_TYPE: u16 = 0x0000;

/// サフィックス区切り文字
const SUFFIX_SEPARATOR: char = '#';

/// `name#TTAAAA` を生成
pub fn encode_suffix(name: &str, file_type: u8, aux_type: u16) -> String {
    format!("{}#{:02X}{:04X}", name, file_type, aux_type)
}

/// `name#TTAAAA` を (name, file_type, aux_type) に分解
///
/// 失敗しない。`#` が無ければ名前全体、16進が6桁に満たない・不正な場合は
/// `#` より前を名前として、タイプはデフォルトになる。
pub fn decode_suffix(on_disk_name: &str) -> (String, u8, u16) {
    let Some((name, rest)) = on_disk_name.split_once(SUFFIX_SEPARATOR) else {
        return (on_disk_name.to_string(), DEFAULT_FILE_TYPE, DEFAULT_AUX_TYPE);
    };

    match parse_type_digits(rest) {
        Some((file_type, aux_type)) => (name.to_string(), file_type, aux_type),
        None => (name.to_string(), DEFAULT_FILE_TYPE, DEFAULT_AUX_TYPE),
    }
}

fn parse_type_digits(digits: &str) -> Option<(u8, u16)> {
    let hex = digits.get(..6)?;
    // from_str_radix は先頭の '+' を受け付けるので事前に弾く
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let file_type = u8::from_str_radix(&hex[..2], 16).ok()?;
    let aux_type = u16::from_str_radix(&hex[2..], 16).ok()?;
    Some((file_type, aux_type))
}

/// 正規名（大文字）
///
/// ProDOS のファイル名は大文字小文字を区別しない。
pub fn canonical_name(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

/// ディスク上の1ファイル
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// 正規名（例: "ROST"）
    pub name: String,
    pub file_type: u8,
    pub aux_type: u16,
}

impl FileEntry {
    pub fn new(name: &str, file_type: u8, aux_type: u16) -> Self {
        FileEntry {
            name: canonical_name(name),
            file_type,
            aux_type,
        }
    }

    /// タイプ情報の無い新規ファイル
    pub fn untyped(name: &str) -> Self {
        Self::new(name, DEFAULT_FILE_TYPE, DEFAULT_AUX_TYPE)
    }

    /// 展開ディレクトリのファイル名から生成
    pub fn from_on_disk_name(on_disk_name: &str) -> Self {
        let (name, file_type, aux_type) = decode_suffix(on_disk_name);
        Self::new(&name, file_type, aux_type)
    }

    /// `NAME#TTAAAA`
    pub fn on_disk_name(&self) -> String {
        encode_suffix(&self.name, self.file_type, self.aux_type)
    }
}
