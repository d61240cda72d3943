//! セッションカタログ
//!
//! 展開されたファイル名をカテゴリ（マップ、会話、ロスターなど）に分類し、
//! UI/CLI 向けの読み取り専用ディレクトリを提供する。
//! `Session` はトランザクション1つとカタログをまとめたもの。

use crate::bridge::DiskTool;
use crate::error::DiskResult;
use crate::naming::canonical_name;
use crate::transaction::{CommitOutcome, DiskTransaction};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// 町・城の名前（マップ／会話／モンスター表で共通）
const LOCATION_NAMES: &[(&str, &str)] = &[
    ("A", "Sosaria"),
    ("B", "Lord British's Castle"),
    ("C", "Castle of Death"),
    ("D", "Dawn"),
    ("E", "Moon"),
    ("F", "Yew"),
    ("G", "Montor East"),
    ("H", "Montor West"),
    ("I", "Grey"),
    ("J", "Devil Guard"),
    ("K", "Fawn"),
    ("L", "Death Gulch"),
];

const COMBAT_NAMES: &[(&str, &str)] = &[
    ("A", "Grassland"),
    ("B", "Brush"),
    ("C", "Castle"),
    ("F", "Forest"),
    ("G", "Ship to shore"),
    ("M", "Mountains"),
    ("Q", "Ship to ship"),
    ("R", "Shore to ship"),
    ("S", "Sea"),
];

const DIALOG_NAMES: &[(&str, &str)] = &[
    ("A", "Sosaria"),
    ("B", "Lord British's Castle"),
    ("C", "Castle of Death"),
    ("D", "Dawn"),
    ("E", "Moon"),
    ("F", "Yew"),
    ("G", "Montor East"),
    ("H", "Montor West"),
    ("I", "Grey"),
    ("J", "Devil Guard"),
    ("K", "Fawn"),
    ("L", "Death Gulch"),
    ("M", "Dungeon M"),
    ("N", "Dungeon N"),
    ("O", "Dungeon O"),
    ("P", "Dungeon P"),
    ("Q", "Dungeon Q"),
    ("R", "Dungeon R"),
    ("S", "Dungeon S"),
];

const SPECIAL_NAMES: &[(&str, &str)] = &[
    ("BRND", "Brand"),
    ("FNTN", "Fountain"),
    ("SHRN", "Shrine"),
    ("TIME", "Time Lord"),
];

/// カテゴリの定義
#[derive(Debug, Clone, Copy)]
pub struct CategorySpec {
    /// "maps" など
    pub key: &'static str,
    pub title: &'static str,
    /// ファイル名の接頭辞
    pub prefix: &'static str,
    /// 有効なコード（接頭辞に続く部分）と表示名
    pub codes: &'static [(&'static str, &'static str)],
}

impl CategorySpec {
    fn label_for(&self, code: &str) -> String {
        match self.codes.iter().find(|(c, _)| *c == code) {
            Some((_, label)) if code.is_empty() => label.to_string(),
            Some((_, label)) => format!("{} ({})", label, code),
            None => code.to_string(),
        }
    }
}

/// カテゴリ表（表示順）
pub const CATEGORIES: &[CategorySpec] = &[
    CategorySpec {
        key: "roster",
        title: "Roster",
        prefix: "ROST",
        codes: &[("", "Character roster")],
    },
    CategorySpec {
        key: "party",
        title: "Party",
        prefix: "PRTY",
        codes: &[("", "Active party")],
    },
    CategorySpec {
        key: "overworld",
        title: "Overworld",
        prefix: "SOS",
        codes: &[("A", "Overworld map"), ("M", "Overworld monsters")],
    },
    CategorySpec {
        key: "maps",
        title: "Maps",
        prefix: "MAP",
        codes: LOCATION_NAMES,
    },
    CategorySpec {
        key: "combat",
        title: "Combat maps",
        prefix: "CON",
        codes: COMBAT_NAMES,
    },
    CategorySpec {
        key: "special",
        title: "Special locations",
        prefix: "",
        codes: SPECIAL_NAMES,
    },
    CategorySpec {
        key: "dialog",
        title: "Dialog",
        prefix: "TLK",
        codes: DIALOG_NAMES,
    },
    CategorySpec {
        key: "bestiary",
        title: "Bestiary",
        prefix: "MON",
        codes: LOCATION_NAMES,
    },
    CategorySpec {
        key: "text",
        title: "Game text",
        prefix: "TEXT",
        codes: &[("", "Message text")],
    },
];

/// カテゴリ定義を検索
pub fn category_spec(key: &str) -> Option<&'static CategorySpec> {
    CATEGORIES.iter().find(|c| c.key.eq_ignore_ascii_case(key))
}

/// カタログの1項目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// 正規名
    pub name: String,
    /// 表示名
    pub label: String,
}

/// 分類結果（空のカテゴリは持たない）
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: Vec<(&'static CategorySpec, Vec<CatalogEntry>)>,
}

impl Catalog {
    /// ファイル名の集合から分類する
    pub fn scan<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<String> = names.into_iter().map(canonical_name).collect();

        let mut categories = Vec::new();
        for spec in CATEGORIES {
            let files: Vec<CatalogEntry> = spec
                .codes
                .iter()
                .filter_map(|(code, _)| {
                    let name = format!("{}{}", spec.prefix, code);
                    present.contains(&name).then(|| CatalogEntry {
                        label: spec.label_for(code),
                        name,
                    })
                })
                .collect();
            if !files.is_empty() {
                categories.push((spec, files));
            }
        }
        Catalog { categories }
    }

    pub fn has_category(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// カテゴリのファイル一覧（無いカテゴリは空）
    pub fn files_in(&self, key: &str) -> &[CatalogEntry] {
        self.find(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 存在するカテゴリ（表示順）
    pub fn categories(&self) -> impl Iterator<Item = &'static CategorySpec> + '_ {
        self.categories.iter().map(|(spec, _)| *spec)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn find(&self, key: &str) -> Option<&Vec<CatalogEntry>> {
        self.categories
            .iter()
            .find(|(spec, _)| spec.key.eq_ignore_ascii_case(key))
            .map(|(_, files)| files)
    }
}

/// エディタに渡す保存関数
pub type SaveCallback<'s> = Box<dyn Fn(&[u8]) + 's>;

/// トランザクション + カタログ
///
/// 読み書きは `&self` で行えるので、複数の保存コールバックを同時に配れる。
pub struct Session<'t> {
    txn: RefCell<DiskTransaction<'t>>,
    catalog: Catalog,
}

impl<'t> Session<'t> {
    pub fn open(tool: &'t DiskTool, image: impl Into<PathBuf>) -> DiskResult<Self> {
        Self::open_in(tool, image, None)
    }

    pub fn open_in(
        tool: &'t DiskTool,
        image: impl Into<PathBuf>,
        scratch_root: Option<&Path>,
    ) -> DiskResult<Self> {
        let txn = DiskTransaction::open_in(tool, image, scratch_root)?;
        let catalog = Catalog::scan(txn.names());
        log::debug!(
            "{}: {} categor(ies) found",
            txn.image().display(),
            catalog.categories().count()
        );
        Ok(Session {
            txn: RefCell::new(txn),
            catalog,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn has_category(&self, key: &str) -> bool {
        self.catalog.has_category(key)
    }

    pub fn files_in(&self, key: &str) -> &[CatalogEntry] {
        self.catalog.files_in(key)
    }

    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.txn.borrow_mut().read(name)
    }

    pub fn write(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.txn.borrow_mut().write(name, data);
    }

    /// 書き込みをステージング（トランザクション使用中なら false）
    ///
    /// `with_transaction` の中から呼ばれた場合は書き込まずに警告する。
    pub fn try_write(&self, name: &str, data: impl Into<Vec<u8>>) -> bool {
        match self.txn.try_borrow_mut() {
            Ok(mut txn) => {
                txn.write(name, data);
                true
            }
            Err(_) => {
                log::warn!("Save of {} ignored: transaction is busy", canonical_name(name));
                false
            }
        }
    }

    /// トランザクションへの直接アクセス
    ///
    /// `f` の中で `read`/`write` を呼ぶとパニックする。保存コールバックは
    /// パニックせず、書き込みを捨てて警告する。
    pub fn with_transaction<R>(&self, f: impl FnOnce(&mut DiskTransaction<'t>) -> R) -> R {
        f(&mut self.txn.borrow_mut())
    }

    /// `name` に書き込む保存コールバック
    pub fn make_save_callback(&self, name: &str) -> SaveCallback<'_> {
        let name = name.to_string();
        Box::new(move |data: &[u8]| {
            self.try_write(&name, data.to_vec());
        })
    }

    /// 書き戻して終了
    pub fn close(self) -> CommitOutcome {
        self.txn.into_inner().close()
    }
}
