//! Fixed categorical code tables. Source spellings (Turkish and English, any case) map to
//! one canonical code; anything else is unmapped.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug)]
pub struct CodeTable {
    pub name: &'static str,
    entries: HashMap<&'static str, &'static str>,
}

impl CodeTable {
    fn new(name: &'static str, groups: &[(&'static str, &[&'static str])]) -> Self {
        let mut entries = HashMap::new();
        for (code, spellings) in groups {
            entries.insert(*code, *code);
            for spelling in *spellings {
                entries.insert(*spelling, *code);
            }
        }
        Self { name, entries }
    }

    /// Canonical code for a raw value, matched case-insensitively.
    pub fn map(&self, raw: &str) -> Option<&'static str> {
        let key = raw.trim().to_lowercase();
        self.entries
            .get(key.as_str())
            .or_else(|| self.entries.get(raw.trim().to_uppercase().as_str()))
            .copied()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        let mut codes: Vec<_> = self.entries.values().copied().collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

static TABLES: Lazy<HashMap<&'static str, CodeTable>> = Lazy::new(|| {
    let tables = [
        CodeTable::new(
            "loan_status",
            &[
                ("PAID", &["k", "kapalı", "kapali", "paid", "closed"]),
                ("ACTIVE", &["a", "aktif", "active"]),
                (
                    "OVERDUE",
                    &["g", "gecikmiş", "gecikmis", "overdue", "delinquent"],
                ),
            ],
        ),
        CodeTable::new(
            "customer_type",
            &[
                ("INDIVIDUAL", &["b", "bireysel", "individual", "retail"]),
                ("CORPORATE", &["t", "tüzel", "tuzel", "corporate", "commercial"]),
            ],
        ),
        CodeTable::new(
            "yes_no",
            &[
                ("YES", &["e", "evet", "y", "yes", "true", "1"]),
                ("NO", &["h", "hayır", "hayir", "n", "no", "false", "0"]),
            ],
        ),
    ];
    tables.into_iter().map(|t| (t.name, t)).collect()
});

pub fn lookup_table(name: &str) -> Option<&'static CodeTable> {
    TABLES.get(name)
}

pub fn table_names() -> Vec<&'static str> {
    let mut names: Vec<_> = TABLES.keys().copied().collect();
    names.sort_unstable();
    names
}
