use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, ErrorKind, Read};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::common::constants::normalize_code;
use crate::common::error::SourceError;
use crate::domain::DatasetKind;
use crate::tenant::TenantNamespace;

/// Where the CSV extract for one tenant and dataset kind comes from.
#[derive(Debug, Clone)]
pub enum CsvSource {
    File(PathBuf),
    Memory { label: String, bytes: Arc<[u8]> },
    /// Nothing has been handed over for this tenant and kind
    Missing(String),
}

impl CsvSource {
    pub fn location(&self) -> String {
        match self {
            CsvSource::File(path) => path.display().to_string(),
            CsvSource::Memory { label, .. } => label.clone(),
            CsvSource::Missing(location) => location.clone(),
        }
    }

    /// Open a fresh byte stream positioned at the start of the source.
    pub fn open(&self) -> Result<Box<dyn Read + Send>, SourceError> {
        match self {
            CsvSource::File(path) => match File::open(path) {
                Ok(file) => Ok(Box::new(file)),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(SourceError::NotFound {
                    location: self.location(),
                }),
                Err(source) => Err(SourceError::Open {
                    location: self.location(),
                    source,
                }),
            },
            CsvSource::Memory { bytes, .. } => Ok(Box::new(Cursor::new(bytes.clone()))),
            CsvSource::Missing(location) => Err(SourceError::NotFound {
                location: location.clone(),
            }),
        }
    }
}

/// Hands the pipeline the CSV source for a tenant's dataset.
///
/// Implementations only ever see a resolved [`TenantNamespace`], so a lookup can never
/// reach another tenant's files.
pub trait SourceLocator: Send + Sync {
    fn locate(&self, namespace: &TenantNamespace, kind: &DatasetKind) -> CsvSource;
}

fn file_name(kind: &DatasetKind) -> String {
    format!(
        "{}_{}.csv",
        kind.loan_type.to_lowercase(),
        kind.dataset_type.to_lowercase()
    )
}

/// Files laid out as `{root}/{TENANT}/{loan_type}_{dataset_type}.csv`.
#[derive(Debug, Clone)]
pub struct FsSourceLocator {
    root: PathBuf,
}

impl FsSourceLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, namespace: &TenantNamespace, kind: &DatasetKind) -> PathBuf {
        self.root
            .join(namespace.tenant_code())
            .join(file_name(kind))
    }
}

impl SourceLocator for FsSourceLocator {
    fn locate(&self, namespace: &TenantNamespace, kind: &DatasetKind) -> CsvSource {
        let path = self.path_for(namespace, kind);
        debug!(tenant = namespace.tenant_code(), path = %path.display(), "Located source file");
        CsvSource::File(path)
    }
}

/// Sources held in memory, registered per tenant. Used by tests and embedding callers
/// that already hold the uploaded bytes.
#[derive(Debug, Default)]
pub struct InMemorySourceLocator {
    sources: RwLock<HashMap<(String, DatasetKind), Arc<[u8]>>>,
}

impl InMemorySourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the extract for a tenant's dataset kind.
    pub fn put(&self, tenant: &str, loan_type: &str, dataset_type: &str, bytes: impl Into<Vec<u8>>) {
        let key = (
            normalize_code(tenant),
            DatasetKind::new(loan_type, dataset_type),
        );
        let bytes: Vec<u8> = bytes.into();
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(key, Arc::from(bytes));
    }

    pub fn remove(&self, tenant: &str, loan_type: &str, dataset_type: &str) {
        let key = (
            normalize_code(tenant),
            DatasetKind::new(loan_type, dataset_type),
        );
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.remove(&key);
    }
}

impl SourceLocator for InMemorySourceLocator {
    fn locate(&self, namespace: &TenantNamespace, kind: &DatasetKind) -> CsvSource {
        let label = format!("memory://{}/{}", namespace.tenant_code(), file_name(kind));
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        match sources.get(&(namespace.tenant_code().to_string(), kind.clone())) {
            Some(bytes) => CsvSource::Memory {
                label,
                bytes: bytes.clone(),
            },
            None => CsvSource::Missing(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantResolver;

    #[test]
    fn test_fs_locator_layout() {
        let resolver = TenantResolver::new(["BANK001"]).unwrap();
        let ns = resolver.resolve("bank001").unwrap();
        let locator = FsSourceLocator::new("/data/sources");
        let path = locator.path_for(&ns, &DatasetKind::new("RETAIL", "PAYMENT_PLAN"));
        assert_eq!(path, PathBuf::from("/data/sources/BANK001/retail_payment_plan.csv"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSource::File(dir.path().join("absent.csv"));
        match source.open() {
            Err(e) => assert!(e.is_not_found()),
            Ok(_) => panic!("expected not found"),
        }
    }

    #[test]
    fn test_in_memory_locator_is_tenant_scoped() {
        let resolver = TenantResolver::new(["BANK001", "BANK002"]).unwrap();
        let locator = InMemorySourceLocator::new();
        locator.put("BANK001", "RETAIL", "CREDIT", "loan_id\n1\n");

        let kind = DatasetKind::new("RETAIL", "CREDIT");
        let own = locator.locate(&resolver.resolve("BANK001").unwrap(), &kind);
        let mut text = String::new();
        own.open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "loan_id\n1\n");

        let other = locator.locate(&resolver.resolve("BANK002").unwrap(), &kind);
        assert!(matches!(other, CsvSource::Missing(_)));
        assert!(other.open().err().map(|e| e.is_not_found()).unwrap_or(false));
    }
}
