use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::domain::{AssemblyAccession, ContigAccession, normalize_scientific_name};
use crate::error::AssemblyError;

/// On-disk layout of the genome cache:
///
/// ```text
/// <root>/<species>/<assembly>/<assembly>_assembly_report.txt
/// <root>/<species>/<assembly>/<assembly>.fa
/// <root>/<species>/<assembly>/metadata.json
/// <root>/<species>/<contig>.fa
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    genome_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, AssemblyError> {
        let genome_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join(env!("CARGO_PKG_NAME"))
                        .join("genomes"),
                )
                .ok()
            })
            .ok_or_else(|| {
                AssemblyError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { genome_root })
    }

    pub fn new_with_root(genome_root: Utf8PathBuf) -> Self {
        Self { genome_root }
    }

    pub fn genome_root(&self) -> &Utf8Path {
        &self.genome_root
    }

    pub fn species_dir(&self, species: &str) -> Utf8PathBuf {
        self.genome_root.join(normalize_scientific_name(species))
    }

    pub fn assembly_dir(&self, species: &str, acc: &AssemblyAccession) -> Utf8PathBuf {
        self.species_dir(species).join(acc.as_str())
    }

    pub fn assembly_report_path(&self, species: &str, acc: &AssemblyAccession) -> Utf8PathBuf {
        self.assembly_dir(species, acc)
            .join(format!("{acc}_assembly_report.txt"))
    }

    pub fn assembly_fasta_path(&self, species: &str, acc: &AssemblyAccession) -> Utf8PathBuf {
        self.assembly_dir(species, acc).join(format!("{acc}.fa"))
    }

    pub fn assembly_metadata_path(&self, species: &str, acc: &AssemblyAccession) -> Utf8PathBuf {
        self.assembly_dir(species, acc).join("metadata.json")
    }

    pub fn sequence_fasta_path(&self, species: &str, acc: &ContigAccession) -> Utf8PathBuf {
        self.species_dir(species).join(format!("{acc}.fa"))
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), AssemblyError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))
    }

    /// Temp file next to `dest`, so persisting it is a same-filesystem rename.
    pub fn temp_file_for(dest: &Utf8Path, prefix: &str) -> Result<NamedTempFile, AssemblyError> {
        let parent = dest
            .parent()
            .ok_or_else(|| AssemblyError::Filesystem("invalid destination path".to_string()))?;
        Self::ensure_dir(parent)?;
        Builder::new()
            .prefix(prefix)
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))
    }

    pub fn persist(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), AssemblyError> {
        temp.persist(dest.as_std_path())
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AssemblyError> {
        let temp = Self::temp_file_for(path, ".write")?;
        fs::write(temp.path(), content)
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        Self::persist(temp, path)
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), AssemblyError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn list_metadata(&self) -> Result<Vec<Metadata>, AssemblyError> {
        if !self.genome_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(self.genome_root.as_std_path())? {
            if path.is_file() && path.file_name().is_some_and(|name| name == "metadata.json") {
                let content = fs::read_to_string(&path)
                    .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
                let metadata: Metadata = serde_json::from_str(&content)
                    .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
                entries.push(metadata);
            }
        }
        entries.sort_by(|a, b| (&a.species, &a.id).cmp(&(&b.species, &b.id)));
        Ok(entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub dataset_type: String,
    pub id: String,
    pub species: String,
    pub action: String,
    pub contigs: usize,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, AssemblyError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/data/genomes"));
        let acc: AssemblyAccession = "GCA_000000000.0".parse().unwrap();
        let contig = ContigAccession::parse("LODP01002389.1", true).unwrap();

        assert_eq!(
            store.assembly_report_path("Thingy thung", &acc),
            "/data/genomes/thingy_thung/GCA_000000000.0/GCA_000000000.0_assembly_report.txt"
        );
        assert_eq!(
            store.assembly_fasta_path("Thingy thung", &acc),
            "/data/genomes/thingy_thung/GCA_000000000.0/GCA_000000000.0.fa"
        );
        assert_eq!(
            store.sequence_fasta_path("Thingy thung", &contig),
            "/data/genomes/thingy_thung/LODP01002389.1.fa"
        );
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/file.txt")).unwrap();
        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "second");
    }

    #[test]
    fn lists_metadata_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_root(root);
        let acc: AssemblyAccession = "GCA_000008865.1".parse().unwrap();
        let meta = Metadata {
            source: "ncbi".to_string(),
            dataset_type: "assembly".to_string(),
            id: acc.to_string(),
            species: "Escherichia coli".to_string(),
            action: "bulk".to_string(),
            contigs: 3,
            downloaded_at: "2024-01-01T00:00:00+00:00".to_string(),
            tool: "test".to_string(),
            resolved_path: "x".to_string(),
        };
        Store::write_metadata(&store.assembly_metadata_path("Escherichia coli", &acc), &meta)
            .unwrap();
        let listed = store.list_metadata().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].contigs, 3);
    }
}
