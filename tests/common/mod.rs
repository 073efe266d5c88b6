#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use ncbi_assembly_fetch::domain::{AssemblyAccession, ContigAccession};
use ncbi_assembly_fetch::error::AssemblyError;
use ncbi_assembly_fetch::fasta::{LINE_WIDTH, write_wrapped_record};
use ncbi_assembly_fetch::ncbi::{AssemblyDirectory, NcbiClient};
use ncbi_assembly_fetch::store::Store;

pub const SAKAI: &str = "GCA_000008865.1";
pub const SAKAI_SPECIES: &str = "Escherichia coli O157:H7 str. Sakai";
pub const SAKAI_DIR_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCA/000/008/865/GCA_000008865.1_ASM886v2/";

pub const EXTRA_ROW: &str = "scaffold_3134\tunplaced-scaffold\tna\tna\tLODP01002389.1\t=\tNW_017892567.1\tPrimary Assembly\t3525\tna";

pub fn data_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn sakai_report() -> Vec<u8> {
    fs::read(data_path("GCA_000008865.1_assembly_report.txt")).unwrap()
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("genomes")).unwrap();
    (temp, Store::new_with_root(root))
}

/// Lengths the fixture reports list for their contigs; anything else gets
/// 150 bases.
pub fn sequence_length(accession: &str) -> usize {
    match accession {
        "BA000007.2" => 5_498_450,
        "AB011549.2" => 92_721,
        "AB011548.2" => 3_306,
        "LODP01002389.1" => 3_525,
        "NW_000001.1" => 10,
        _ => 150,
    }
}

pub fn sequence_for(accession: &str) -> Vec<u8> {
    let bases = b"ACGT";
    let seed = accession.bytes().map(usize::from).sum::<usize>();
    (0..sequence_length(accession))
        .map(|i| bases[(seed + i * 7) % 4])
        .collect()
}

pub fn fasta_record(accession: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_wrapped_record(
        &mut out,
        &format!("{accession} mock sequence"),
        &sequence_for(accession),
        LINE_WIDTH,
    )
    .unwrap();
    out
}

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

/// In-memory stand-in for the NCBI FTP site and E-utilities.
#[derive(Default)]
pub struct MockNcbi {
    pub directory: Option<AssemblyDirectory>,
    pub files: HashMap<String, Vec<u8>>,
    pub contigs: HashSet<String>,
    pub failing: Mutex<HashSet<String>>,
    pub offline: AtomicBool,
    pub listings: AtomicUsize,
    pub contig_calls: Mutex<Vec<String>>,
    pub bodies: HashMap<String, Vec<u8>>,
}

impl MockNcbi {
    /// One assembly folder holding `report` and, optionally, a bulk FASTA
    /// built from `bulk_records`.
    pub fn assembly(
        dir_url: &str,
        name: &str,
        report: Vec<u8>,
        bulk_records: Option<&[&str]>,
        contigs: &[&str],
    ) -> Self {
        let mut files = HashMap::new();
        let mut names = vec![format!("{name}_assembly_report.txt")];
        files.insert(format!("{dir_url}{name}_assembly_report.txt"), report);
        if let Some(records) = bulk_records {
            let mut bulk = Vec::new();
            for acc in records {
                bulk.extend(fasta_record(acc));
            }
            names.push(format!("{name}_genomic.fna.gz"));
            files.insert(format!("{dir_url}{name}_genomic.fna.gz"), gzip(&bulk));
        }
        names.push(format!("{name}_cds_from_genomic.fna.gz"));

        Self {
            directory: Some(AssemblyDirectory {
                url: dir_url.to_string(),
                name: name.to_string(),
                files: names,
            }),
            files,
            contigs: contigs.iter().map(|acc| acc.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Sakai assembly folder with its report and, optionally, the bulk FASTA.
    pub fn sakai(with_bulk: bool) -> Self {
        let contigs = ["BA000007.2", "AB011549.2", "AB011548.2"];
        Self::assembly(
            SAKAI_DIR_URL,
            "GCA_000008865.1_ASM886v2",
            sakai_report(),
            with_bulk.then_some(&contigs[..]),
            &["BA000007.2", "AB011549.2", "AB011548.2", "LODP01002389.1"],
        )
    }

    pub fn with_contigs(accessions: &[&str]) -> Self {
        Self {
            contigs: accessions.iter().map(|acc| acc.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn fail_contig(&self, accession: &str) {
        self.failing.lock().unwrap().insert(accession.to_string());
    }

    pub fn heal_contig(&self, accession: &str) {
        self.failing.lock().unwrap().remove(accession);
    }

    pub fn contig_calls(&self) -> Vec<String> {
        self.contig_calls.lock().unwrap().clone()
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

impl NcbiClient for MockNcbi {
    fn list_assembly_directory(
        &self,
        accession: &AssemblyAccession,
    ) -> Result<AssemblyDirectory, AssemblyError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AssemblyError::NcbiHttp("offline".to_string()));
        }
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.directory
            .clone()
            .ok_or_else(|| AssemblyError::MissingAsset(format!("assembly folder for {accession}")))
    }

    fn download_to(&self, url: &str, destination: &Path) -> Result<(), AssemblyError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AssemblyError::NcbiHttp("offline".to_string()));
        }
        let content = self
            .files
            .get(url)
            .ok_or_else(|| AssemblyError::MissingAsset(url.to_string()))?;
        let mut file = File::create(destination).unwrap();
        file.write_all(content).unwrap();
        Ok(())
    }

    fn download_contig_fasta(
        &self,
        accession: &ContigAccession,
        destination: &Path,
    ) -> Result<(), AssemblyError> {
        let acc = accession.as_str();
        self.contig_calls.lock().unwrap().push(acc.to_string());
        if self.failing.lock().unwrap().contains(acc) {
            return Err(AssemblyError::NcbiHttp(format!("{acc} unavailable")));
        }
        if let Some(body) = self.bodies.get(acc) {
            fs::write(destination, body).unwrap();
            return Ok(());
        }
        if !self.contigs.contains(acc) {
            return Err(AssemblyError::MissingAsset(acc.to_string()));
        }
        fs::write(destination, fasta_record(acc)).unwrap();
        Ok(())
    }
}
