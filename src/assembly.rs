use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader};

use camino::Utf8PathBuf;
use flate2::read::MultiGzDecoder;
use serde::Serialize;

use crate::domain::AssemblyAccession;
use crate::error::AssemblyError;
use crate::fasta;
use crate::ncbi::{AssemblyDirectory, NcbiClient};
use crate::report::{self, AssemblyReportRow, ReportRows};
use crate::sequence::{Materialized, NcbiSequence};
use crate::store::{Metadata, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    NoReport,
    ReportOnly,
    ReportAndPartialFasta,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeAction {
    Bulk,
    Constructed,
    UpToDate,
}

impl MaterializeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterializeAction::Bulk => "bulk",
            MaterializeAction::Constructed => "constructed",
            MaterializeAction::UpToDate => "up_to_date",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Never take the bulk FASTA and never fall back to RefSeq accessions.
    pub genbank_only: bool,
    /// Discard the existing assembly FASTA before materialising.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstructSummary {
    pub appended: Vec<String>,
    pub downloaded: usize,
    pub already_present: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializeOutcome {
    pub action: MaterializeAction,
    pub appended: Vec<String>,
    pub written_contigs: Vec<String>,
}

/// A genome assembly cached under `<root>/<species>/<accession>/`.
///
/// The remote folder listing is looked up at most once per instance; call
/// [`NcbiAssembly::invalidate_remote`] to force a fresh lookup.
#[derive(Debug, Clone)]
pub struct NcbiAssembly {
    accession: AssemblyAccession,
    species: String,
    store: Store,
    remote: Option<AssemblyDirectory>,
}

impl NcbiAssembly {
    pub fn new(accession: &str, species: &str, store: Store) -> Result<Self, AssemblyError> {
        Ok(Self {
            accession: accession.parse()?,
            species: species.to_string(),
            store,
            remote: None,
        })
    }

    pub fn accession(&self) -> &AssemblyAccession {
        &self.accession
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn assembly_directory(&self) -> Utf8PathBuf {
        self.store.assembly_dir(&self.species, &self.accession)
    }

    pub fn assembly_report_path(&self) -> Utf8PathBuf {
        self.store.assembly_report_path(&self.species, &self.accession)
    }

    pub fn assembly_fasta_path(&self) -> Utf8PathBuf {
        self.store.assembly_fasta_path(&self.species, &self.accession)
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.store
            .assembly_metadata_path(&self.species, &self.accession)
    }

    pub fn invalidate_remote(&mut self) {
        self.remote = None;
    }

    fn remote_directory<N: NcbiClient + ?Sized>(
        &mut self,
        client: &N,
    ) -> Result<&AssemblyDirectory, AssemblyError> {
        if self.remote.is_none() {
            let directory = client.list_assembly_directory(&self.accession)?;
            self.remote = Some(directory);
        }
        self.remote
            .as_ref()
            .ok_or_else(|| AssemblyError::MissingAsset(self.accession.to_string()))
    }

    /// Returns `true` when the report had to be fetched.
    pub fn download_assembly_report<N: NcbiClient + ?Sized>(
        &mut self,
        client: &N,
    ) -> Result<bool, AssemblyError> {
        let path = self.assembly_report_path();
        if path.as_std_path().exists() {
            return Ok(false);
        }
        let url = self.remote_directory(client)?.assembly_report_url()?;
        let temp = Store::temp_file_for(&path, ".report")?;
        client.download_to(&url, temp.path())?;
        Store::persist(temp, &path)?;
        tracing::info!(accession = %self.accession, url = %url, "downloaded assembly report");
        Ok(true)
    }

    /// Downloads the pre-built genomic FASTA and decompresses it in place of
    /// the assembly FASTA.
    pub fn download_assembly_fasta<N: NcbiClient + ?Sized>(
        &mut self,
        client: &N,
    ) -> Result<(), AssemblyError> {
        let path = self.assembly_fasta_path();
        let url = self.remote_directory(client)?.assembly_fasta_url()?;
        let compressed = Store::temp_file_for(&path, ".fna.gz")?;
        client.download_to(&url, compressed.path())?;

        let mut plain = Store::temp_file_for(&path, ".fa")?;
        let input =
            File::open(compressed.path()).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        io::copy(&mut decoder, plain.as_file_mut())
            .map_err(|err| AssemblyError::Filesystem(format!("decompress {url}: {err}")))?;
        Store::persist(plain, &path)?;
        tracing::info!(accession = %self.accession, url = %url, "downloaded assembly FASTA");
        Ok(())
    }

    pub fn get_assembly_report_rows(
        &self,
    ) -> Result<ReportRows<BufReader<File>>, AssemblyError> {
        report::parse_report_file(self.assembly_report_path().as_std_path())
    }

    pub fn get_written_contigs(&self) -> Result<Vec<String>, AssemblyError> {
        fasta::get_written_contigs(self.assembly_fasta_path().as_std_path())
    }

    pub fn state(&self) -> Result<AssemblyState, AssemblyError> {
        if !self.assembly_report_path().as_std_path().exists() {
            return Ok(AssemblyState::NoReport);
        }
        if !self.assembly_fasta_path().as_std_path().exists() {
            return Ok(AssemblyState::ReportOnly);
        }
        let written = self.get_written_contigs()?.into_iter().collect::<HashSet<_>>();
        for row in self.get_assembly_report_rows()? {
            let row = row?;
            let accessions = row.accessions();
            if !accessions.is_empty() && !is_written(&accessions, &written) {
                return Ok(AssemblyState::ReportAndPartialFasta);
            }
        }
        Ok(AssemblyState::Complete)
    }

    /// Appends every report contig missing from the assembly FASTA, in
    /// report order. Contigs already present are never written twice.
    pub fn construct_fasta_from_report<N: NcbiClient + ?Sized>(
        &self,
        client: &N,
        genbank_only: bool,
    ) -> Result<ConstructSummary, AssemblyError> {
        // The whole report is read up front so a malformed file fails before
        // anything is fetched.
        let rows = self
            .get_assembly_report_rows()?
            .collect::<Result<Vec<AssemblyReportRow>, _>>()?;

        let expected_lengths = rows
            .iter()
            .filter_map(|row| row.sequence_length_bp().map(|len| (row, len)))
            .flat_map(|(row, len)| row.accessions().into_iter().map(move |acc| (acc, len)))
            .collect::<HashMap<_, _>>();

        let fasta_path = self.assembly_fasta_path();
        Store::ensure_dir(&self.assembly_directory())?;
        fasta::repair_truncated_tail(fasta_path.as_std_path(), |acc| {
            expected_lengths.get(acc).copied()
        })?;
        let mut written = fasta::get_written_contigs(fasta_path.as_std_path())?
            .into_iter()
            .collect::<HashSet<_>>();

        let mut summary = ConstructSummary::default();
        for row in &rows {
            // A bulk GCF FASTA names contigs by RefSeq accession.
            if is_written(&row.accessions(), &written) {
                summary.already_present += 1;
                continue;
            }
            let Some(accession) = row.parse_contig_accession(genbank_only) else {
                tracing::warn!(
                    sequence = %row.sequence_name,
                    "no usable accession in assembly report row, skipping"
                );
                summary.skipped.push(row.sequence_name.clone());
                continue;
            };
            let accession = accession?;

            let sequence = NcbiSequence::from_accession(accession, &self.species, &self.store);
            if sequence.download_contig_sequence_from_ncbi(client)? == Materialized::Downloaded {
                summary.downloaded += 1;
            }
            fasta::append_fasta(
                sequence.sequence_fasta_path().as_std_path(),
                fasta_path.as_std_path(),
            )?;
            let name = sequence.accession().as_str().to_string();
            tracing::info!(accession = %name, assembly = %self.accession, "appended contig");
            written.insert(name.clone());
            summary.appended.push(name);
        }
        Ok(summary)
    }

    /// Bulk download when nothing is cached yet, then fill in whatever the
    /// report lists that the FASTA still lacks.
    pub fn download_or_construct<N: NcbiClient + ?Sized>(
        &mut self,
        client: &N,
        options: DownloadOptions,
    ) -> Result<MaterializeOutcome, AssemblyError> {
        let fasta_path = self.assembly_fasta_path();
        let report_path = self.assembly_report_path();
        Store::ensure_dir(&self.assembly_directory())?;

        if options.overwrite && fasta_path.as_std_path().exists() {
            fs::remove_file(fasta_path.as_std_path())
                .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        }

        let mut action = MaterializeAction::Constructed;
        if !report_path.as_std_path().exists()
            && !fasta_path.as_std_path().exists()
            && !options.genbank_only
        {
            self.download_assembly_report(client)?;
            match self.download_assembly_fasta(client) {
                Ok(()) => action = MaterializeAction::Bulk,
                Err(AssemblyError::MissingAsset(what)) => {
                    tracing::info!(
                        accession = %self.accession,
                        missing = %what,
                        "no bulk FASTA upstream, constructing from report"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        self.download_assembly_report(client)?;
        let summary = self.construct_fasta_from_report(client, options.genbank_only)?;
        if action == MaterializeAction::Constructed && summary.appended.is_empty() {
            action = MaterializeAction::UpToDate;
        }

        let written_contigs = self.get_written_contigs()?;
        self.write_metadata(action, written_contigs.len())?;
        Ok(MaterializeOutcome {
            action,
            appended: summary.appended,
            written_contigs,
        })
    }

    fn write_metadata(
        &self,
        action: MaterializeAction,
        contigs: usize,
    ) -> Result<(), AssemblyError> {
        let metadata = Metadata {
            source: "ncbi".to_string(),
            dataset_type: "assembly".to_string(),
            id: self.accession.to_string(),
            species: self.species.clone(),
            action: action.as_str().to_string(),
            contigs,
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            resolved_path: self.assembly_fasta_path().to_string(),
        };
        Store::write_metadata(&self.metadata_path(), &metadata)
    }
}

fn is_written(accessions: &[&str], written: &HashSet<String>) -> bool {
    accessions.iter().any(|acc| written.contains(*acc))
}
