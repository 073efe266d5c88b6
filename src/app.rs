use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::assembly::{AssemblyState, DownloadOptions, NcbiAssembly};
use crate::config::{AssemblyRequest, ResolvedConfig, SequenceRequest};
use crate::error::AssemblyError;
use crate::fasta;
use crate::ncbi::NcbiClient;
use crate::report::AssemblyReportRow;
use crate::sequence::{Materialized, NcbiSequence};
use crate::store::{Metadata, Store};

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub dataset_type: String,
    pub id: String,
    pub species: String,
    pub action: String,
    pub path: String,
    pub appended: Vec<String>,
    pub contigs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub accession: String,
    pub state: AssemblyState,
    pub rows: Vec<AssemblyReportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContigsResult {
    pub path: String,
    pub contigs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<N: NcbiClient> {
    store: Store,
    ncbi: N,
}

impl<N: NcbiClient> App<N> {
    pub fn new(store: Store, ncbi: N) -> Self {
        Self { store, ncbi }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn fetch(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, AssemblyError> {
        let mut items = Vec::new();
        for request in &config.assemblies {
            let options = DownloadOptions {
                genbank_only: request.genbank_only,
                overwrite: false,
            };
            items.push(self.fetch_assembly(request, options, sink)?);
        }
        for request in &config.sequences {
            items.push(self.fetch_sequence(request, sink)?);
        }
        Ok(FetchResult { items })
    }

    pub fn fetch_assembly(
        &self,
        request: &AssemblyRequest,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, AssemblyError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; assembly {}", request.accession),
            elapsed: None,
        });
        let mut assembly = NcbiAssembly::new(
            request.accession.as_str(),
            &request.species,
            self.store.clone(),
        )?;
        let start = Instant::now();
        let outcome = assembly.download_or_construct(&self.ncbi, options)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Store; {} contigs written ({} new)",
                outcome.written_contigs.len(),
                outcome.appended.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        Ok(FetchItemResult {
            dataset_type: "assembly".to_string(),
            id: request.accession.to_string(),
            species: request.species.clone(),
            action: outcome.action.as_str().to_string(),
            path: assembly.assembly_fasta_path().to_string(),
            appended: outcome.appended,
            contigs: outcome.written_contigs,
        })
    }

    pub fn fetch_sequence(
        &self,
        request: &SequenceRequest,
        sink: &dyn ProgressSink,
    ) -> Result<FetchItemResult, AssemblyError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; sequence {}", request.accession),
            elapsed: None,
        });
        let sequence =
            NcbiSequence::from_accession(request.accession.clone(), &request.species, &self.store);
        let start = Instant::now();
        let materialized = sequence.download_contig_sequence_from_ncbi(&self.ncbi)?;
        sink.event(ProgressEvent {
            message: "phase=Store; sequence cached".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let action = match materialized {
            Materialized::Existing => "cache",
            Materialized::Downloaded => "download",
        };
        Ok(FetchItemResult {
            dataset_type: "sequence".to_string(),
            id: request.accession.to_string(),
            species: request.species.clone(),
            action: action.to_string(),
            path: sequence.sequence_fasta_path().to_string(),
            appended: Vec::new(),
            contigs: vec![request.accession.to_string()],
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, AssemblyError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning genome root".to_string(),
            elapsed: None,
        });
        Ok(ListResult {
            datasets: self.store.list_metadata()?,
        })
    }

    /// Fetches the report if needed and returns its rows without touching the
    /// assembly FASTA.
    pub fn report(&self, request: &AssemblyRequest) -> Result<ReportResult, AssemblyError> {
        let mut assembly = NcbiAssembly::new(
            request.accession.as_str(),
            &request.species,
            self.store.clone(),
        )?;
        assembly.download_assembly_report(&self.ncbi)?;
        let rows = assembly
            .get_assembly_report_rows()?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReportResult {
            accession: request.accession.to_string(),
            state: assembly.state()?,
            rows,
        })
    }

    pub fn contigs(path: &Utf8Path) -> Result<ContigsResult, AssemblyError> {
        Ok(ContigsResult {
            path: path.to_string(),
            contigs: fasta::get_written_contigs(path.as_std_path())?,
        })
    }
}
