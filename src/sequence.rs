use camino::Utf8PathBuf;
use serde::Serialize;

use crate::domain::ContigAccession;
use crate::error::AssemblyError;
use crate::fasta;
use crate::ncbi::NcbiClient;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Materialized {
    Existing,
    Downloaded,
}

/// A single contig cached as its own FASTA file.
#[derive(Debug, Clone)]
pub struct NcbiSequence {
    accession: ContigAccession,
    species: String,
    fasta_path: Utf8PathBuf,
}

impl NcbiSequence {
    /// Validates the accession before anything touches the filesystem.
    pub fn new(
        accession: &str,
        species: &str,
        store: &Store,
        genbank_only: bool,
    ) -> Result<Self, AssemblyError> {
        let accession = ContigAccession::parse(accession, genbank_only)?;
        Ok(Self::from_accession(accession, species, store))
    }

    pub fn from_accession(accession: ContigAccession, species: &str, store: &Store) -> Self {
        let fasta_path = store.sequence_fasta_path(species, &accession);
        Self {
            accession,
            species: species.to_string(),
            fasta_path,
        }
    }

    pub fn accession(&self) -> &ContigAccession {
        &self.accession
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn sequence_fasta_path(&self) -> &Utf8PathBuf {
        &self.fasta_path
    }

    pub fn is_materialized(&self) -> Result<bool, AssemblyError> {
        fasta::is_complete_fasta(self.fasta_path.as_std_path(), self.accession.as_str())
    }

    /// Fetches the contig unless a complete copy is already cached. The file
    /// only appears once the whole record has been received.
    pub fn download_contig_sequence_from_ncbi<N: NcbiClient + ?Sized>(
        &self,
        client: &N,
    ) -> Result<Materialized, AssemblyError> {
        if self.is_materialized()? {
            tracing::debug!(accession = %self.accession, "contig already cached");
            return Ok(Materialized::Existing);
        }
        if self.fasta_path.as_std_path().exists() {
            tracing::warn!(
                accession = %self.accession,
                path = %self.fasta_path,
                "replacing incomplete contig file"
            );
        }

        let temp = Store::temp_file_for(&self.fasta_path, ".contig")?;
        client.download_contig_fasta(&self.accession, temp.path())?;
        if !fasta::is_complete_fasta(temp.path(), self.accession.as_str())? {
            return Err(AssemblyError::NcbiHttp(format!(
                "incomplete FASTA received for {}",
                self.accession
            )));
        }
        Store::persist(temp, &self.fasta_path)?;
        tracing::info!(accession = %self.accession, path = %self.fasta_path, "downloaded contig");
        Ok(Materialized::Downloaded)
    }
}
