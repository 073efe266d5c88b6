use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;

static GENBANK_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+[0-9]+\.[0-9]+$").unwrap());
static REFSEQ_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}_[A-Z]*[0-9]+\.[0-9]+$").unwrap());
static ASSEMBLY_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GC[AF]_[0-9]{9}\.[0-9]+$").unwrap());

/// Fails unless `accession` is a versioned GenBank nucleotide accession.
/// RefSeq identifiers such as `NC_002695.1` are rejected.
pub fn check_genbank_accession_format(accession: &str) -> Result<(), AssemblyError> {
    if GENBANK_ACCESSION.is_match(accession) {
        Ok(())
    } else {
        Err(AssemblyError::InvalidAccession(accession.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenbankAccession(String);

impl GenbankAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenbankAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenbankAccession {
    type Err = AssemblyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        check_genbank_accession_format(normalized)
            .map_err(|_| AssemblyError::InvalidAccession(value.to_string()))?;
        Ok(Self(normalized.to_string()))
    }
}

/// Accession of a single contig as requested from the sequence source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContigAccession {
    Genbank(GenbankAccession),
    Refseq(String),
}

impl ContigAccession {
    pub fn as_str(&self) -> &str {
        match self {
            ContigAccession::Genbank(acc) => acc.as_str(),
            ContigAccession::Refseq(acc) => acc,
        }
    }

    /// Accepts either accession family unless `genbank_only` is set.
    pub fn parse(value: &str, genbank_only: bool) -> Result<Self, AssemblyError> {
        let trimmed = value.trim();
        if let Ok(acc) = trimmed.parse::<GenbankAccession>() {
            return Ok(ContigAccession::Genbank(acc));
        }
        if !genbank_only && REFSEQ_ACCESSION.is_match(trimmed) {
            return Ok(ContigAccession::Refseq(trimmed.to_string()));
        }
        Err(AssemblyError::InvalidAccession(value.to_string()))
    }
}

impl fmt::Display for ContigAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyAccession(String);

impl AssemblyAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `GCA_000008865.1` -> `["GCA", "000", "008", "865"]`, the NCBI FTP
    /// directory hierarchy under `genomes/all/`.
    pub fn ftp_path_segments(&self) -> Vec<&str> {
        let acc = self.0.as_str();
        vec![&acc[0..3], &acc[4..7], &acc[7..10], &acc[10..13]]
    }
}

impl fmt::Display for AssemblyAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssemblyAccession {
    type Err = AssemblyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !ASSEMBLY_ACCESSION.is_match(normalized) {
            return Err(AssemblyError::InvalidAssemblyAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

pub fn normalize_scientific_name(name: &str) -> String {
    name.to_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
