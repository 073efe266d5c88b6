use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{AssemblyAccession, ContigAccession};
use crate::error::AssemblyError;
use crate::ncbi::{NcbiSettings, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "assembly-fetch.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub genome_root: Option<String>,
    #[serde(default)]
    pub ncbi: NcbiSection,
    #[serde(default)]
    pub assemblies: Vec<AssemblyEntry>,
    #[serde(default)]
    pub sequences: Vec<SequenceEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NcbiSection {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Deadline for a single download; unset means none.
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// `"GCA_000008865.1 Escherichia coli O157:H7 str. Sakai"` or a full object.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AssemblyEntry {
    Shorthand(String),
    Detailed(AssemblyEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AssemblyEntryObject {
    pub accession: String,
    pub species: String,
    #[serde(default)]
    pub genbank_only: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SequenceEntry {
    Shorthand(String),
    Detailed(SequenceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SequenceEntryObject {
    pub accession: String,
    pub species: String,
    #[serde(default)]
    pub genbank_only: bool,
}

#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub accession: AssemblyAccession,
    pub species: String,
    pub genbank_only: bool,
}

#[derive(Debug, Clone)]
pub struct SequenceRequest {
    pub accession: ContigAccession,
    pub species: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub genome_root: Option<Utf8PathBuf>,
    pub ncbi: NcbiSettings,
    pub assemblies: Vec<AssemblyRequest>,
    pub sequences: Vec<SequenceRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AssemblyError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(AssemblyError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AssemblyError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AssemblyError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AssemblyError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let mut ncbi = NcbiSettings::default();
        if let Some(tool) = config.ncbi.tool {
            ncbi.tool = tool;
        }
        ncbi.email = config.ncbi.email;
        ncbi.api_key = config.ncbi.api_key.filter(|key| !key.trim().is_empty());
        if let Some(secs) = config.ncbi.timeout_secs {
            ncbi.timeout = Duration::from_secs(secs);
        }
        ncbi.download_timeout = config.ncbi.download_timeout_secs.map(Duration::from_secs);
        if let Some(retry) = config.ncbi.retry {
            ncbi.retry = retry;
        }

        let assemblies = config
            .assemblies
            .into_iter()
            .map(|entry| match entry {
                AssemblyEntry::Shorthand(value) => {
                    let (accession, species) = split_shorthand(&value)?;
                    Ok(AssemblyRequest {
                        accession: accession.parse()?,
                        species,
                        genbank_only: false,
                    })
                }
                AssemblyEntry::Detailed(obj) => Ok(AssemblyRequest {
                    accession: obj.accession.parse()?,
                    species: obj.species,
                    genbank_only: obj.genbank_only,
                }),
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;

        let sequences = config
            .sequences
            .into_iter()
            .map(|entry| match entry {
                SequenceEntry::Shorthand(value) => {
                    let (accession, species) = split_shorthand(&value)?;
                    Ok(SequenceRequest {
                        accession: ContigAccession::parse(accession, false)?,
                        species,
                    })
                }
                SequenceEntry::Detailed(obj) => Ok(SequenceRequest {
                    accession: ContigAccession::parse(&obj.accession, obj.genbank_only)?,
                    species: obj.species,
                }),
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            genome_root: config.genome_root.map(Utf8PathBuf::from),
            ncbi,
            assemblies,
            sequences,
        })
    }
}

fn split_shorthand(value: &str) -> Result<(&str, String), AssemblyError> {
    let (accession, species) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| AssemblyError::ConfigParse(format!("missing species in {value:?}")))?;
    let species = species.trim();
    if species.is_empty() {
        return Err(AssemblyError::ConfigParse(format!(
            "missing species in {value:?}"
        )));
    }
    Ok((accession, species.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config = Config {
            assemblies: vec![AssemblyEntry::Shorthand(
                "GCA_000008865.1 Escherichia coli O157:H7 str. Sakai".to_string(),
            )],
            sequences: vec![SequenceEntry::Shorthand(
                "AJ312413.2 Tribolium castaneum".to_string(),
            )],
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.assemblies[0].accession.as_str(), "GCA_000008865.1");
        assert_eq!(
            resolved.assemblies[0].species,
            "Escherichia coli O157:H7 str. Sakai"
        );
        assert_eq!(resolved.sequences[0].accession.as_str(), "AJ312413.2");
        assert_eq!(resolved.ncbi.retry, RetryPolicy::default());
    }

    #[test]
    fn shorthand_without_species_fails() {
        let config = Config {
            assemblies: vec![AssemblyEntry::Shorthand("GCA_000008865.1".to_string())],
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, AssemblyError::ConfigParse(_));
    }

    #[test]
    fn detailed_sequence_honours_genbank_only() {
        let config = Config {
            sequences: vec![SequenceEntry::Detailed(SequenceEntryObject {
                accession: "NM_017001.2".to_string(),
                species: "Rattus norvegicus".to_string(),
                genbank_only: true,
            })],
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, AssemblyError::InvalidAccession(_));
    }
}
