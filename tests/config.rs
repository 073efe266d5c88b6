use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use ncbi_assembly_fetch::config::ConfigLoader;
use ncbi_assembly_fetch::domain::ContigAccession;
use ncbi_assembly_fetch::error::AssemblyError;
use ncbi_assembly_fetch::ncbi::RetryPolicy;

#[test]
fn load_config_file_with_mixed_entries() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("assembly-fetch.json");
    fs::write(
        &path,
        r#"{
  "schema_version": 1,
  "genome_root": "/data/genomes",
  "ncbi": {
    "email": "lab@example.org",
    "api_key": "  ",
    "timeout_secs": 30,
    "download_timeout_secs": 3600,
    "retry": { "max_retries": 5, "base_delay_ms": 50 }
  },
  "assemblies": [
    "GCA_000008865.1 Escherichia coli O157:H7 str. Sakai",
    { "accession": "GCA_000001405.15", "species": "Homo sapiens", "genbank_only": true }
  ],
  "sequences": [
    "NM_017001.2 Rattus norvegicus",
    { "accession": "AJ312413.2", "species": "Tribolium castaneum", "genbank_only": true }
  ]
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.genome_root.as_deref().map(|p| p.as_str()), Some("/data/genomes"));
    assert_eq!(resolved.ncbi.email.as_deref(), Some("lab@example.org"));
    assert_eq!(resolved.ncbi.api_key, None);
    assert_eq!(resolved.ncbi.timeout, Duration::from_secs(30));
    assert_eq!(resolved.ncbi.download_timeout, Some(Duration::from_secs(3600)));
    assert_eq!(
        resolved.ncbi.retry,
        RetryPolicy {
            max_retries: 5,
            base_delay_ms: 50
        }
    );

    assert_eq!(resolved.assemblies.len(), 2);
    assert!(!resolved.assemblies[0].genbank_only);
    assert_eq!(resolved.assemblies[1].species, "Homo sapiens");
    assert!(resolved.assemblies[1].genbank_only);

    assert_matches!(resolved.sequences[0].accession, ContigAccession::Refseq(_));
    assert_matches!(resolved.sequences[1].accession, ContigAccession::Genbank(_));
}

#[test]
fn downloads_have_no_deadline_unless_configured() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{ "ncbi": { "timeout_secs": 10 } }"#).unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.ncbi.timeout, Duration::from_secs(10));
    assert_eq!(resolved.ncbi.download_timeout, None);
}

#[test]
fn genbank_only_sequence_entry_rejects_refseq() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(
        &path,
        r#"{ "sequences": [ { "accession": "NM_017001.2", "species": "Rattus norvegicus", "genbank_only": true } ] }"#,
    )
    .unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AssemblyError::InvalidAccession(_));
}

#[test]
fn shorthand_without_species_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{ "assemblies": [ "GCA_000008865.1" ] }"#).unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AssemblyError::ConfigParse(_));
}

#[test]
fn explicit_missing_path_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AssemblyError::ConfigRead(p) if p == path);
}

#[test]
fn invalid_json_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AssemblyError::ConfigParse(_));
}
