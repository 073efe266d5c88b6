//! NCBI assembly report parsing.
//!
//! A report is a block of `#` comment lines, the last of which names the
//! tab-separated columns, followed by one data line per sequence in the
//! assembly.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::Serialize;

use crate::domain::ContigAccession;
use crate::error::AssemblyError;

const NOT_AVAILABLE: &str = "na";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportColumn {
    SequenceName,
    SequenceRole,
    AssignedMolecule,
    AssignedMoleculeLocationType,
    GenbankAccn,
    Relationship,
    RefseqAccn,
    AssemblyUnit,
    SequenceLength,
    UcscStyleName,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 10] = [
        ReportColumn::SequenceName,
        ReportColumn::SequenceRole,
        ReportColumn::AssignedMolecule,
        ReportColumn::AssignedMoleculeLocationType,
        ReportColumn::GenbankAccn,
        ReportColumn::Relationship,
        ReportColumn::RefseqAccn,
        ReportColumn::AssemblyUnit,
        ReportColumn::SequenceLength,
        ReportColumn::UcscStyleName,
    ];

    pub fn header(self) -> &'static str {
        match self {
            ReportColumn::SequenceName => "Sequence-Name",
            ReportColumn::SequenceRole => "Sequence-Role",
            ReportColumn::AssignedMolecule => "Assigned-Molecule",
            ReportColumn::AssignedMoleculeLocationType => "Assigned-Molecule-Location/Type",
            ReportColumn::GenbankAccn => "GenBank-Accn",
            ReportColumn::Relationship => "Relationship",
            ReportColumn::RefseqAccn => "RefSeq-Accn",
            ReportColumn::AssemblyUnit => "Assembly-Unit",
            ReportColumn::SequenceLength => "Sequence-Length",
            ReportColumn::UcscStyleName => "UCSC-style-name",
        }
    }

    fn from_header(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.header() == name)
    }

    fn is_required(self) -> bool {
        !matches!(
            self,
            ReportColumn::AssignedMoleculeLocationType
                | ReportColumn::Relationship
                | ReportColumn::UcscStyleName
        )
    }
}

/// Column layout of a report, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportColumns {
    raw_header: String,
    names: Vec<String>,
    known: Vec<Option<ReportColumn>>,
}

impl ReportColumns {
    pub fn parse(header_line: &str, source: &str) -> Result<Self, AssemblyError> {
        let raw_header = header_line.trim_end_matches(['\r', '\n']).to_string();
        let body = raw_header.trim_start_matches('#').trim_start();
        let names = body
            .split('\t')
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        let known = names
            .iter()
            .map(|name| ReportColumn::from_header(name))
            .collect::<Vec<_>>();

        let missing = ReportColumn::ALL
            .into_iter()
            .filter(|column| column.is_required() && !known.contains(&Some(*column)))
            .map(ReportColumn::header)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(AssemblyError::format(
                source,
                format!("header is missing columns: {}", missing.join(", ")),
            ));
        }

        Ok(Self {
            raw_header,
            names,
            known,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn header_line(&self) -> &str {
        &self.raw_header
    }
}

/// One sequence of an assembly. Every value is kept exactly as written in
/// the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyReportRow {
    pub sequence_name: String,
    pub sequence_role: String,
    pub assigned_molecule: String,
    pub assigned_molecule_location_type: String,
    pub genbank_accn: String,
    pub relationship: String,
    pub refseq_accn: String,
    pub assembly_unit: String,
    pub sequence_length: String,
    pub ucsc_style_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl AssemblyReportRow {
    fn from_fields(
        columns: &ReportColumns,
        fields: Vec<&str>,
        source: &str,
        line_number: usize,
    ) -> Result<Self, AssemblyError> {
        if fields.len() != columns.len() {
            return Err(AssemblyError::format(
                source,
                format!(
                    "line {line_number}: expected {} columns, found {}",
                    columns.len(),
                    fields.len()
                ),
            ));
        }

        let mut row = AssemblyReportRow {
            sequence_name: String::new(),
            sequence_role: String::new(),
            assigned_molecule: String::new(),
            assigned_molecule_location_type: NOT_AVAILABLE.to_string(),
            genbank_accn: String::new(),
            relationship: NOT_AVAILABLE.to_string(),
            refseq_accn: String::new(),
            assembly_unit: String::new(),
            sequence_length: String::new(),
            ucsc_style_name: NOT_AVAILABLE.to_string(),
            extra: Vec::new(),
        };
        for ((name, known), value) in columns.names.iter().zip(&columns.known).zip(fields) {
            match known {
                Some(column) => *row.field_mut(*column) = value.to_string(),
                None => row.extra.push((name.clone(), value.to_string())),
            }
        }
        Ok(row)
    }

    fn field_mut(&mut self, column: ReportColumn) -> &mut String {
        match column {
            ReportColumn::SequenceName => &mut self.sequence_name,
            ReportColumn::SequenceRole => &mut self.sequence_role,
            ReportColumn::AssignedMolecule => &mut self.assigned_molecule,
            ReportColumn::AssignedMoleculeLocationType => {
                &mut self.assigned_molecule_location_type
            }
            ReportColumn::GenbankAccn => &mut self.genbank_accn,
            ReportColumn::Relationship => &mut self.relationship,
            ReportColumn::RefseqAccn => &mut self.refseq_accn,
            ReportColumn::AssemblyUnit => &mut self.assembly_unit,
            ReportColumn::SequenceLength => &mut self.sequence_length,
            ReportColumn::UcscStyleName => &mut self.ucsc_style_name,
        }
    }

    pub fn field(&self, column: ReportColumn) -> &str {
        match column {
            ReportColumn::SequenceName => &self.sequence_name,
            ReportColumn::SequenceRole => &self.sequence_role,
            ReportColumn::AssignedMolecule => &self.assigned_molecule,
            ReportColumn::AssignedMoleculeLocationType => &self.assigned_molecule_location_type,
            ReportColumn::GenbankAccn => &self.genbank_accn,
            ReportColumn::Relationship => &self.relationship,
            ReportColumn::RefseqAccn => &self.refseq_accn,
            ReportColumn::AssemblyUnit => &self.assembly_unit,
            ReportColumn::SequenceLength => &self.sequence_length,
            ReportColumn::UcscStyleName => &self.ucsc_style_name,
        }
    }

    /// Value by header name, including columns this crate does not model.
    pub fn get(&self, name: &str) -> Option<&str> {
        match ReportColumn::from_header(name) {
            Some(column) => Some(self.field(column)),
            None => self
                .extra
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
        }
    }

    pub fn sequence_length_bp(&self) -> Option<u64> {
        self.sequence_length.parse().ok()
    }

    /// Accession to fetch for this row. RefSeq is used only when the GenBank
    /// accession is unavailable and `genbank_only` is off.
    pub fn contig_accession(&self, genbank_only: bool) -> Option<String> {
        if self.genbank_accn != NOT_AVAILABLE && !self.genbank_accn.is_empty() {
            return Some(self.genbank_accn.clone());
        }
        if !genbank_only && self.refseq_accn != NOT_AVAILABLE && !self.refseq_accn.is_empty() {
            return Some(self.refseq_accn.clone());
        }
        None
    }

    /// GenBank and RefSeq accessions of the row, whichever are available. A
    /// sequence written under any of them is already present.
    pub fn accessions(&self) -> Vec<&str> {
        [self.genbank_accn.as_str(), self.refseq_accn.as_str()]
            .into_iter()
            .filter(|acc| !acc.is_empty() && *acc != NOT_AVAILABLE)
            .collect()
    }

    pub fn parse_contig_accession(
        &self,
        genbank_only: bool,
    ) -> Option<Result<ContigAccession, AssemblyError>> {
        self.contig_accession(genbank_only)
            .map(|value| ContigAccession::parse(&value, genbank_only))
    }

    pub fn to_tsv_line(&self, columns: &ReportColumns) -> String {
        columns
            .names
            .iter()
            .map(|name| self.get(name).unwrap_or(NOT_AVAILABLE))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

/// Lazy row iterator over a report. Stops after the first error.
#[derive(Debug)]
pub struct ReportRows<R: BufRead> {
    lines: Lines<R>,
    source: String,
    columns: Option<ReportColumns>,
    pending_header: Option<String>,
    line_number: usize,
    done: bool,
}

impl<R: BufRead> ReportRows<R> {
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            source: source.into(),
            columns: None,
            pending_header: None,
            line_number: 0,
            done: false,
        }
    }

    /// Known once the first data line (or the end of input) has been reached.
    pub fn columns(&self) -> Option<&ReportColumns> {
        self.columns.as_ref()
    }

    fn resolve_columns(&mut self) -> Result<(), AssemblyError> {
        if self.columns.is_some() {
            return Ok(());
        }
        let header = self.pending_header.take().ok_or_else(|| {
            AssemblyError::format(&self.source, "no '#' header line before data")
        })?;
        self.columns = Some(ReportColumns::parse(&header, &self.source)?);
        Ok(())
    }

    fn fail(&mut self, err: AssemblyError) -> Option<Result<AssemblyReportRow, AssemblyError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for ReportRows<R> {
    type Item = Result<AssemblyReportRow, AssemblyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => return self.fail(AssemblyError::Filesystem(err.to_string())),
                None => {
                    self.done = true;
                    if self.columns.is_none() {
                        if let Err(err) = self.resolve_columns() {
                            return Some(Err(err));
                        }
                    }
                    return None;
                }
            };
            self.line_number += 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('#') {
                // Comments after the header carry no columns.
                if self.columns.is_none() {
                    self.pending_header = Some(line.to_string());
                }
                continue;
            }
            if let Err(err) = self.resolve_columns() {
                return self.fail(err);
            }
            let Some(columns) = self.columns.as_ref() else {
                return None;
            };
            let fields = line.split('\t').collect::<Vec<_>>();
            return match AssemblyReportRow::from_fields(
                columns,
                fields,
                &self.source,
                self.line_number,
            ) {
                Ok(row) => Some(Ok(row)),
                Err(err) => self.fail(err),
            };
        }
    }
}

/// Fully parsed report.
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub columns: ReportColumns,
    pub rows: Vec<AssemblyReportRow>,
}

impl AssemblyReport {
    pub fn to_tsv(&self) -> String {
        let mut out = String::from(self.columns.header_line());
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.to_tsv_line(&self.columns));
            out.push('\n');
        }
        out
    }
}

pub fn parse_report_file(path: &Path) -> Result<ReportRows<BufReader<File>>, AssemblyError> {
    let file = File::open(path)
        .map_err(|err| AssemblyError::Filesystem(format!("open {}: {err}", path.display())))?;
    Ok(ReportRows::new(
        BufReader::new(file),
        path.display().to_string(),
    ))
}

pub fn read_report(path: &Path) -> Result<AssemblyReport, AssemblyError> {
    collect_report(parse_report_file(path)?)
}

pub fn parse_report_str(text: &str) -> Result<AssemblyReport, AssemblyError> {
    collect_report(ReportRows::new(text.as_bytes(), "<memory>"))
}

fn collect_report<R: BufRead>(mut rows: ReportRows<R>) -> Result<AssemblyReport, AssemblyError> {
    let collected = rows.by_ref().collect::<Result<Vec<_>, _>>()?;
    let columns = rows
        .columns()
        .cloned()
        .ok_or_else(|| AssemblyError::format(&rows.source, "no '#' header line"))?;
    Ok(AssemblyReport {
        columns,
        rows: collected,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const HEADER: &str = "# Sequence-Name\tSequence-Role\tAssigned-Molecule\tAssigned-Molecule-Location/Type\tGenBank-Accn\tRelationship\tRefSeq-Accn\tAssembly-Unit\tSequence-Length\tUCSC-style-name";

    fn sakai_report() -> String {
        [
            "# Assembly name:  ASM886v2",
            "# Organism name:  Escherichia coli O157:H7 str. Sakai (E. coli)",
            "#",
            HEADER,
            "ANONYMOUS\tassembled-molecule\tna\tChromosome\tBA000007.2\t=\tNC_002695.1\tPrimary Assembly\t5498450\tna",
            "pO157\tassembled-molecule\tpO157\tPlasmid\tAB011549.2\t=\tNC_002128.1\tPrimary Assembly\t92721\tna",
            "pOSAK1\tassembled-molecule\tpOSAK1\tPlasmid\tAB011548.2\t=\tNC_002127.1\tPrimary Assembly\t3306\tna",
        ]
        .join("\n")
            + "\n"
    }

    #[test]
    fn parses_rows_after_comment_block() {
        let report = parse_report_str(&sakai_report()).unwrap();
        assert_eq!(report.rows.len(), 3);
        let first = &report.rows[0];
        assert_eq!(first.sequence_name, "ANONYMOUS");
        assert_eq!(first.assigned_molecule_location_type, "Chromosome");
        assert_eq!(first.genbank_accn, "BA000007.2");
        assert_eq!(first.refseq_accn, "NC_002695.1");
        assert_eq!(first.sequence_length_bp(), Some(5_498_450));
        assert_eq!(report.rows[2].get("GenBank-Accn"), Some("AB011548.2"));
        assert_eq!(report.columns.names()[0], "Sequence-Name");
    }

    #[test]
    fn reserializes_original_lines() {
        let text = sakai_report();
        let report = parse_report_str(&text).unwrap();
        let data_lines = text.lines().skip(4).collect::<Vec<_>>();
        for (row, line) in report.rows.iter().zip(data_lines) {
            assert_eq!(row.to_tsv_line(&report.columns), line);
        }
        assert!(report.to_tsv().starts_with(HEADER));
    }

    #[test]
    fn keeps_unknown_columns() {
        let text = "# Sequence-Name\tSequence-Role\tAssigned-Molecule\tGenBank-Accn\tRefSeq-Accn\tAssembly-Unit\tSequence-Length\tNote\n\
                    chr1\tassembled-molecule\t1\tCM000001.1\tna\tPrimary Assembly\t100\tkept\n";
        let report = parse_report_str(text).unwrap();
        let row = &report.rows[0];
        assert_eq!(row.get("Note"), Some("kept"));
        assert_eq!(row.relationship, "na");
        assert_eq!(row.to_tsv_line(&report.columns), text.lines().nth(1).unwrap());
    }

    #[test]
    fn missing_header_is_format_error() {
        let err = parse_report_str("chr1\tassembled-molecule\n").unwrap_err();
        assert_matches!(err, AssemblyError::Format { .. });
    }

    #[test]
    fn empty_input_is_format_error() {
        let err = parse_report_str("").unwrap_err();
        assert_matches!(err, AssemblyError::Format { .. });
    }

    #[test]
    fn column_count_mismatch_is_format_error() {
        let text = format!("{HEADER}\nscaffold_1\tunplaced-scaffold\tna\n");
        let err = parse_report_str(&text).unwrap_err();
        assert_matches!(err, AssemblyError::Format { message, .. } if message.contains("line 2"));
    }

    #[test]
    fn missing_required_column_is_format_error() {
        let err = parse_report_str("# Sequence-Name\tSequence-Role\nchr1\tx\n").unwrap_err();
        assert_matches!(err, AssemblyError::Format { message, .. } if message.contains("GenBank-Accn"));
    }

    #[test]
    fn iterator_is_lazy_and_stops_after_error() {
        let text = format!("{}\nbroken\n{}", sakai_report(), sakai_report().lines().nth(4).unwrap());
        let mut rows = ReportRows::new(text.as_bytes(), "<memory>");
        assert!(rows.next().unwrap().is_ok());
        assert!(rows.columns().is_some());
        assert!(rows.next().unwrap().is_ok());
        assert!(rows.next().unwrap().is_ok());
        assert!(rows.next().unwrap().is_err());
        assert!(rows.next().is_none());
    }

    #[test]
    fn contig_accession_falls_back_to_refseq() {
        let text = format!(
            "{HEADER}\nchrUn\tunplaced-scaffold\tna\tna\tna\t<>\tNW_000001.1\tPrimary Assembly\t10\tna\n"
        );
        let report = parse_report_str(&text).unwrap();
        let row = &report.rows[0];
        assert_eq!(row.contig_accession(true), None);
        assert_eq!(row.contig_accession(false).as_deref(), Some("NW_000001.1"));
    }
}
