use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::AssemblyError;

pub const LINE_WIDTH: usize = 60;

/// Accessions of every record header in `path`, in file order. A missing
/// file has no records.
pub fn get_written_contigs(path: &Path) -> Result<Vec<String>, AssemblyError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    let mut contigs = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        if let Some(accession) = header_accession(&line) {
            contigs.push(accession.to_string());
        }
    }
    Ok(contigs)
}

/// First whitespace-delimited token of a `>` header line.
pub fn header_accession(line: &str) -> Option<&str> {
    line.strip_prefix('>')
        .and_then(|rest| rest.split_whitespace().next())
}

/// Drops an incomplete final record left behind by an interrupted append.
///
/// The final record is complete when the file ends with a newline, its
/// header is followed by at least one sequence line and, when
/// `expected_len` knows the accession, its base count matches. The length
/// check catches appends cut exactly at a line break. Returns the accession
/// of the removed record.
pub fn repair_truncated_tail<F>(path: &Path, expected_len: F) -> Result<Option<String>, AssemblyError>
where
    F: Fn(&str) -> Option<u64>,
{
    if !path.exists() {
        return Ok(None);
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;

    let mut offset = 0u64;
    let mut last_header: Option<(u64, String)> = None;
    let mut bases = 0u64;
    let mut ends_with_newline = true;
    let mut reader = BufReader::new(&mut file);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        ends_with_newline = line.ends_with(b"\n");
        if line.first() == Some(&b'>') {
            let text = String::from_utf8_lossy(&line);
            let accession = header_accession(text.trim_end()).unwrap_or_default();
            last_header = Some((offset, accession.to_string()));
            bases = 0;
        } else {
            bases += line.iter().filter(|b| !b.is_ascii_whitespace()).count() as u64;
        }
        offset += read as u64;
    }
    drop(reader);

    match last_header {
        Some((start, accession)) => {
            let expected = expected_len(&accession);
            let complete = bases > 0
                && ends_with_newline
                && expected.is_none_or(|len| len == bases);
            if complete {
                return Ok(None);
            }
            file.set_len(start)
                .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
            tracing::warn!(
                accession = %accession,
                bases,
                expected = ?expected,
                path = %path.display(),
                "removed incomplete trailing FASTA record"
            );
            Ok(Some(accession))
        }
        None if offset > 0 && !ends_with_newline => {
            // Headerless fragment; nothing in it can be trusted.
            file.set_len(0)
                .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Whether `path` holds a finished record for `accession`. Reads the file a
/// line at a time.
pub fn is_complete_fasta(path: &Path, accession: &str) -> Result<bool, AssemblyError> {
    if !path.exists() {
        return Ok(false);
    }
    let file = File::open(path).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let read = reader
        .read_until(b'\n', &mut line)
        .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    if read == 0 {
        return Ok(false);
    }
    let header = String::from_utf8_lossy(&line);
    if header_accession(header.trim_end()) != Some(accession) {
        return Ok(false);
    }

    let mut has_sequence = false;
    let mut ends_with_newline = line.ends_with(b"\n");
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
        ends_with_newline = line.ends_with(b"\n");
        if line.first() != Some(&b'>') && !line.iter().all(u8::is_ascii_whitespace) {
            has_sequence = true;
        }
    }
    Ok(has_sequence && ends_with_newline)
}

/// Appends the records of `source` to `destination`, creating it if needed.
pub fn append_fasta(source: &Path, destination: &Path) -> Result<u64, AssemblyError> {
    let mut input =
        File::open(source).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    let mut output = OpenOptions::new()
        .create(true)
        .append(true)
        .open(destination)
        .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;

    let mut copied =
        io::copy(&mut input, &mut output).map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    if copied > 0 && !ends_with_newline(&mut input)? {
        output
            .write_all(b"\n")
            .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
        copied += 1;
    }
    output
        .flush()
        .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    Ok(copied)
}

fn ends_with_newline(file: &mut File) -> Result<bool, AssemblyError> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|err| AssemblyError::Filesystem(err.to_string()))?;
    Ok(last[0] == b'\n')
}

pub fn write_wrapped_record<W: Write>(
    writer: &mut W,
    header: &str,
    sequence: &[u8],
    width: usize,
) -> io::Result<()> {
    writeln!(writer, ">{header}")?;
    for chunk in sequence.chunks(width.max(1)) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
