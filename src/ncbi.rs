use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::{AssemblyAccession, ContigAccession};
use crate::error::AssemblyError;

pub const DEFAULT_FTP_BASE_URL: &str = "https://ftp.ncbi.nlm.nih.gov";
pub const DEFAULT_EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

static HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<a href="([^"]*)""#).unwrap());

/// Bounded retry budget for transient NCBI failures; the delay grows
/// linearly with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_delay_ms * (attempt as u64 + 1))
    }
}

#[derive(Debug, Clone)]
pub struct NcbiSettings {
    pub ftp_base_url: String,
    pub eutils_base_url: String,
    pub tool: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    /// Connect timeout, and the whole-request deadline for directory listings.
    pub timeout: Duration,
    /// Whole-request deadline for file and contig downloads; `None` lets a
    /// large transfer run as long as data keeps arriving.
    pub download_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for NcbiSettings {
    fn default() -> Self {
        Self {
            ftp_base_url: DEFAULT_FTP_BASE_URL.to_string(),
            eutils_base_url: DEFAULT_EUTILS_BASE_URL.to_string(),
            tool: env!("CARGO_PKG_NAME").to_string(),
            email: None,
            api_key: None,
            timeout: Duration::from_secs(60),
            download_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Listing of an assembly's folder under `genomes/all/` on the NCBI FTP site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyDirectory {
    pub url: String,
    pub name: String,
    pub files: Vec<String>,
}

impl AssemblyDirectory {
    pub fn file_url(&self, file: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), file)
    }

    fn find_file<F>(&self, what: &str, predicate: F) -> Result<String, AssemblyError>
    where
        F: Fn(&str) -> bool,
    {
        self.files
            .iter()
            .find(|file| predicate(file))
            .map(|file| self.file_url(file))
            .ok_or_else(|| AssemblyError::MissingAsset(format!("{what} in {}", self.url)))
    }

    pub fn assembly_report_url(&self) -> Result<String, AssemblyError> {
        self.find_file("assembly report", |file| {
            file.ends_with("_assembly_report.txt")
        })
    }

    pub fn assembly_fasta_url(&self) -> Result<String, AssemblyError> {
        self.find_file("genomic FASTA", |file| {
            file.ends_with("_genomic.fna.gz")
                && !file.ends_with("_rna_from_genomic.fna.gz")
                && !file.ends_with("_cds_from_genomic.fna.gz")
        })
    }
}

pub trait NcbiClient: Send + Sync {
    fn list_assembly_directory(
        &self,
        accession: &AssemblyAccession,
    ) -> Result<AssemblyDirectory, AssemblyError>;
    fn download_to(&self, url: &str, destination: &Path) -> Result<(), AssemblyError>;
    fn download_contig_fasta(
        &self,
        accession: &ContigAccession,
        destination: &Path,
    ) -> Result<(), AssemblyError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    settings: NcbiSettings,
}

impl NcbiHttpClient {
    pub fn new(mut settings: NcbiSettings) -> Result<Self, AssemblyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .map_err(|err| AssemblyError::NcbiHttp(err.to_string()))?,
        );

        if settings.api_key.is_none() {
            if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
                if !api_key.trim().is_empty() {
                    settings.api_key = Some(api_key.trim().to_string());
                }
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.timeout)
            .timeout(settings.download_timeout)
            .build()
            .map_err(|err| AssemblyError::NcbiHttp(err.to_string()))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &NcbiSettings {
        &self.settings
    }

    fn genomes_url(&self, accession: &AssemblyAccession) -> String {
        format!(
            "{}/genomes/all/{}/",
            self.settings.ftp_base_url.trim_end_matches('/'),
            accession.ftp_path_segments().join("/")
        )
    }

    fn efetch_url(&self) -> String {
        format!(
            "{}/efetch.fcgi",
            self.settings.eutils_base_url.trim_end_matches('/')
        )
    }

    fn get_text(&self, url: &str) -> Result<String, AssemblyError> {
        retry_transient(self.settings.retry, url, || {
            let response = send_once(self.client.get(url).timeout(self.settings.timeout), url)?;
            response
                .text()
                .map_err(|err| Failure::Transient(AssemblyError::NcbiHttp(err.to_string())))
        })
    }

    fn efetch_params(&self, accession: &ContigAccession) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "nuccore".to_string()),
            ("id", accession.as_str().to_string()),
            ("rettype", "fasta".to_string()),
            ("retmode", "text".to_string()),
            ("tool", self.settings.tool.clone()),
        ];
        if let Some(email) = &self.settings.email {
            params.push(("email", email.clone()));
        }
        if let Some(api_key) = &self.settings.api_key {
            params.push(("api_key", api_key.clone()));
        }
        params
    }
}

impl NcbiClient for NcbiHttpClient {
    fn list_assembly_directory(
        &self,
        accession: &AssemblyAccession,
    ) -> Result<AssemblyDirectory, AssemblyError> {
        let parent_url = self.genomes_url(accession);
        let listing = self.get_text(&parent_url)?;
        let prefix = format!("{}_", accession.as_str());
        let name = parse_listing(&listing)
            .into_iter()
            .find(|entry| entry.starts_with(&prefix))
            .ok_or_else(|| {
                AssemblyError::MissingAsset(format!("assembly folder for {accession}"))
            })?;

        let url = format!("{parent_url}{name}/");
        let files = parse_listing(&self.get_text(&url)?);
        tracing::debug!(url = %url, files = files.len(), "listed assembly folder");
        Ok(AssemblyDirectory { url, name, files })
    }

    fn download_to(&self, url: &str, destination: &Path) -> Result<(), AssemblyError> {
        retry_transient(self.settings.retry, url, || {
            let mut response = send_once(self.client.get(url), url)?;
            write_body(&mut response, destination)?;
            Ok(())
        })
    }

    fn download_contig_fasta(
        &self,
        accession: &ContigAccession,
        destination: &Path,
    ) -> Result<(), AssemblyError> {
        let url = self.efetch_url();
        let params = self.efetch_params(accession);
        retry_transient(self.settings.retry, accession.as_str(), || {
            let mut response = send_once(self.client.get(&url).query(&params), &url)?;
            write_body(&mut response, destination)?;
            // efetch occasionally answers 200 with an error document.
            if !starts_with_header(destination)? {
                return Err(Failure::Transient(AssemblyError::NcbiHttp(format!(
                    "efetch returned no FASTA for {accession}"
                ))));
            }
            Ok(())
        })
    }
}

/// A failed attempt, classified by whether another attempt may succeed.
enum Failure {
    Transient(AssemblyError),
    Fatal(AssemblyError),
}

/// Runs `attempt_once` until it succeeds, fails fatally, or the retry budget
/// is spent. Each attempt covers the request, the status check and the body.
fn retry_transient<T, F>(policy: RetryPolicy, what: &str, mut attempt_once: F) -> Result<T, AssemblyError>
where
    F: FnMut() -> Result<T, Failure>,
{
    let mut attempt = 0usize;
    loop {
        match attempt_once() {
            Ok(value) => return Ok(value),
            Err(Failure::Fatal(err)) => return Err(err),
            Err(Failure::Transient(err)) if attempt < policy.max_retries => {
                tracing::debug!(error = %err, attempt, what, "retrying NCBI request");
                thread::sleep(policy.delay(attempt));
                attempt += 1;
            }
            Err(Failure::Transient(err)) => return Err(err),
        }
    }
}

fn send_once(request: RequestBuilder, url: &str) -> Result<Response, Failure> {
    let response = request.send().map_err(|err| {
        let retryable = is_retryable_error(&err);
        let err = AssemblyError::NcbiHttp(err.to_string());
        if retryable {
            Failure::Transient(err)
        } else {
            Failure::Fatal(err)
        }
    })?;
    let retryable = is_retryable_status(response.status().as_u16());
    handle_status(response, url).map_err(|err| {
        if retryable {
            Failure::Transient(err)
        } else {
            Failure::Fatal(err)
        }
    })
}

/// Streams `body` into `destination`, truncating whatever an earlier attempt
/// left there.
fn write_body<R: Read>(body: &mut R, destination: &Path) -> Result<u64, Failure> {
    let mut file = File::create(destination)
        .map_err(|err| Failure::Fatal(AssemblyError::Filesystem(err.to_string())))?;
    let written = io::copy(body, &mut file).map_err(|err| {
        Failure::Transient(AssemblyError::NcbiHttp(format!(
            "reading response body: {err}"
        )))
    })?;
    file.flush()
        .map_err(|err| Failure::Fatal(AssemblyError::Filesystem(err.to_string())))?;
    Ok(written)
}

fn starts_with_header(path: &Path) -> Result<bool, Failure> {
    let mut first = [0u8; 1];
    let read = File::open(path)
        .and_then(|mut file| file.read(&mut first))
        .map_err(|err| Failure::Fatal(AssemblyError::Filesystem(err.to_string())))?;
    Ok(read == 1 && first[0] == b'>')
}

fn handle_status(response: Response, url: &str) -> Result<Response, AssemblyError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    if status == 404 {
        return Err(AssemblyError::MissingAsset(url.to_string()));
    }
    let message = response
        .text()
        .unwrap_or_else(|_| "NCBI request failed".to_string());
    Err(AssemblyError::NcbiStatus { status, message })
}

/// Entry names of an HTML directory index, without trailing slashes or
/// navigation links.
pub fn parse_listing(html: &str) -> Vec<String> {
    HREF.captures_iter(html)
        .map(|cap| cap[1].trim_end_matches('/').to_string())
        .filter(|name| !name.is_empty() && !name.starts_with('/') && !name.starts_with('?'))
        .filter(|name| !name.starts_with("http") && name != "..")
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
