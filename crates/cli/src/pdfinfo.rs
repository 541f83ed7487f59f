//! pdfinfo - Print document information, page geometry and page content
//!
//! Prints the document information dictionary and per-page geometry, and
//! optionally the operator list, text content or annotations of the
//! selected pages.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{ArgAction, Parser};
use memmap2::Mmap;
use quire_core::document::{DocumentInfo, PDFDocument};
use quire_core::{DocumentOptions, EvaluatorOptions, Intent, PasswordCode, PdfError};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Print information about PDF files.
#[derive(Parser, Debug)]
#[command(name = "pdfinfo")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,

    /// The password to use for decrypting PDF file
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Page numbers to inspect (1-indexed). Defaults to all pages
    #[arg(short = 'p', long = "page-numbers", value_delimiter = ',')]
    page_numbers: Vec<usize>,

    /// Rendering intent: display, print or oc
    #[arg(long, default_value = "display")]
    intent: Intent,

    /// Print the operator list of each selected page as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    ops: bool,

    /// Print the text of each selected page
    #[arg(long, action = ArgAction::SetTrue)]
    text: bool,

    /// Print the annotations of each selected page as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    annots: bool,

    /// Print the document report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageReport {
    number: usize,
    label: Option<String>,
    width: f64,
    height: f64,
    rotate: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    file: String,
    encrypted: bool,
    permissions: Option<i32>,
    fingerprints: (String, Option<String>),
    num_pages: usize,
    page_layout: Option<&'static str>,
    page_mode: &'static str,
    info: DocumentInfo,
    pages: Vec<PageReport>,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_document(path: &Path, password: Option<&str>) -> Result<PDFDocument> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    // SAFETY: the mapping is read-only and lives as long as the document.
    let mmap = unsafe { Mmap::map(&file) }?;
    let mut options = DocumentOptions::new();
    if let Some(password) = password {
        options = options.password(password);
    }
    let doc = PDFDocument::open(Bytes::from_owner(mmap), options)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    debug!(file = %path.display(), pages = doc.num_pages(), "opened");
    Ok(doc)
}

fn selected_pages(doc: &PDFDocument, page_numbers: &[usize]) -> Vec<usize> {
    if page_numbers.is_empty() {
        return (0..doc.num_pages()).collect();
    }
    page_numbers
        .iter()
        .filter_map(|&n| {
            let index = n.checked_sub(1).filter(|i| *i < doc.num_pages());
            if index.is_none() {
                warn!(page = n, "page number out of range, skipped");
            }
            index
        })
        .collect()
}

fn build_report(path: &Path, doc: &PDFDocument, pages: &[usize]) -> Result<Report> {
    let labels = doc.page_labels();
    let mut page_reports = Vec::with_capacity(pages.len());
    for &index in pages {
        let page = doc.get_page(index)?;
        let viewport = page.viewport(1.0, 0);
        page_reports.push(PageReport {
            number: index + 1,
            label: labels.as_ref().and_then(|l| l.get(index).cloned()),
            width: viewport.width,
            height: viewport.height,
            rotate: page.rotate,
        });
    }
    Ok(Report {
        file: path.display().to_string(),
        encrypted: doc.is_encrypted(),
        permissions: doc.permissions(),
        fingerprints: doc.fingerprints(),
        num_pages: doc.num_pages(),
        page_layout: doc.page_layout(),
        page_mode: doc.page_mode(),
        info: doc.document_info(),
        pages: page_reports,
    })
}

fn print_report<W: Write>(out: &mut W, report: &Report) -> io::Result<()> {
    let info = &report.info;
    writeln!(out, "File:           {}", report.file)?;
    let fields = [
        ("Title", &info.title),
        ("Author", &info.author),
        ("Subject", &info.subject),
        ("Keywords", &info.keywords),
        ("Creator", &info.creator),
        ("Producer", &info.producer),
        ("CreationDate", &info.creation_date),
        ("ModDate", &info.mod_date),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            writeln!(out, "{:<16}{value}", format!("{key}:"))?;
        }
    }
    for (key, value) in &info.custom {
        writeln!(out, "{:<16}{value}", format!("{key}:"))?;
    }
    writeln!(
        out,
        "PDF version:    {}",
        info.pdf_format_version.as_deref().unwrap_or("unknown")
    )?;
    writeln!(out, "Linearized:     {}", if info.is_linearized { "yes" } else { "no" })?;
    writeln!(out, "Encrypted:      {}", if report.encrypted { "yes" } else { "no" })?;
    if let Some(p) = report.permissions {
        writeln!(out, "Permissions:    {p:#010x}")?;
    }
    writeln!(out, "AcroForm:       {}", if info.is_acro_form_present { "yes" } else { "no" })?;
    writeln!(out, "Page mode:      {}", report.page_mode)?;
    if let Some(layout) = report.page_layout {
        writeln!(out, "Page layout:    {layout}")?;
    }
    write!(out, "Fingerprint:    {}", report.fingerprints.0)?;
    match &report.fingerprints.1 {
        Some(second) => writeln!(out, " {second}")?,
        None => writeln!(out)?,
    }
    writeln!(out, "Pages:          {}", report.num_pages)?;
    for page in &report.pages {
        write!(
            out,
            "Page {:>4}:      {:.2} x {:.2} pts, rotate {}",
            page.number, page.width, page.height, page.rotate
        )?;
        match &page.label {
            Some(label) => writeln!(out, ", label \"{label}\"")?,
            None => writeln!(out)?,
        }
    }
    Ok(())
}

fn process<W: Write>(out: &mut W, path: &Path, args: &Args) -> Result<()> {
    let doc = open_document(path, args.password.as_deref())?;
    if doc.is_encrypted()
        && let Err(PdfError::Password(code)) = doc.xref().ensure_unlocked()
    {
        match code {
            PasswordCode::NeedPassword => bail!("{} is encrypted, use --password", path.display()),
            PasswordCode::IncorrectPassword => bail!("incorrect password for {}", path.display()),
        }
    }

    let pages = selected_pages(&doc, &args.page_numbers);
    let report = build_report(path, &doc, &pages)?;
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        print_report(out, &report)?;
    }

    let options = EvaluatorOptions::new().intent(args.intent);
    for &index in &pages {
        if args.ops {
            let list = doc.get_operator_list(index, &options)?;
            writeln!(out, "--- page {} operators ({}) ---", index + 1, list.len())?;
            serde_json::to_writer_pretty(&mut *out, &list)?;
            writeln!(out)?;
        }
        if args.text {
            let text = doc.get_text_content(index, &options)?;
            writeln!(out, "--- page {} text ---", index + 1)?;
            writeln!(out, "{}", text.to_plain_text())?;
        }
        if args.annots {
            let annots = doc.get_annotations(index, args.intent)?;
            writeln!(out, "--- page {} annotations ({}) ---", index + 1, annots.len())?;
            serde_json::to_writer_pretty(&mut *out, &annots)?;
            writeln!(out)?;
        }
    }
    doc.cleanup();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failed = false;
    for path in &args.files {
        if let Err(e) = process(&mut out, path, &args) {
            out.flush()?;
            eprintln!("Error: {e:#}");
            failed = true;
        }
    }
    out.flush()?;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
