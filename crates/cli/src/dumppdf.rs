//! dumppdf - Dump PDF objects in XML format
//!
//! A command line tool for dumping the object graph, trailers, outline and
//! attachments of a PDF, and for rewriting it as a single clean revision.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{ArgAction, ArgGroup, Parser};
use memmap2::Mmap;
use quire_core::document::{OutlineItem, PDFDocument, XRef};
use quire_core::writer::Writer;
use quire_core::{DocumentOptions, ObjRef, PDFObject};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Escape special characters for XML output.
fn escape(s: &[u8]) -> String {
    let mut result = String::with_capacity(s.len());
    for &byte in s {
        match byte {
            b'&' => result.push_str("&amp;"),
            b'<' => result.push_str("&lt;"),
            b'>' => result.push_str("&gt;"),
            b'"' => result.push_str("&quot;"),
            b'\'' => result.push_str("&#39;"),
            0..=31 | 127..=255 => result.push_str(&format!("&#{byte};")),
            _ => result.push(byte as char),
        }
    }
    result
}

/// How stream bodies are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCodec {
    /// Dictionary only.
    None,
    /// Undecoded bytes, no markup.
    Raw,
    /// Decoded bytes, no markup.
    Binary,
    /// Dictionary plus escaped decoded data.
    Text,
}

fn dumpxml<W: Write>(out: &mut W, xref: &XRef, obj: &PDFObject, codec: StreamCodec) -> Result<()> {
    match obj {
        PDFObject::Null => write!(out, "<null />")?,
        PDFObject::Bool(b) => write!(out, "<boolean>{b}</boolean>")?,
        PDFObject::Int(n) => write!(out, "<number>{n}</number>")?,
        PDFObject::Real(n) => write!(out, "<number>{n}</number>")?,
        PDFObject::String(s) => write!(out, r#"<string size="{}">{}</string>"#, s.len(), escape(s))?,
        PDFObject::Name(name) => write!(out, "<literal>{}</literal>", escape(name.as_str().as_bytes()))?,
        PDFObject::Array(arr) => {
            writeln!(out, r#"<list size="{}">"#, arr.len())?;
            for item in arr {
                dumpxml(out, xref, item, codec)?;
                writeln!(out)?;
            }
            write!(out, "</list>")?;
        }
        PDFObject::Dict(dict) => {
            writeln!(out, r#"<dict size="{}">"#, dict.len())?;
            for (k, v) in dict.iter() {
                writeln!(out, "<key>{}</key>", escape(k.as_str().as_bytes()))?;
                write!(out, "<value>")?;
                dumpxml(out, xref, v, codec)?;
                writeln!(out, "</value>")?;
            }
            write!(out, "</dict>")?;
        }
        PDFObject::Stream(stream) => match codec {
            StreamCodec::Raw => out.write_all(stream.raw())?,
            StreamCodec::Binary => out.write_all(&xref.decode_stream(stream)?.data)?,
            StreamCodec::None | StreamCodec::Text => {
                writeln!(out, "<stream>")?;
                writeln!(out, "<props>")?;
                dumpxml(out, xref, &PDFObject::Dict(stream.dict.clone()), codec)?;
                writeln!(out)?;
                writeln!(out, "</props>")?;
                if codec == StreamCodec::Text {
                    match xref.decode_stream(stream) {
                        Ok(decoded) => writeln!(
                            out,
                            r#"<data size="{}">{}</data>"#,
                            decoded.data.len(),
                            escape(&decoded.data)
                        )?,
                        Err(err) => {
                            warn!(%err, "stream could not be decoded");
                            writeln!(out, r#"<data size="0" error="{}" />"#, escape(err.to_string().as_bytes()))?;
                        }
                    }
                }
                write!(out, "</stream>")?;
            }
        },
        PDFObject::Ref(r) => write!(out, r#"<ref id="{}" gen="{}" />"#, r.num, r.generation)?,
    }
    Ok(())
}

/// Dump the trailers, newest first. Trailers of a recovered document are
/// synthesized and only shown on request.
fn dumptrailers<W: Write>(out: &mut W, xref: &XRef, show_fallback_xref: bool) -> Result<()> {
    if xref.recovered() && !show_fallback_xref {
        eprintln!(
            "Warning: This PDF does not have a valid xref. Use --show-fallback-xref \
             to display the content of a fallback xref that contains all objects."
        );
        return Ok(());
    }
    for trailer in xref.trailers() {
        writeln!(out, "<trailer>")?;
        dumpxml(out, xref, &PDFObject::Dict(trailer.clone()), StreamCodec::None)?;
        writeln!(out)?;
        writeln!(out, "</trailer>")?;
        writeln!(out)?;
    }
    Ok(())
}

fn object_ref(xref: &XRef, num: u32) -> ObjRef {
    ObjRef::new(num, xref.entry(num).map_or(0, |e| e.generation()))
}

fn dumpobject<W: Write>(out: &mut W, xref: &XRef, num: u32, codec: StreamCodec) -> Result<()> {
    match xref.fetch(object_ref(xref, num)) {
        Some(obj) => {
            writeln!(out, r#"<object id="{num}">"#)?;
            dumpxml(out, xref, &obj, codec)?;
            writeln!(out)?;
            writeln!(out, "</object>")?;
            writeln!(out)?;
        }
        None => eprintln!("not found: object {num}"),
    }
    Ok(())
}

/// Dump every object listed in the cross-reference data, then the trailers.
fn dumpallobjs<W: Write>(out: &mut W, doc: &PDFDocument, codec: StreamCodec, show_fallback_xref: bool) -> Result<()> {
    let xref = doc.xref();
    write!(out, "<pdf>")?;
    for num in xref.object_numbers() {
        if num == 0 {
            continue;
        }
        dumpobject(out, xref, num, codec)?;
    }
    dumptrailers(out, xref, show_fallback_xref)?;
    write!(out, "</pdf>")?;
    Ok(())
}

/// Page number (1-indexed) an explicit or named destination points to.
fn dest_pageno(doc: &PDFDocument, dest: &PDFObject) -> Option<usize> {
    let explicit = match dest {
        PDFObject::String(s) => doc.get_destination(&String::from_utf8_lossy(s))?,
        PDFObject::Name(n) => doc.get_destination(n.as_str())?,
        other => other.clone(),
    };
    match explicit.as_array().ok()?.first()? {
        PDFObject::Ref(r) => doc.page_index_of(*r).map(|i| i + 1),
        PDFObject::Int(i) => usize::try_from(*i).ok().map(|i| i + 1),
        _ => None,
    }
}

fn dump_outline_items<W: Write>(out: &mut W, doc: &PDFDocument, items: &[OutlineItem], level: usize) -> Result<()> {
    for item in items {
        writeln!(
            out,
            r#"<outline level="{level}" title="{}">"#,
            escape(item.title.as_bytes())
        )?;
        if let Some(dest) = &item.dest {
            write!(out, "<dest>")?;
            dumpxml(out, doc.xref(), dest, StreamCodec::None)?;
            writeln!(out, "</dest>")?;
            if let Some(pageno) = dest_pageno(doc, dest) {
                writeln!(out, "<pageno>{pageno}</pageno>")?;
            }
        }
        if let Some(url) = &item.url {
            writeln!(out, "<url>{}</url>", escape(url.as_bytes()))?;
        }
        writeln!(out, "</outline>")?;
        dump_outline_items(out, doc, &item.items, level + 1)?;
    }
    Ok(())
}

fn dumpoutline<W: Write>(out: &mut W, doc: &PDFDocument) -> Result<()> {
    writeln!(out, "<outlines>")?;
    dump_outline_items(out, doc, &doc.outline(), 0)?;
    writeln!(out, "</outlines>")?;
    Ok(())
}

/// Write each embedded file into `extractdir`, never overwriting.
fn extractembedded(doc: &PDFDocument, extractdir: &Path) -> Result<()> {
    std::fs::create_dir_all(extractdir)?;
    for (name, attachment) in doc.attachments() {
        let filename = if attachment.filename.is_empty() {
            &name
        } else {
            &attachment.filename
        };
        let Some(basename) = Path::new(filename).file_name() else {
            warn!(name = %name, "attachment has no usable file name");
            continue;
        };
        let path = extractdir.join(basename);
        if path.exists() {
            eprintln!("Warning: file exists: {}", path.display());
            continue;
        }
        eprintln!("extracting: {}", path.display());
        std::fs::write(&path, &attachment.content)?;
    }
    Ok(())
}

fn dumppdf<W: Write>(
    out: &mut W,
    doc: &PDFDocument,
    objids: &[u32],
    pagenos: &HashSet<usize>,
    codec: StreamCodec,
    show_fallback_xref: bool,
) -> Result<()> {
    let xref = doc.xref();
    for &num in objids {
        dumpobject(out, xref, num, codec)?;
    }

    let mut pages: Vec<usize> = pagenos.iter().copied().filter(|&i| i < doc.num_pages()).collect();
    pages.sort_unstable();
    for index in pages {
        let page = doc.get_page(index)?;
        if codec == StreamCodec::None {
            dumpxml(out, xref, &PDFObject::Dict(page.dict.clone()), codec)?;
        } else {
            for data in page.content_data(xref) {
                match codec {
                    StreamCodec::Text => writeln!(out, r#"<data size="{}">{}</data>"#, data.len(), escape(&data))?,
                    _ => out.write_all(&data)?,
                }
            }
        }
    }

    if objids.is_empty() && pagenos.is_empty() {
        dumptrailers(out, xref, show_fallback_xref)?;
    }
    if codec != StreamCodec::Raw && codec != StreamCodec::Binary {
        writeln!(out)?;
    }
    Ok(())
}

/// Write `doc` back out as a single revision with a fresh xref table.
fn rewrite(doc: &PDFDocument, target: &Path) -> Result<()> {
    let bytes = Writer::new(doc).write()?;
    std::fs::write(target, &bytes).with_context(|| format!("cannot write {}", target.display()))?;
    debug!(target = %target.display(), size = bytes.len(), "rewritten");
    Ok(())
}

/// A command line tool for dumping PDF internal structure as XML.
#[derive(Parser, Debug)]
#[command(name = "dumppdf")]
#[command(author, version, about = "Extract PDF structure in XML format", long_about = None)]
#[command(disable_version_flag = true)]
#[command(group(
    ArgGroup::new("procedure")
        .args(["extract_toc", "extract_embedded", "rewrite"])
))]
#[command(group(
    ArgGroup::new("stream_codec")
        .args(["raw_stream", "binary_stream", "text_stream"])
))]
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

    /// Extract structure of outline (table of contents)
    #[arg(short = 'T', long = "extract-toc", action = ArgAction::SetTrue)]
    extract_toc: bool,

    /// Extract embedded files to the specified directory
    #[arg(short = 'E', long = "extract-embedded")]
    extract_embedded: Option<PathBuf>,

    /// Rewrite the document as one revision to the given path
    #[arg(short = 'R', long = "rewrite")]
    rewrite: Option<PathBuf>,

    /// Page numbers to dump (1-indexed), comma separated
    #[arg(short = 'p', long = "page-numbers", value_delimiter = ',')]
    page_numbers: Vec<usize>,

    /// Object numbers to dump, comma separated
    #[arg(short = 'i', long = "objects", value_delimiter = ',')]
    objects: Vec<u32>,

    /// Extract structure of all objects
    #[arg(short = 'a', long = "all", action = ArgAction::SetTrue)]
    all: bool,

    /// Show the synthesized xref of a recovered document
    #[arg(long = "show-fallback-xref", action = ArgAction::SetTrue)]
    show_fallback_xref: bool,

    /// The password to use for decrypting PDF file
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Path to file where output is written, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,

    /// Write stream objects without decoding (raw)
    #[arg(short = 'r', long = "raw-stream", action = ArgAction::SetTrue)]
    raw_stream: bool,

    /// Write decoded stream objects without markup
    #[arg(short = 'b', long = "binary-stream", action = ArgAction::SetTrue)]
    binary_stream: bool,

    /// Write stream objects as escaped text
    #[arg(short = 't', long = "text-stream", action = ArgAction::SetTrue)]
    text_stream: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    let codec = if args.raw_stream {
        StreamCodec::Raw
    } else if args.binary_stream {
        StreamCodec::Binary
    } else if args.text_stream {
        StreamCodec::Text
    } else {
        StreamCodec::None
    };
    let pagenos: HashSet<usize> = args.page_numbers.iter().map(|n| n.saturating_sub(1)).collect();

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(File::create(&args.outfile)?))
    };

    for path in &args.files {
        let file = File::open(path).with_context(|| format!("file not found: {}", path.display()))?;
        // SAFETY: the mapping is read-only and outlives the document.
        let mmap = unsafe { Mmap::map(&file) }?;
        let mut options = DocumentOptions::new();
        if let Some(password) = &args.password {
            options = options.password(password);
        }
        let doc = PDFDocument::open(Bytes::from_owner(mmap), options)
            .with_context(|| format!("cannot parse {}", path.display()))?;

        if args.extract_toc {
            dumpoutline(&mut output, &doc)?;
        } else if let Some(extractdir) = &args.extract_embedded {
            extractembedded(&doc, extractdir)?;
        } else if let Some(target) = &args.rewrite {
            rewrite(&doc, target)?;
        } else if args.all {
            dumpallobjs(&mut output, &doc, codec, args.show_fallback_xref)?;
        } else {
            dumppdf(
                &mut output,
                &doc,
                &args.objects,
                &pagenos,
                codec,
                args.show_fallback_xref,
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
