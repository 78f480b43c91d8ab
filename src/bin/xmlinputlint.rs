//! A small tester program for the XML input layer.
//!
//! Every document is decoded to UTF-8 and read character by character.
//! Diagnostics go to the standard error.

// Copyright of the original code is the following.
// --------
// xmllint.c : a small tester program for XML input.
//
// See Copyright for the status of this software.
//
// daniel@veillard.com

use std::{
    fs::File,
    io::{Read, stdin},
    process::exit,
    time::Instant,
};

use anyhow::Context;
use clap::Parser;
use xmlinput::{
    encoding::XmlCharEncoding,
    error::XmlParserErrors,
    io::XmlParserInputBuffer,
    parser::{
        XmlParserConfig, XmlParserCtxt, XmlParserInput, XmlParserInputState,
        XmlParserOption,
    },
};

const RETURN_OK: i32 = 0; // No error
const ERR_UNCLASS: i32 = 1; // Unclassified
const ERR_RDFILE: i32 = 4; // CtxtReadFile error

#[derive(clap::Parser, Debug)]
#[command(version, name = "xmlinputlint", arg_required_else_help = true)]
struct CmdArgs {
    /// documents to read, `-` for the standard input
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// output what was parsable on broken XML documents
    #[arg(long)]
    recover: bool,
    /// remove any internal arbitrary parser limits
    #[arg(long)]
    huge: bool,
    /// ignore any encoding specified inside the document
    #[arg(long)]
    noenc: bool,
    /// refuse to fetch DTDs or entities over network
    #[arg(long)]
    nonet: bool,
    /// do not emit warnings from parser/validator
    #[arg(long)]
    nowarning: bool,
    /// enable additional warnings
    #[arg(long)]
    pedantic: bool,
    /// input file encoding
    #[arg(long, value_name = "encoding")]
    encoding: Option<String>,
    /// use the push mode of the parser
    #[arg(long)]
    push: bool,
    /// size of the chunks fed in push mode
    #[arg(long, value_name = "nbbytes", default_value_t = 4096)]
    chunk: usize,
    /// maximum amplification factor of entities
    #[arg(long, value_name = "factor")]
    maxampl: Option<u32>,
    /// print some timings
    #[arg(long)]
    timing: bool,
    /// don't output the summary of each document
    #[arg(long)]
    noout: bool,
}

impl CmdArgs {
    fn options(&self) -> i32 {
        [
            (self.recover, XmlParserOption::XmlParseRecover),
            (self.huge, XmlParserOption::XmlParseHuge),
            (self.noenc, XmlParserOption::XmlParseIgnoreEnc),
            (self.nonet, XmlParserOption::XmlParseNoNet),
            (self.nowarning, XmlParserOption::XmlParseNoWarning),
            (self.pedantic, XmlParserOption::XmlParsePedantic),
        ]
        .into_iter()
        .filter(|&(set, _)| set)
        .fold(0, |acc, (_, opt)| acc | opt as i32)
    }

    fn new_context(&self) -> XmlParserCtxt {
        let mut ctxt = XmlParserCtxt::with_config(XmlParserConfig {
            options: self.options(),
            ..XmlParserConfig::from_globals()
        });
        if let Some(factor) = self.maxampl {
            ctxt.set_max_amplification(factor);
        }
        ctxt
    }
}

/// What was read from one document.
#[derive(Debug, Default)]
struct Summary {
    chars: usize,
    lines: usize,
}

impl Summary {
    /// Consume every complete character currently available.
    fn drain(&mut self, ctxt: &mut XmlParserCtxt) {
        // Nothing is read before the declaration is scanned, nor after a halt.
        while ctxt.instate != XmlParserInputState::XmlParserStart && ctxt.disable_sax < 2 {
            let (c, len) = ctxt.current_char();
            if len == 0 {
                break;
            }
            self.chars += 1;
            if c == '\n' {
                self.lines += 1;
            }
            ctxt.advance_char(len);
        }
    }
}

fn read_all(filename: &str) -> anyhow::Result<Vec<u8>> {
    let mut data = vec![];
    if filename == "-" {
        stdin()
            .read_to_end(&mut data)
            .context("failed to read the standard input")?;
    } else {
        File::open(filename)
            .and_then(|mut file| file.read_to_end(&mut data))
            .with_context(|| format!("failed to read {filename}"))?;
    }
    Ok(data)
}

/// Read `filename` by pulling from a reader.
fn pull_document(args: &CmdArgs, filename: &str) -> Option<(XmlParserCtxt, Summary)> {
    let mut ctxt = args.new_context();
    let input = if filename == "-" {
        let buf = XmlParserInputBuffer::from_reader(stdin(), XmlCharEncoding::None);
        XmlParserInput::from_io(&mut ctxt, buf, XmlCharEncoding::None)
    } else {
        XmlParserInput::from_file(&mut ctxt, filename)
    }?;
    if ctxt.input_push(input) < 0 {
        return None;
    }
    if let Some(encoding) = args.encoding.as_deref() {
        if ctxt.switch_encoding_name(encoding) < 0 {
            return Some((ctxt, Summary::default()));
        }
    }

    let mut summary = Summary::default();
    if ctxt.start_document() == 0 {
        summary.drain(&mut ctxt);
    }
    Some((ctxt, summary))
}

/// Read `filename` by feeding it to a push parser chunk by chunk.
fn push_document(args: &CmdArgs, filename: &str) -> Option<(XmlParserCtxt, Summary)> {
    let data = match read_all(filename) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("{err:#}");
            return None;
        }
    };
    let mut chunks = data.chunks(args.chunk.max(1));
    let first = chunks.next().unwrap_or_default();
    let name = (filename != "-").then_some(filename);
    let mut ctxt = XmlParserCtxt::new_push(first, name)?;
    ctxt.use_options(args.options());
    if let Some(factor) = args.maxampl {
        ctxt.set_max_amplification(factor);
    }
    if let Some(encoding) = args.encoding.as_deref() {
        ctxt.switch_encoding_name(encoding);
    }

    let mut summary = Summary::default();
    ctxt.parse_chunk(b"", false);
    summary.drain(&mut ctxt);
    for chunk in chunks {
        if ctxt.parse_chunk(chunk, false) == XmlParserErrors::XmlErrUserStop {
            break;
        }
        summary.drain(&mut ctxt);
    }
    ctxt.parse_chunk(b"", true);
    summary.drain(&mut ctxt);
    Some((ctxt, summary))
}

fn report(args: &CmdArgs, filename: &str, ctxt: &XmlParserCtxt, summary: &Summary) {
    if args.noout {
        return;
    }
    println!(
        "{filename}: version {}, encoding {}, {} chars, {} lines{}",
        ctxt.version.as_deref().unwrap_or("none"),
        ctxt.get_actual_encoding().unwrap_or("UTF-8"),
        summary.chars,
        summary.lines,
        if ctxt.well_formed != 0 {
            ""
        } else {
            ", not well-formed"
        }
    );
}

fn main() {
    let args = CmdArgs::parse();
    let mut progresult = RETURN_OK;

    for filename in &args.xml_files {
        let start = Instant::now();
        let res = if args.push {
            push_document(&args, filename)
        } else {
            pull_document(&args, filename)
        };
        let Some((ctxt, summary)) = res else {
            eprintln!("failed to open {filename}");
            progresult = ERR_RDFILE;
            continue;
        };
        if args.timing {
            eprintln!("Reading {filename} took {} ms", start.elapsed().as_millis());
        }
        report(&args, filename, &ctxt, &summary);
        if (ctxt.well_formed == 0 || ctxt.err_no != 0) && progresult == RETURN_OK {
            progresult = ERR_UNCLASS;
        }
    }
    exit(progresult);
}
