//! Provide methods and data structures for handling I/O actions.
//! This module is based on `libxml/xmlIO.h`, `xmlIO.c`, and so on in `libxml2-v2.13`.
//!
//! Please refer to original libxml2 documents also.

// Copyright of the original code is the following.
// --------
// Summary: interface for the I/O interfaces used by the parser
// Description: interface for the I/O interfaces used by the parser
//
// Copy: See Copyright for the status of this software.
//
// Author: Daniel Veillard
// --------
// xmlIO.c : implementation of the I/O interfaces used by the parser
//
// See Copyright for the status of this software.
//
// daniel@veillard.com

mod input;

use std::{
    fs::{File, metadata},
    io::{self, ErrorKind, Read, stdin},
    path::Path,
};

pub use input::*;

/// Remove a `file:` scheme from `uri` if the remainder is an absolute path.
pub(crate) fn strip_file_scheme(uri: &str) -> &str {
    ["file://localhost", "file://", "file:"]
        .iter()
        .find_map(|prefix| uri.strip_prefix(prefix).filter(|rest| rest.starts_with('/')))
        .unwrap_or(uri)
}

/// Whether `uri` names a resource reached over the network.
pub(crate) fn is_network_uri(uri: &str) -> bool {
    ["ftp://", "http://", "https://"].iter().any(|scheme| {
        uri.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Lookup the directory for that file.
///
/// If `filename` has no directory component, the current directory is returned.
#[doc(alias = "xmlParserGetDirectory")]
pub fn parser_get_directory(filename: &str) -> Option<String> {
    let filename = strip_file_scheme(filename);
    match filename.rfind('/') {
        Some(0) => Some("/".to_owned()),
        Some(pos) => Some(filename[..pos].to_owned()),
        None => std::env::current_dir()
            .ok()
            .map(|dir| dir.to_string_lossy().into_owned()),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultFileIOCallbacks;

impl XmlInputCallback for DefaultFileIOCallbacks {
    fn is_match(&self, filename: &str) -> bool {
        !is_network_uri(filename)
    }

    fn open(&mut self, filename: &str) -> io::Result<Box<dyn Read>> {
        if filename == "-" {
            return Ok(Box::new(stdin()));
        }

        let path = Path::new(strip_file_scheme(filename));
        if metadata(path)?.is_dir() {
            return Err(io::Error::new(
                ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        File::open(path).map(|file| Box::new(file) as Box<dyn Read>)
    }
}
