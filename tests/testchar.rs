//! Test the UTF-8 decoding routines
//!
//! author: Daniel Veillard
//! copy: see Copyright for the status of this software.

use std::cell::Cell;

use xmlinput::{
    error::{XmlError, XmlParserErrors},
    globals::GenericErrorContext,
    parser::{XmlParserCtxt, XmlParserInput},
};

thread_local! {
    static LAST_ERROR: Cell<Option<XmlParserErrors>> = const { Cell::new(None) };
}

fn error_handler(_: Option<GenericErrorContext>, err: &XmlError) {
    LAST_ERROR.with(|last| {
        if last.get().is_none() {
            last.set(Some(err.code()));
        }
    });
}

fn context(bytes: &[u8], encoding: Option<&str>) -> XmlParserCtxt {
    LAST_ERROR.set(None);
    let mut ctxt = XmlParserCtxt::new();
    ctxt.set_error_handler(Some(error_handler), None);
    let input = XmlParserInput::from_memory(&mut ctxt, Some("test"), bytes, encoding, 0).unwrap();
    assert!(ctxt.input_push(input) >= 0);
    ctxt
}

/// Decode the first character of `bytes` on a fresh stream.
fn current_char(bytes: &[u8]) -> ((char, usize), Option<XmlParserErrors>) {
    let mut ctxt = context(bytes, None);
    let res = ctxt.current_char();
    (res, LAST_ERROR.take())
}

/// The first character of `bytes` according to the standard library.
fn expected(bytes: &[u8]) -> Option<(char, usize)> {
    let c = bytes.utf8_chunks().next()?.valid().chars().next()?;
    Some((c, c.len_utf8()))
}

fn check(bytes: &[u8]) {
    let (res, err) = current_char(bytes);
    match expected(bytes) {
        Some(c) => {
            assert_eq!(res, c, "Failed to parse char for Bytes {bytes:02X?}");
            assert_eq!(err, None, "Unexpected error for Bytes {bytes:02X?}");
        }
        None => {
            assert_eq!(
                res,
                (char::REPLACEMENT_CHARACTER, 1),
                "Failed to replace invalid char for Bytes {bytes:02X?}"
            );
            assert_eq!(
                err,
                Some(XmlParserErrors::XmlErrInvalidEncoding),
                "Failed to detect invalid char for Bytes {bytes:02X?}"
            );
        }
    }
}

const LOWS: [u8; 6] = [0, 0x80, 0x81, 0xC1, 0xFF, 0xBF];

#[test]
fn char_range_byte1() {
    for i in 0u8..=0xFF {
        let (res, err) = current_char(&[i, b' ']);
        match i {
            0 => {
                assert_eq!(res, ('\0', 1));
                assert_eq!(err, Some(XmlParserErrors::XmlErrInvalidChar));
            }
            b'\r' => assert_eq!((res, err), (('\n', 1), None)),
            0x01..0x80 => assert_eq!((res, err), ((i as char, 1), None), "Byte 0x{i:02X}"),
            _ => assert_eq!(
                (res, err),
                (
                    (char::REPLACEMENT_CHARACTER, 1),
                    Some(XmlParserErrors::XmlErrInvalidEncoding)
                ),
                "Failed to detect invalid char for Byte 0x{i:02X}"
            ),
        }
    }
}

#[test]
fn char_range_byte2() {
    for i in 0x80..=0xFF {
        for j in 0..=0xFF {
            check(&[i, j, b' ']);
        }
    }
}

#[test]
fn char_range_byte3() {
    for i in 0xE0..=0xFF {
        for j in 0..=0xFF {
            for k in LOWS {
                check(&[i, j, k, b' ']);
            }
        }
    }
}

#[test]
fn char_range_byte4() {
    for i in 0xF0..=0xFF {
        for j in (0x80..=0xBF).chain(LOWS) {
            for k in LOWS {
                for l in LOWS {
                    check(&[i, j, k, l, b' ']);
                }
            }
        }
    }
}

#[test]
fn well_known_chars() {
    for s in ["\u{7F}", "\u{80}", "\u{7FF}", "\u{800}", "\u{D7FF}", "\u{E000}", "\u{FFFD}"] {
        let ((c, len), err) = current_char(s.as_bytes());
        assert_eq!((c.to_string().as_str(), len, err), (s, s.len(), None));
    }
    for s in ["\u{10000}", "\u{10FFFF}", "\u{1F600}"] {
        let ((c, len), err) = current_char(s.as_bytes());
        assert_eq!((c.to_string().as_str(), len, err), (s, 4, None));
    }
}

#[test]
fn document_lines_and_columns() {
    let doc = "<doc>\r\na\u{E9}\r\u{20AC}\n</doc>";
    let mut ctxt = context(doc.as_bytes(), None);

    let mut text = String::new();
    loop {
        let (c, len) = ctxt.current_char();
        if len == 0 {
            break;
        }
        text.push(c);
        ctxt.advance_char(len);
    }
    assert_eq!(text, "<doc>\na\u{E9}\n\u{20AC}\n</doc>");
    let input = ctxt.input().unwrap();
    assert_eq!((input.line, input.col), (4, 7));
    assert_eq!(LAST_ERROR.take(), None);

    let mut ctxt = context(doc.as_bytes(), None);
    let mut positions = vec![];
    while !ctxt.content_bytes().is_empty() {
        ctxt.skip_char();
        let input = ctxt.input().unwrap();
        positions.push((input.line, input.col));
    }
    assert_eq!(
        positions,
        [
            (1, 2),
            (1, 3),
            (1, 4),
            (1, 5),
            (1, 6),
            (2, 1),
            (2, 2),
            (2, 3),
            (3, 1),
            (3, 2),
            (4, 1),
            (4, 2),
            (4, 3),
            (4, 4),
            (4, 5),
            (4, 6),
            (4, 7),
        ]
    );
}

#[test]
fn invalid_bytes_are_reported_once_per_stream() {
    let mut ctxt = context(b"<a>\xFF\xFE\xC0\x80</a>", None);
    let mut replaced = 0;
    loop {
        let (c, len) = ctxt.current_char();
        if len == 0 {
            break;
        }
        if c == char::REPLACEMENT_CHARACTER {
            replaced += 1;
        }
        ctxt.advance_char(len);
    }
    assert_eq!(replaced, 4);
    assert_eq!(ctxt.nb_errors, 1);
    assert_eq!(LAST_ERROR.take(), Some(XmlParserErrors::XmlErrInvalidEncoding));
}

#[test]
fn nul_inside_content() {
    let mut ctxt = context(b"a\0b", None);
    ctxt.advance_char(1);
    assert_eq!(ctxt.current_char(), ('\0', 1));
    assert_eq!(LAST_ERROR.take(), Some(XmlParserErrors::XmlErrInvalidChar));
    ctxt.advance_char(1);
    assert_eq!(ctxt.current_char(), ('b', 1));
    ctxt.advance_char(1);
    assert_eq!(ctxt.current_char(), ('\0', 0));
}

/// A document encoded as UTF-16LE with an ISO-8859-1 encoding declaration,
/// read with the encoding set to UTF-16LE by the caller.
#[test]
fn user_encoding() {
    const TEXT_SIZE: usize = 100000; // Make sure to exceed internal buffer sizes.
    let doc = format!(
        "<?xml version='1.0' encoding='ISO-8859-1'?><d>{}</d>",
        "x".repeat(TEXT_SIZE)
    );
    let buf = doc
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect::<Vec<_>>();

    let mut ctxt = context(&buf, Some("UTF-16LE"));
    assert_eq!(ctxt.start_document(), 0);
    assert_eq!(ctxt.encoding(), Some("ISO-8859-1"));
    assert_eq!(ctxt.get_actual_encoding(), Some("UTF-16LE"));
    assert!(ctxt.content_bytes().starts_with(b"<d>"));
    ctxt.advance(3);

    for i in 0..TEXT_SIZE {
        let (c, len) = ctxt.current_char();
        assert_eq!((c, len), ('x', 1), "text has wrong content at offset {i}");
        ctxt.advance_char(len);
    }
    assert_eq!(ctxt.content_bytes(), b"</d>");
    assert_eq!(LAST_ERROR.take(), None);
}
