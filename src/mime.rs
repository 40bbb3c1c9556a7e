//! Media type sniffing.
//!
//! Classification only needs a handful of answers: which archive container a
//! file is, and whether a plain file looks like XML, HTML or other text.
//! Binary signatures are checked first, then the leading text.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

pub const APPLICATION_ZIP: &str = "application/zip";
pub const APPLICATION_GZIP: &str = "application/gzip";
pub const APPLICATION_BZIP2: &str = "application/x-bzip2";
pub const APPLICATION_XZ: &str = "application/x-xz";
pub const APPLICATION_TAR: &str = "application/x-tar";
pub const APPLICATION_7Z: &str = "application/x-7z-compressed";
pub const APPLICATION_XML: &str = "application/xml";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";
pub const INODE_EMPTY: &str = "inode/x-empty";

const SNIFF_LEN: usize = 8192;
const TAR_MAGIC_OFFSET: usize = 257;

/// Maps a file on disk to a media type string
pub trait MimeSniffer {
    fn sniff(&self, path: &Path) -> Result<String>;
}

/// Signature and content based sniffer
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

impl MimeSniffer for MagicSniffer {
    fn sniff(&self, path: &Path) -> Result<String> {
        let head = read_head(path)?;
        Ok(detect(&head).to_string())
    }
}

fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Detect media type from the first bytes of a file
pub fn detect(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return INODE_EMPTY;
    }
    if let Some(mime) = detect_by_magic(head) {
        return mime;
    }
    detect_text(head)
}

fn detect_by_magic(head: &[u8]) -> Option<&'static str> {
    match head {
        // ZIP: local file header, empty archive, spanned archive
        [0x50, 0x4B, 0x03, 0x04, ..]
        | [0x50, 0x4B, 0x05, 0x06, ..]
        | [0x50, 0x4B, 0x07, 0x08, ..] => return Some(APPLICATION_ZIP),
        [0x1F, 0x8B, ..] => return Some(APPLICATION_GZIP),
        [b'B', b'Z', b'h', ..] => return Some(APPLICATION_BZIP2),
        [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => return Some(APPLICATION_XZ),
        [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, ..] => return Some(APPLICATION_7Z),
        _ => {}
    }

    // POSIX and GNU tar both carry "ustar" at offset 257
    if head.len() >= TAR_MAGIC_OFFSET + 5
        && &head[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return Some(APPLICATION_TAR);
    }

    None
}

fn detect_text(head: &[u8]) -> &'static str {
    if head.contains(&0) {
        return APPLICATION_OCTET_STREAM;
    }
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // The sniff window can cut a multi-byte character in half
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return APPLICATION_OCTET_STREAM,
    };

    let lead = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(32)
        .collect::<String>()
        .to_lowercase();

    if lead.starts_with("<?xml") || lead.starts_with("<kml") {
        APPLICATION_XML
    } else if lead.starts_with("<!doctype html") || lead.starts_with("<html") {
        TEXT_HTML
    } else {
        TEXT_PLAIN
    }
}
