//! The outer PAR2 parser: turns a byte stream into grouped `Set` records
//! (spec.md §4.1), resynchronizing past damaged packets instead of giving up
//! on the whole file.
//!
//! A packet-level problem falls into one of three buckets:
//!
//! - **benign skip** — an unrecognised packet type, or a Unicode packet that
//!   fails its own validation. The declared length was consumed exactly as
//!   written, so the stream stays aligned and parsing resumes at the next
//!   header with no rewind.
//! - **soft failure** — a corrupt header, a checksum mismatch, or a
//!   malformed main/file-description body. The declared length field itself
//!   may be the corrupt part, so alignment can't be trusted; the parser
//!   rewinds to one byte past where this packet started and scans forward
//!   for the next magic.
//! - **fatal** — the set grouper's caps are exceeded, or two non-equal main
//!   packets claim the same set ID. The stream is readable but the data
//!   model it describes is not; parsing stops and the error propagates.

pub mod grouper;

use std::io::{self, Read, Seek, SeekFrom};

use crate::checksum::packet_md5;
use crate::packets::{
    FileDescriptionPacket, Header, MainPacket, Packet, UnicodePacket, HEADER_SIZE, MAGIC_BYTES,
    TYPE_FILE_DESC, TYPE_MAIN, TYPE_UNICODE,
};
use crate::set::ParsedFile;
use grouper::{GroupError, SetGrouper};

/// Size of each forward scan window while resynchronizing (spec.md §4.1).
const RESYNC_WINDOW: usize = 16 * 1024;

/// A reader that stalls (returns `Ok(0)` with no error) this many times in a
/// row without making progress is given up on.
const MAX_STALLS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("i/o error while parsing: {0}")]
    Io(#[from] io::Error),
    #[error("fatal: {0}")]
    Fatal(#[from] GroupError),
}

/// Parse one PAR2 file from a seekable reader, grouping its packets into
/// `Set`s. Per-packet corruption is recovered from by resynchronizing on the
/// next packet magic; only grouper-level cap/conflict violations or I/O
/// errors abort the whole parse.
pub fn parse<R: Read + Seek>(reader: &mut R, verify_checksums: bool) -> Result<ParsedFile, ParseError> {
    let mut grouper = SetGrouper::new();

    loop {
        let pre_packet_pos = reader.stream_position()?;

        let mut header_buf = [0u8; HEADER_SIZE];
        let n = read_with_stall_tolerance(reader, &mut header_buf)?;
        if n == 0 {
            break; // clean EOF: no partial packet pending.
        }
        if n < HEADER_SIZE {
            if resync(reader, pre_packet_pos)?.is_eof() {
                break;
            }
            continue;
        }

        let header = match Header::parse(&header_buf) {
            Some(h) => h,
            None => {
                if resync(reader, pre_packet_pos)?.is_eof() {
                    break;
                }
                continue;
            }
        };
        let body_len = match header.body_len() {
            Some(b) => b,
            None => {
                if resync(reader, pre_packet_pos)?.is_eof() {
                    break;
                }
                continue;
            }
        };

        if header.packet_type != *TYPE_MAIN
            && header.packet_type != *TYPE_FILE_DESC
            && header.packet_type != *TYPE_UNICODE
        {
            // Benign skip: seek past the body without reading it.
            reader.seek(SeekFrom::Current(body_len as i64))?;
            continue;
        }

        let mut body = vec![0u8; body_len as usize];
        let read_n = read_with_stall_tolerance(reader, &mut body)?;
        if (read_n as u64) < body_len {
            if resync(reader, pre_packet_pos)?.is_eof() {
                break;
            }
            continue;
        }

        if verify_checksums {
            let computed = packet_md5(&header.set_id, &header.packet_type, &body);
            if computed != header.hash {
                log::warn!(
                    "packet checksum mismatch at offset {pre_packet_pos}, resynchronizing"
                );
                if resync(reader, pre_packet_pos)?.is_eof() {
                    break;
                }
                continue;
            }
        }

        let set_id = header.set_id.into();
        let decoded = if header.packet_type == *TYPE_MAIN {
            MainPacket::decode(set_id, &body).map(Packet::Main).ok()
        } else if header.packet_type == *TYPE_FILE_DESC {
            FileDescriptionPacket::decode(set_id, &body)
                .map(Packet::FileDescription)
                .ok()
        } else {
            match UnicodePacket::decode(set_id, &body) {
                Ok(u) => Some(Packet::Unicode(u)),
                Err(_) => {
                    // Benign skip: already consumed exactly this packet's bytes.
                    continue;
                }
            }
        };

        match decoded {
            Some(packet) => grouper.insert(packet)?,
            None => {
                log::warn!(
                    "malformed packet body at offset {pre_packet_pos}, resynchronizing"
                );
                if resync(reader, pre_packet_pos)?.is_eof() {
                    break;
                }
            }
        }
    }

    Ok(grouper.finalize())
}

enum ResyncOutcome {
    Found,
    Eof,
}

impl ResyncOutcome {
    fn is_eof(&self) -> bool {
        matches!(self, ResyncOutcome::Eof)
    }
}

/// Rewind to one byte past `pre_packet_pos` and scan forward for the next
/// packet magic, in bounded windows so a pathological stream can't force an
/// unbounded read. Leaves the reader positioned at the start of the found
/// magic, or at EOF if none was found.
fn resync<R: Read + Seek>(reader: &mut R, pre_packet_pos: u64) -> io::Result<ResyncOutcome> {
    reader.seek(SeekFrom::Start(pre_packet_pos + 1))?;
    let mut window = vec![0u8; RESYNC_WINDOW];

    loop {
        let window_start = reader.stream_position()?;
        let n = read_with_stall_tolerance(reader, &mut window)?;
        if n == 0 {
            return Ok(ResyncOutcome::Eof);
        }
        if let Some(offset) = find_magic(&window[..n]) {
            reader.seek(SeekFrom::Start(window_start + offset as u64))?;
            return Ok(ResyncOutcome::Found);
        }
        if n < window.len() {
            // Hit true EOF partway through this window; nothing left to scan.
            return Ok(ResyncOutcome::Eof);
        }
        // Full window, no match: back up so a magic straddling the boundary
        // isn't missed by the next window.
        let back_up = (MAGIC_BYTES.len() - 1) as u64;
        reader.seek(SeekFrom::Start(window_start + n as u64 - back_up))?;
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MAGIC_BYTES.len())
        .position(|w| w == MAGIC_BYTES)
}

/// Fill `buf` from `reader`, tolerating readers that transiently return
/// `Ok(0)` with no error. Returns the number of bytes actually filled, which
/// is less than `buf.len()` when the stream has genuinely ended at its true
/// length. If a reader keeps returning `Ok(0)` for `MAX_STALLS` reads in a
/// row while the stream's actual position is short of its actual end, that's
/// not EOF, it's a stalled/misbehaving reader (spec.md §4.1), and this
/// returns `io::ErrorKind::UnexpectedEof` instead of a silent short read.
fn read_with_stall_tolerance<R: Read + Seek>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    let mut stalls = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => {
                stalls += 1;
                if stalls >= MAX_STALLS {
                    if at_true_eof(reader)? {
                        break;
                    }
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "reader stalled with no progress before reaching the end of the stream",
                    ));
                }
            }
            Ok(n) => {
                total += n;
                stalls = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Whether `reader`'s current position is at or past the stream's actual end.
fn at_true_eof<R: Seek>(reader: &mut R) -> io::Result<bool> {
    let current = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(current))?;
    Ok(current >= end)
}
