//! MIT-format annotation files.
//!
//! Each record is a little-endian 16-bit word: annotation type in the top
//! six bits, time delta in the low ten. Types 59..=63 are pseudo-annotations
//! that modify the stream instead of marking an event:
//!
//! | code | meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 59   | SKIP: next two words hold a 32-bit interval, high word first |
//! | 60   | NUM: annotation number, persists                           |
//! | 61   | SUB: subtype of the preceding annotation                   |
//! | 62   | CHN: channel, persists                                     |
//! | 63   | AUX: `len` bytes of text, padded to an even count          |
//!
//! SKIP applies to the next annotation; the other modifiers follow the
//! annotation they belong to. A zero word ends the file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::classify::AnnotationCode;
use crate::error::{HolterError, Result};
use crate::types::{AuxText, Beat};

pub const SKIP: u8 = 59;
pub const NUM: u8 = 60;
pub const SUB: u8 = 61;
pub const CHN: u8 = 62;
pub const AUX: u8 = 63;

pub(crate) const CODE_SHIFT: u16 = 10;
pub(crate) const DATA_MASK: u16 = 0x03ff;

/// One annotation as stored in the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawAnnotation {
    /// absolute sample position
    pub time: i64,
    pub anntyp: u8,
    pub subtyp: i8,
    pub chan: u8,
    pub num: i8,
    /// aux bytes with the length byte in front, as libwfdb exposes them
    pub aux: Option<Vec<u8>>,
}

impl RawAnnotation {
    pub fn new(time: i64, anntyp: u8) -> Self {
        RawAnnotation {
            time,
            anntyp,
            ..RawAnnotation::default()
        }
    }

    /// Sets the aux text, storing it length-prefixed.
    pub fn with_aux(mut self, text: &str) -> Self {
        let bytes = text.as_bytes();
        let len = bytes.len().min(u8::MAX as usize);
        let mut aux = Vec::with_capacity(len + 1);
        aux.push(len as u8);
        aux.extend_from_slice(&bytes[..len]);
        self.aux = Some(aux);
        self
    }

    pub fn code(&self) -> AnnotationCode {
        AnnotationCode::from_code(self.anntyp)
    }

    pub fn aux_text(&self) -> AuxText {
        self.aux
            .as_deref()
            .map(AuxText::from_length_prefixed)
            .unwrap_or_default()
    }

    pub fn to_beat(&self) -> Beat {
        Beat {
            position: self.time,
            code: self.code(),
            subtype: self.subtyp,
            text: self.aux_text(),
        }
    }
}

/// Streams [`RawAnnotation`]s out of an MIT-format byte source.
///
/// The reader never fails mid-stream: a truncated or unreadable tail ends
/// the iteration, and an annotation cut off inside its aux text is dropped.
pub struct AnnotationReader<R: Read> {
    inner: R,
    time: i64,
    chan: u8,
    num: i8,
    lookahead: Option<u16>,
    finished: bool,
}

impl AnnotationReader<BufReader<File>> {
    /// Opens an annotation file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| HolterError::AnnotationOpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(AnnotationReader::new(BufReader::new(file)))
    }
}

impl<R: Read> AnnotationReader<R> {
    pub fn new(inner: R) -> Self {
        AnnotationReader {
            inner,
            time: 0,
            chan: 0,
            num: 0,
            lookahead: None,
            finished: false,
        }
    }

    fn read_word(&mut self) -> Option<u16> {
        let mut buf = [0u8; 2];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => Some(u16::from_le_bytes(buf)),
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    log::warn!("annotation stream read failed: {}", e);
                } else {
                    log::debug!("annotation stream ended without terminator");
                }
                None
            }
        }
    }

    fn next_word(&mut self) -> Option<u16> {
        self.lookahead.take().or_else(|| self.read_word())
    }

    fn read_skip(&mut self) -> Option<i64> {
        let high = self.read_word()? as u32;
        let low = self.read_word()? as u32;
        Some(((high << 16) | low) as i32 as i64)
    }

    /// Reads `len` aux bytes plus padding and returns them length-prefixed.
    fn read_aux(&mut self, len: usize) -> Option<Vec<u8>> {
        let padded = len + (len & 1);
        let mut bytes = vec![0u8; padded];
        if let Err(e) = self.inner.read_exact(&mut bytes) {
            log::warn!("annotation aux text truncated ({} bytes expected): {}", len, e);
            return None;
        }
        bytes.truncate(len);
        let mut aux = Vec::with_capacity(len + 1);
        aux.push(len.min(u8::MAX as usize) as u8);
        aux.extend_from_slice(&bytes);
        Some(aux)
    }

    fn finish(&mut self) -> Option<RawAnnotation> {
        self.finished = true;
        None
    }
}

impl<R: Read> Iterator for AnnotationReader<R> {
    type Item = RawAnnotation;

    fn next(&mut self) -> Option<RawAnnotation> {
        if self.finished {
            return None;
        }

        let mut ann = loop {
            let word = match self.next_word() {
                Some(0) | None => return self.finish(),
                Some(w) => w,
            };
            let code = (word >> CODE_SHIFT) as u8;
            let data = word & DATA_MASK;
            match code {
                SKIP => match self.read_skip() {
                    Some(interval) => self.time += interval,
                    None => return self.finish(),
                },
                NUM => self.num = data as u8 as i8,
                CHN => self.chan = data as u8,
                SUB => log::debug!("subtype modifier before any annotation ignored"),
                AUX => {
                    if self.read_aux(data as usize).is_none() {
                        return self.finish();
                    }
                    log::debug!("aux modifier before any annotation ignored");
                }
                _ => {
                    self.time += data as i64;
                    break RawAnnotation {
                        time: self.time,
                        anntyp: code,
                        subtyp: 0,
                        chan: self.chan,
                        num: self.num,
                        aux: None,
                    };
                }
            }
        };

        loop {
            let word = match self.read_word() {
                Some(w) => w,
                None => {
                    self.finished = true;
                    break;
                }
            };
            let code = (word >> CODE_SHIFT) as u8;
            let data = word & DATA_MASK;
            match code {
                SUB => ann.subtyp = data as u8 as i8,
                CHN => {
                    self.chan = data as u8;
                    ann.chan = self.chan;
                }
                NUM => {
                    self.num = data as u8 as i8;
                    ann.num = self.num;
                }
                AUX => match self.read_aux(data as usize) {
                    Some(aux) => ann.aux = Some(aux),
                    None => {
                        log::warn!("dropping annotation at {}: aux text cut off", ann.time);
                        return self.finish();
                    }
                },
                _ => {
                    self.lookahead = Some(word);
                    break;
                }
            }
        }

        Some(ann)
    }
}

/// Reads every annotation of a file.
pub fn read_annotations<P: AsRef<Path>>(path: P) -> Result<Vec<RawAnnotation>> {
    Ok(AnnotationReader::open(path)?.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(code: u8, data: u16) -> [u8; 2] {
        (((code as u16) << CODE_SHIFT) | data).to_le_bytes()
    }

    fn stream(words: &[[u8; 2]]) -> Vec<u8> {
        words.iter().flatten().copied().collect()
    }

    #[test]
    fn test_simple_stream() {
        let bytes = stream(&[word(1, 5), word(5, 10), [0, 0]]);
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].time, 5);
        assert_eq!(anns[0].code(), AnnotationCode::Normal);
        assert_eq!(anns[1].time, 15);
        assert_eq!(anns[1].code(), AnnotationCode::Pvc);
    }

    #[test]
    fn test_skip_applies_to_next() {
        let mut bytes = stream(&[word(1, 5), word(SKIP, 0)]);
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&5000u16.to_le_bytes());
        bytes.extend(stream(&[word(1, 3), [0, 0]]));
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].time, 5);
        assert_eq!(anns[1].time, 5008);
    }

    #[test]
    fn test_large_skip() {
        let mut bytes = stream(&[word(SKIP, 0)]);
        bytes.extend_from_slice(&0x0001u16.to_le_bytes());
        bytes.extend_from_slice(&0x0002u16.to_le_bytes());
        bytes.extend(stream(&[word(1, 0)]));
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns[0].time, 0x0001_0002);
    }

    #[test]
    fn test_modifiers() {
        let mut bytes = stream(&[word(14, 100), word(SUB, 1), word(CHN, 2), word(AUX, 3)]);
        bytes.extend_from_slice(b"AF\0\0");
        bytes.extend(stream(&[word(1, 10), [0, 0]]));
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].subtyp, 1);
        assert_eq!(anns[0].chan, 2);
        assert_eq!(anns[0].aux.as_deref(), Some(&[3u8, b'A', b'F', 0][..]));
        assert_eq!(anns[0].aux_text().as_str(), "AF");
        // channel persists, subtype and aux do not
        assert_eq!(anns[1].time, 110);
        assert_eq!(anns[1].chan, 2);
        assert_eq!(anns[1].subtyp, 0);
        assert!(anns[1].aux.is_none());
    }

    #[test]
    fn test_truncated_aux_drops_annotation() {
        let mut bytes = stream(&[word(1, 5), word(28, 5), word(AUX, 10)]);
        bytes.extend_from_slice(b"(N");
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].time, 5);
    }

    #[test]
    fn test_truncated_stream() {
        let mut bytes = stream(&[word(1, 5), word(1, 7)]);
        bytes.push(0x12);
        let anns: Vec<_> = AnnotationReader::new(bytes.as_slice()).collect();
        assert_eq!(anns.len(), 2);
        assert!(AnnotationReader::new(&[][..]).next().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let err = read_annotations("/definitely/not/here.atr").unwrap_err();
        assert!(matches!(err, HolterError::AnnotationOpenFailed { .. }));
        assert!(err.is_recoverable());
    }
}
