//! I/O utilities for decoding delimited text and writing output artifacts.
//!
//! All delimited-text input flows through this module:
//!
//! - **Encoding detection**: the first [`ENCODING_SAMPLE_BYTES`] of a file are
//!   sampled (BOM, strict UTF-8, then `chardetng`) and the result is accepted
//!   only above the configured confidence threshold.
//! - **Decoding**: the whole file is decoded once through `encoding_rs_io`
//!   so that every separator attempt parses the same text.
//! - **Reader construction**: flexible `csv` readers over decoded text for
//!   each candidate separator.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::debug;

pub const ENCODING_SAMPLE_BYTES: usize = 10 * 1024;

/// Separators tried in order when parsing delimited text.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Outcome of sampling a file's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingGuess {
    pub encoding: &'static Encoding,
    pub confidence: f64,
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Guesses the encoding of a byte sample with a confidence in `[0, 1]`.
pub fn detect_encoding(sample: &[u8]) -> EncodingGuess {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return EncodingGuess {
            encoding,
            confidence: 1.0,
        };
    }
    if is_utf8_prefix(sample) {
        return EncodingGuess {
            encoding: UTF_8,
            confidence: 0.99,
        };
    }
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    let (encoding, high_confidence) = detector.guess_assess(None, true);
    EncodingGuess {
        encoding,
        confidence: if high_confidence { 0.9 } else { 0.5 },
    }
}

/// Picks the encoding for a file: the detected one when its confidence clears
/// `threshold`, the configured fallback otherwise.
pub fn choose_encoding(
    sample: &[u8],
    threshold: f64,
    fallback: &'static Encoding,
) -> &'static Encoding {
    let guess = detect_encoding(sample);
    if guess.confidence >= threshold {
        debug!(
            "Detected encoding {} (confidence {:.2})",
            guess.encoding.name(),
            guess.confidence
        );
        guess.encoding
    } else {
        debug!(
            "Encoding guess {} below threshold ({:.2} < {:.2}); using {}",
            guess.encoding.name(),
            guess.confidence,
            threshold,
            fallback.name()
        );
        fallback
    }
}

/// Reads and decodes an entire text file.
pub fn read_decoded(path: &Path, threshold: f64, fallback: &'static Encoding) -> Result<String> {
    let mut sample = Vec::with_capacity(ENCODING_SAMPLE_BYTES);
    File::open(path)
        .with_context(|| format!("Opening input file {path:?}"))?
        .take(ENCODING_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)
        .with_context(|| format!("Sampling input file {path:?}"))?;
    let encoding = choose_encoding(&sample, threshold, fallback);

    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(BufReader::new(file));
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .with_context(|| format!("Decoding {path:?} as {}", encoding.name()))?;
    Ok(text)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_text_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    Ok(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ))
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    let mut writer = open_text_writer(path)?;
    writer
        .write_all(contents.as_bytes())
        .with_context(|| format!("Writing {path:?}"))?;
    writer.flush().with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

fn is_utf8_prefix(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A sample cut mid-sequence is still UTF-8.
        Err(err) => err.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{GBK, UTF_16LE};

    #[test]
    fn bom_wins_with_full_confidence() {
        let guess = detect_encoding(b"\xFF\xFEa\x00");
        assert_eq!(guess.encoding, UTF_16LE);
        assert_eq!(guess.confidence, 1.0);
    }

    #[test]
    fn truncated_utf8_sample_is_still_utf8() {
        let text = "名称,值".as_bytes();
        let guess = detect_encoding(&text[..text.len() - 1]);
        assert_eq!(guess.encoding, UTF_8);
    }

    #[test]
    fn low_threshold_accepts_detector_guess() {
        let (bytes, _, _) = GBK.encode("编号,姓名,地址\n1,张三,北京市海淀区\n2,李四,上海市浦东新区\n");
        let chosen = choose_encoding(&bytes, 0.0, UTF_8);
        assert_ne!(chosen, UTF_8);
        let fallback = choose_encoding(&bytes, 1.0, UTF_8);
        assert_eq!(fallback, UTF_8);
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert!(resolve_encoding(Some("klingon")).is_err());
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
    }
}
