//! Parses uploaded `.txt`/`.md`/`.pdf` files to plain text. All processing
//! is in-memory; nothing is written to disk.
//!
//! Ported from `original_source/server/file_parser.py`.

use crate::error::{Result, RlmError};

/// Parse `filename`'s `content` to plain text, returning `(text, type_tag)`.
pub fn parse_file(filename: &str, content: &[u8]) -> Result<(String, String)> {
    let ext = filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename)
        .map(|ext| ext.to_lowercase())
        .ok_or_else(|| {
            RlmError::FileParse(format!(
                "File has no extension: {filename}. Supported extensions: .txt, .md, .pdf"
            ))
        })?;

    match ext.as_str() {
        "txt" | "md" => {
            let text = String::from_utf8_lossy(content).into_owned();
            Ok((text, ext))
        }
        "pdf" => {
            let text = pdf_extract::extract_text_from_mem(content)
                .map_err(|e| RlmError::FileParse(format!("failed to parse PDF: {e}")))?;
            Ok((text, ext))
        }
        other => Err(RlmError::FileParse(format!(
            "Unsupported file type: .{other}. Supported: .txt, .md, .pdf"
        ))),
    }
}

/// Extensions `parse_file` accepts.
pub fn supported_extensions() -> &'static [&'static str] {
    &["txt", "md", "pdf"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_txt() {
        let (text, ext) = parse_file("notes.txt", b"hello world").unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(ext, "txt");
    }

    #[test]
    fn parses_md() {
        let (text, ext) = parse_file("notes.md", b"# title").unwrap();
        assert_eq!(text, "# title");
        assert_eq!(ext, "md");
    }

    #[test]
    fn rejects_missing_extension() {
        let err = parse_file("noext", b"data").unwrap_err();
        assert!(matches!(err, RlmError::FileParse(_)));
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_file("archive.zip", b"data").unwrap_err();
        assert!(matches!(err, RlmError::FileParse(_)));
    }

    #[test]
    fn lossily_decodes_invalid_utf8() {
        let (text, _) = parse_file("bad.txt", &[0xff, 0xfe, b'h', b'i']).unwrap();
        assert!(text.ends_with("hi"));
    }
}
