//! Text/binary classification and line-oriented file access shared by
//! reads and searches.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use mime_guess::mime;

/// Extensions always treated as text, whatever MIME type they guess to.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "out", "err", "md", "rst", "csv", "tsv", "json", "jsonl", "ndjson", "xml",
    "yaml", "yml", "toml", "ini", "cfg", "conf", "properties", "env", "sh", "bash", "zsh", "py",
    "js", "ts", "html", "htm", "css", "sql", "diff", "patch", "rs", "go", "java", "c", "h", "cpp",
    "rb", "pl", "php",
];

/// Non-`text/*` MIME types whose content is still text.
const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-sh",
    "application/x-python",
];

/// How a file's content is handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentKind {
    Text,
    Binary { content_type: String },
}

/// Classifies a file by its name alone; the content is never inspected.
///
/// Names whose extension maps to no known MIME type (including names
/// without an extension, such as `dmesg`) count as text.
pub(crate) fn classify(path: &Path) -> ContentKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(ext) = extension.as_deref() {
        if TEXT_EXTENSIONS.contains(&ext) {
            return ContentKind::Text;
        }
    }

    match mime_guess::from_path(path).first() {
        None => ContentKind::Text,
        Some(guess)
            if guess.type_() == mime::TEXT
                || TEXT_APPLICATION_TYPES.contains(&guess.essence_str()) =>
        {
            ContentKind::Text
        }
        Some(guess) => ContentKind::Binary {
            content_type: guess.essence_str().to_string(),
        },
    }
}

/// Reads a file one line at a time into a reused buffer.
///
/// Lines end at `\n`; a trailing `\r` is dropped. A final newline does not
/// produce an extra empty line.
pub(crate) struct LineReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl LineReader {
    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
            buf: Vec::new(),
        })
    }

    /// Returns the next line without its terminator, or `None` at EOF.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }

        let mut line: &[u8] = &self.buf;
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_classify_text_files() {
        for name in [
            "app.log",
            "notes.txt",
            "data.json",
            "config.xml",
            "script.sh",
            "tool.py",
            "bundle.js",
            "README.MD",
            "messages",
            "var/log/dmesg",
        ] {
            assert_eq!(classify(Path::new(name)), ContentKind::Text, "{}", name);
        }
    }

    #[test]
    fn test_classify_binary_files() {
        match classify(Path::new("screenshot.png")) {
            ContentKind::Binary { content_type } => assert_eq!(content_type, "image/png"),
            other => panic!("expected binary, got {:?}", other),
        }
        assert!(matches!(
            classify(Path::new("archive.zip")),
            ContentKind::Binary { .. }
        ));
        assert!(matches!(
            classify(Path::new("report.pdf")),
            ContentKind::Binary { .. }
        ));
    }

    fn collect_lines(contents: &[u8]) -> Vec<String> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        let mut reader = LineReader::open(file.path()).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        lines
    }

    #[test]
    fn test_line_reader_splits_lines() {
        assert_eq!(collect_lines(b"a\nb\nc"), vec!["a", "b", "c"]);
        assert_eq!(collect_lines(b"a\r\nb\r\n"), vec!["a", "b"]);
        assert_eq!(collect_lines(b"a\n\nb\n"), vec!["a", "", "b"]);
        assert!(collect_lines(b"").is_empty());
    }

    #[test]
    fn test_line_reader_passes_invalid_utf8_through() {
        let lines = collect_lines(b"ok\n\xff\xfe bad\n");
        assert_eq!(lines[0], "ok");
        assert!(lines[1].contains('\u{FFFD}'));
        assert!(lines[1].ends_with(" bad"));
    }
}
