use chrono::{DateTime, Utc};

use crate::error::DecodeErrorKind;
use crate::field::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataEncoding {
    Utf8,
    Ascii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderField {
    MetadataEncoding,
    Extensions,
    ArchiveCreationDate,
}

impl HeaderField {
    const ALL: [HeaderField; 3] = [
        HeaderField::MetadataEncoding,
        HeaderField::Extensions,
        HeaderField::ArchiveCreationDate,
    ];

    pub(crate) fn key(self) -> &'static str {
        match self {
            HeaderField::MetadataEncoding => "Metadata Encoding",
            HeaderField::Extensions => "Extensions",
            HeaderField::ArchiveCreationDate => "Archive Creation Date",
        }
    }

    /// Looks up a key already passed through [`normalize`].
    pub(crate) fn from_key(key: &str) -> Option<HeaderField> {
        HeaderField::ALL
            .iter()
            .copied()
            .find(|field| normalize(field.key()) == key)
    }
}

/// Archive-wide metadata preceding the first entry. Every field is optional,
/// as is the header itself.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub encoding: Option<MetadataEncoding>,
    /// Whether an (empty) `Extensions` line was present.
    pub extensions: bool,
    /// The creation date exactly as written; it is not validated.
    pub created: Option<String>,
}

impl ArchiveHeader {
    /// The header the encoder writes for an archive created at `created`.
    pub fn new(created: DateTime<Utc>) -> ArchiveHeader {
        ArchiveHeader {
            encoding: Some(MetadataEncoding::Utf8),
            extensions: false,
            created: Some(created.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }

    pub(crate) fn set(&mut self, field: HeaderField, value: &str) -> Result<(), DecodeErrorKind> {
        match field {
            HeaderField::MetadataEncoding => {
                if self.encoding.is_some() {
                    return Err(DecodeErrorKind::Duplicate(field.key()));
                }
                self.encoding = Some(match normalize(value).as_str() {
                    "utf-8" | "utf8" => MetadataEncoding::Utf8,
                    "ascii" => MetadataEncoding::Ascii,
                    other => return Err(DecodeErrorKind::UnsupportedEncoding(other.to_string())),
                });
            }
            HeaderField::Extensions => {
                if self.extensions {
                    return Err(DecodeErrorKind::Duplicate(field.key()));
                }
                let extensions = normalize(value);
                if !extensions.is_empty() {
                    return Err(DecodeErrorKind::UnsupportedExtensions(extensions));
                }
                self.extensions = true;
            }
            HeaderField::ArchiveCreationDate => {
                if self.created.is_some() {
                    return Err(DecodeErrorKind::Duplicate(field.key()));
                }
                if value.is_empty() {
                    return Err(DecodeErrorKind::EmptyValue);
                }
                self.created = Some(value.to_string());
            }
        }

        tracing::debug!(key = field.key(), value, "archive metadata");
        Ok(())
    }

    /// The `(key, value)` lines this header is written as.
    pub(crate) fn lines(&self) -> Vec<(&'static str, &str)> {
        let mut lines = vec![];
        match self.encoding {
            Some(MetadataEncoding::Utf8) => lines.push((HeaderField::MetadataEncoding.key(), "utf-8")),
            Some(MetadataEncoding::Ascii) => lines.push((HeaderField::MetadataEncoding.key(), "ascii")),
            None => {}
        }
        if self.extensions {
            lines.push((HeaderField::Extensions.key(), ""));
        }
        if let Some(created) = &self.created {
            lines.push((HeaderField::ArchiveCreationDate.key(), created.as_str()));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encodings() {
        for value in &["utf-8", "UTF8", "Utf - 8", "ascii", "ASCII"] {
            let mut header = ArchiveHeader::default();
            header
                .set(HeaderField::MetadataEncoding, value)
                .unwrap_or_else(|e| panic!("{}: {}", value, e));
        }

        let mut header = ArchiveHeader::default();
        assert!(matches!(
            header.set(HeaderField::MetadataEncoding, "latin-1"),
            Err(DecodeErrorKind::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn extensions_must_be_empty() {
        let mut header = ArchiveHeader::default();
        header.set(HeaderField::Extensions, "").unwrap();
        assert!(header.extensions);

        let mut header = ArchiveHeader::default();
        assert!(matches!(
            header.set(HeaderField::Extensions, "sparse"),
            Err(DecodeErrorKind::UnsupportedExtensions(_))
        ));
    }

    #[test]
    fn creation_date_must_not_be_empty() {
        let mut header = ArchiveHeader::default();
        assert!(matches!(
            header.set(HeaderField::ArchiveCreationDate, ""),
            Err(DecodeErrorKind::EmptyValue)
        ));
        header
            .set(HeaderField::ArchiveCreationDate, "yesterday, probably")
            .unwrap();
        assert!(matches!(
            header.set(HeaderField::ArchiveCreationDate, "today"),
            Err(DecodeErrorKind::Duplicate("Archive Creation Date"))
        ));
    }

    #[test]
    fn header_keys() {
        assert_eq!(
            HeaderField::from_key("metadataencoding"),
            Some(HeaderField::MetadataEncoding)
        );
        assert_eq!(
            HeaderField::from_key("archivecreationdate"),
            Some(HeaderField::ArchiveCreationDate)
        );
        assert_eq!(HeaderField::from_key("path"), None);
    }

    #[test]
    fn new_header_lines() {
        let created = Utc.timestamp_opt(1367403072, 0).unwrap();
        let header = ArchiveHeader::new(created);
        assert_eq!(
            header.lines(),
            vec![
                ("Metadata Encoding", "utf-8"),
                ("Archive Creation Date", "2013-05-01T10:11:12Z"),
            ]
        );
    }
}
