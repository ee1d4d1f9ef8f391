//! Helpers shared by the Office Open XML extractors (docx, xlsx).

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::SharePointError;

pub(crate) type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

pub(crate) fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, SharePointError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SharePointError::Extraction(format!("not a valid OOXML package: {}", e)))
}

/// Read an archive member as UTF-8; `None` when the member is absent.
pub(crate) fn read_entry(
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<Option<String>, SharePointError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(SharePointError::Extraction(format!(
                "failed to open {}: {}",
                name, e
            )))
        }
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| SharePointError::Extraction(format!("failed to read {}: {}", name, e)))?;
    Ok(Some(content))
}

/// Element name without its namespace prefix.
pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Attribute value by local name.
pub(crate) fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| {
            std::str::from_utf8(&a.value)
                .ok()
                .and_then(|v| quick_xml::escape::unescape(v).ok())
                .map(|v| v.into_owned())
                .ok_or(())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
        })
}

pub(crate) fn xml_error(part: &str, err: quick_xml::Error) -> SharePointError {
    SharePointError::Extraction(format!("malformed {}: {}", part, err))
}

/// Core document properties from `docProps/core.xml`, keyed by friendly names.
pub(crate) fn core_properties(
    archive: &mut Archive<'_>,
) -> Result<BTreeMap<String, String>, SharePointError> {
    let mut props = BTreeMap::new();
    let Some(xml) = read_entry(archive, "docProps/core.xml")? else {
        return Ok(props);
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                current = match local_name(e).as_str() {
                    "title" => Some("title"),
                    "subject" => Some("subject"),
                    "creator" => Some("author"),
                    "keywords" => Some("keywords"),
                    "description" => Some("description"),
                    "lastModifiedBy" => Some("last_modified_by"),
                    "created" => Some("created"),
                    "modified" => Some("last_modified"),
                    "category" => Some("category"),
                    _ => None,
                };
            }
            Ok(Event::Text(ref e)) => {
                if let Some(key) = current {
                    let text = e.unescape().map_err(|e| xml_error("core.xml", e))?;
                    if !text.trim().is_empty() {
                        props.insert(key.to_string(), text.trim().to_string());
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("core.xml", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(props)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn reads_core_properties() {
        let bytes = zip_bytes(&[("docProps/core.xml", CORE_XML)]);
        let mut archive = open_archive(&bytes).unwrap();
        let props = core_properties(&mut archive).unwrap();
        assert_eq!(props["title"], "Quarterly Report");
        assert_eq!(props["author"], "Jordan Lee");
        assert_eq!(props["last_modified_by"], "Sam Rivera");
        assert_eq!(props["created"], "2024-01-02T03:04:05Z");
        assert_eq!(props["category"], "Finance");
    }

    #[test]
    fn missing_core_properties_is_empty() {
        let bytes = zip_bytes(&[("word/document.xml", "<w:document/>")]);
        let mut archive = open_archive(&bytes).unwrap();
        assert!(core_properties(&mut archive).unwrap().is_empty());
        assert!(read_entry(&mut archive, "nope.xml").unwrap().is_none());
    }

    #[test]
    fn garbage_is_not_a_package() {
        assert!(matches!(
            open_archive(b"definitely not a zip"),
            Err(SharePointError::Extraction(_))
        ));
    }
}
