use crate::error::ConversionError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::path::Path;

// METS page order - the `export` file group lists the ALTO files of a book
// in reading order. Only the final path component of each href is kept;
// files are looked up next to the pages being converted.

const EXPORT_GROUP: &str = "export";

pub fn read_page_order(path: &Path) -> Result<Vec<String>, ConversionError> {
    let xml = fs::read_to_string(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_page_order(&xml)
}

pub fn parse_page_order(xml: &str) -> Result<Vec<String>, ConversionError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut group_depth: Option<usize> = None;
    let mut depth = 0usize;
    let mut found_group = false;
    let mut files = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if group_depth.is_none() && e.local_name().as_ref() == b"fileGrp" && is_export_group(&e)? {
                    group_depth = Some(depth);
                    found_group = true;
                }
                if group_depth.is_some() && e.local_name().as_ref() == b"FLocat" {
                    collect_href(&e, &mut files)?;
                }
            }
            Event::Empty(e) => {
                if group_depth.is_some() && e.local_name().as_ref() == b"FLocat" {
                    collect_href(&e, &mut files)?;
                }
            }
            Event::End(_) => {
                if group_depth == Some(depth) {
                    group_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found_group {
        return Err(ConversionError::MetsNoExportGroup);
    }
    if files.is_empty() {
        return Err(ConversionError::MetsEmpty);
    }
    log::debug!("📚 METS export group lists {} pages", files.len());
    Ok(files)
}

fn is_export_group(e: &quick_xml::events::BytesStart<'_>) -> Result<bool, ConversionError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"USE" {
            return Ok(attr.unescape_value()?.eq_ignore_ascii_case(EXPORT_GROUP));
        }
    }
    Ok(false)
}

fn collect_href(e: &quick_xml::events::BytesStart<'_>, files: &mut Vec<String>) -> Result<(), ConversionError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"href" {
            continue;
        }
        let href = attr.unescape_value()?;
        if !href.to_ascii_lowercase().ends_with(".xml") {
            continue;
        }
        if let Some(name) = href.rsplit(|c: char| c == '/' || c == '\\').next().filter(|n| !n.is_empty()) {
            files.push(name.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const METS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
  <mets:fileSec>
    <mets:fileGrp USE="image">
      <mets:file ID="img1"><mets:FLocat LOCTYPE="URL" xlink:href="images/p1.jpg"/></mets:file>
    </mets:fileGrp>
    <mets:fileGrp USE="export">
      <mets:file ID="f2"><mets:FLocat LOCTYPE="URL" xlink:href="pages/page_b.xml"/></mets:file>
      <mets:file ID="f1"><mets:FLocat LOCTYPE="URL" xlink:href="page_a.xml"/></mets:file>
      <mets:file ID="f3"><mets:FLocat LOCTYPE="URL" xlink:href="thumb.png"/></mets:file>
    </mets:fileGrp>
  </mets:fileSec>
</mets:mets>"#;

    #[test]
    fn reads_export_group_in_document_order() {
        assert_eq!(
            parse_page_order(METS).unwrap(),
            vec!["page_b.xml".to_string(), "page_a.xml".to_string()]
        );
    }

    #[test]
    fn missing_export_group_is_an_error() {
        let xml = r#"<mets><fileSec><fileGrp USE="image"><file><FLocat href="a.xml"/></file></fileGrp></fileSec></mets>"#;
        assert!(matches!(parse_page_order(xml), Err(ConversionError::MetsNoExportGroup)));
    }

    #[test]
    fn empty_export_group_is_an_error() {
        let xml = r#"<mets><fileSec><fileGrp USE="EXPORT"><file><FLocat href="a.png"/></file></fileGrp></fileSec></mets>"#;
        assert!(matches!(parse_page_order(xml), Err(ConversionError::MetsEmpty)));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("METS.xml");
        fs::write(&path, METS).unwrap();
        assert_eq!(read_page_order(&path).unwrap().len(), 2);
        assert!(matches!(
            read_page_order(&dir.path().join("missing.xml")),
            Err(ConversionError::Io { .. })
        ));
    }
}
