//! Placeholder substitution inside Word (`.docx`) packages.
//!
//! Word often splits a typed `{{name}}` over several runs (spell-check,
//! formatting changes). Each paragraph is buffered, its `w:t` texts are
//! joined and substituted as one string, and the result is written into the
//! paragraph's first text node while the remaining nodes are emptied. Run
//! formatting of the first node wins for the replaced paragraph.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{DocumentRenderer, RenderError, RenderOutcome, Substitutions};
use crate::templates::TemplateFileType;

const DOCUMENT_PART: &str = "word/document.xml";

pub struct DocxRenderer;

impl DocxRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer for DocxRenderer {
    fn supports(&self, file_type: TemplateFileType) -> bool {
        file_type == TemplateFileType::Docx
    }

    fn render(&self, template: &[u8], substitutions: &Substitutions) -> RenderOutcome {
        match substitute_package(template, substitutions) {
            Ok((bytes, fields_replaced)) => RenderOutcome::Substituted {
                bytes,
                fields_replaced,
            },
            Err(e) => {
                log::warn!("DOCX substitution failed, copying template: {}", e);
                RenderOutcome::fallback(template)
            }
        }
    }
}

fn package_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Package(e.to_string())
}

fn xml_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Xml(e.to_string())
}

/// Body, headers and footers carry user-visible text.
fn is_substitutable_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

fn substitute_package(
    template: &[u8],
    substitutions: &Substitutions,
) -> Result<(Vec<u8>, usize), RenderError> {
    let mut archive = ZipArchive::new(Cursor::new(template)).map_err(package_error)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(template.len())));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut hits = BTreeSet::new();
    let mut found_document = false;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(package_error)?;
        let name = entry.name().to_string();

        if entry.is_dir() {
            drop(entry);
            writer.add_directory(name, options).map_err(package_error)?;
            continue;
        }

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).map_err(package_error)?;
        drop(entry);

        if is_substitutable_part(&name) {
            found_document |= name == DOCUMENT_PART;
            let xml = String::from_utf8(contents).map_err(|_| RenderError::Encoding)?;
            contents = substitute_part(&xml, substitutions, &mut hits)?;
        }

        writer.start_file(name, options).map_err(package_error)?;
        writer.write_all(&contents).map_err(package_error)?;
    }

    if !found_document {
        return Err(RenderError::Package(format!("{} not found", DOCUMENT_PART)));
    }

    let cursor = writer.finish().map_err(package_error)?;
    Ok((cursor.into_inner(), hits.len()))
}

enum Kind {
    ParagraphStart,
    ParagraphEnd,
    TextStart,
    TextEnd,
    Text(String),
    /// Entity reference; `None` when it is not a predefined or character
    /// reference and has to stay in place.
    Ref(Option<String>),
    Other,
}

fn classify(event: &Event<'_>) -> Result<Kind, RenderError> {
    Ok(match event {
        Event::Start(e) => match e.local_name().as_ref() {
            b"p" => Kind::ParagraphStart,
            b"t" => Kind::TextStart,
            _ => Kind::Other,
        },
        Event::End(e) => match e.local_name().as_ref() {
            b"p" => Kind::ParagraphEnd,
            b"t" => Kind::TextEnd,
            _ => Kind::Other,
        },
        Event::Text(e) => Kind::Text(e.decode().map_err(xml_error)?.into_owned()),
        Event::GeneralRef(e) => Kind::Ref(resolve_reference(e)?),
        _ => Kind::Other,
    })
}

fn resolve_reference(reference: &BytesRef<'_>) -> Result<Option<String>, RenderError> {
    if let Some(ch) = reference.resolve_char_ref().map_err(xml_error)? {
        return Ok(Some(ch.to_string()));
    }
    let name = reference.decode().map_err(xml_error)?;
    Ok(resolve_predefined_entity(&name).map(str::to_string))
}

/// Decoded content of one `w:t` element. Entity references split it into
/// several events; `events` holds the index of each piece.
struct TextNode {
    /// Index of the enclosing `w:t` start event.
    start: Option<usize>,
    events: Vec<usize>,
    text: String,
}

impl TextNode {
    /// Puts `content` into the first piece and empties the rest.
    fn rewrite(&self, events: &mut [Event<'static>], content: &str) {
        for (n, &idx) in self.events.iter().enumerate() {
            let piece = if n == 0 { content } else { "" };
            events[idx] = Event::Text(BytesText::new(piece).into_owned());
        }
    }
}

#[derive(Default)]
struct ParagraphBuffer {
    events: Vec<Event<'static>>,
    texts: Vec<TextNode>,
    /// Set when a text node holds something other than plain text (custom
    /// entities, nested markup). Such paragraphs are substituted node by
    /// node to keep that content in place.
    complex: bool,
    nested: bool,
}

fn substitute_part(
    xml: &str,
    substitutions: &Substitutions,
    hits: &mut BTreeSet<usize>,
) -> Result<Vec<u8>, RenderError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut paragraph: Option<ParagraphBuffer> = None;
    let mut depth = 0usize;
    let mut in_text = false;
    let mut current_start: Option<usize> = None;
    let mut current_node: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(xml_error)?;
        if matches!(event, Event::Eof) {
            break;
        }
        let kind = classify(&event)?;
        let event = event.into_owned();

        match paragraph.as_mut() {
            Some(buffer) => {
                match kind {
                    Kind::ParagraphStart => {
                        depth += 1;
                        buffer.nested = true;
                    }
                    Kind::ParagraphEnd => depth = depth.saturating_sub(1),
                    Kind::TextStart => {
                        in_text = true;
                        current_start = Some(buffer.events.len());
                        current_node = None;
                    }
                    Kind::TextEnd => {
                        in_text = false;
                        current_start = None;
                        current_node = None;
                    }
                    Kind::Text(text) | Kind::Ref(Some(text)) if in_text => {
                        let idx = buffer.events.len();
                        match current_node {
                            Some(n) => {
                                let node = &mut buffer.texts[n];
                                node.events.push(idx);
                                node.text.push_str(&text);
                            }
                            None => {
                                current_node = Some(buffer.texts.len());
                                buffer.texts.push(TextNode {
                                    start: current_start,
                                    events: vec![idx],
                                    text,
                                });
                            }
                        }
                    }
                    Kind::Text(_) | Kind::Ref(_) | Kind::Other => {
                        if in_text {
                            buffer.complex = true;
                            current_node = None;
                        }
                    }
                }
                buffer.events.push(event);

                if depth == 0 {
                    if let Some(done) = paragraph.take() {
                        flush_paragraph(done, substitutions, hits, &mut writer)?;
                    }
                }
            }
            None => match kind {
                Kind::ParagraphStart => {
                    depth = 1;
                    let mut buffer = ParagraphBuffer::default();
                    buffer.events.push(event);
                    paragraph = Some(buffer);
                }
                Kind::Text(text) if in_text => {
                    let out = substitutions.apply(&text, hits);
                    write_event(&mut writer, Event::Text(BytesText::new(&out)))?;
                }
                other => {
                    match other {
                        Kind::TextStart => in_text = true,
                        Kind::TextEnd => in_text = false,
                        _ => {}
                    }
                    write_event(&mut writer, event)?;
                }
            },
        }
    }

    // Unterminated paragraph at end of input: write what was buffered.
    if let Some(buffer) = paragraph.take() {
        flush_paragraph(buffer, substitutions, hits, &mut writer)?;
    }

    Ok(writer.into_inner())
}

fn flush_paragraph(
    buffer: ParagraphBuffer,
    substitutions: &Substitutions,
    hits: &mut BTreeSet<usize>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), RenderError> {
    let ParagraphBuffer {
        mut events,
        texts,
        complex,
        nested,
    } = buffer;

    if !complex && !nested && texts.len() > 1 {
        let joined: String = texts.iter().map(|node| node.text.as_str()).collect();
        let mut local = BTreeSet::new();
        let out = substitutions.apply(&joined, &mut local);

        if !local.is_empty() {
            hits.extend(local);
            for (n, node) in texts.iter().enumerate() {
                node.rewrite(&mut events, if n == 0 { out.as_str() } else { "" });
            }
            if let Some(start) = texts[0].start {
                preserve_space(&mut events[start]);
            }
        }
    } else {
        for node in &texts {
            let mut local = BTreeSet::new();
            let out = substitutions.apply(&node.text, &mut local);
            if !local.is_empty() {
                hits.extend(local);
                node.rewrite(&mut events, &out);
            }
        }
    }

    for event in events {
        write_event(writer, event)?;
    }
    Ok(())
}

/// Keeps leading/trailing spaces of merged text from being collapsed.
fn preserve_space(event: &mut Event<'static>) {
    if let Event::Start(start) = event {
        let present = start
            .attributes()
            .flatten()
            .any(|attr| attr.key.as_ref() == b"xml:space");
        if !present {
            start.push_attribute(("xml:space", "preserve"));
        }
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RenderError> {
    writer.write_event(event).map_err(xml_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::render::{Substitution, FALLBACK_MESSAGE};

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

    fn build_docx(document_xml: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(CONTENT_TYPES.as_bytes()).unwrap();
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut out = String::new();
        entry.read_to_string(&mut out).unwrap();
        out
    }

    fn subs(pairs: &[(&str, &str)]) -> Substitutions {
        Substitutions::new(
            pairs
                .iter()
                .map(|(n, v)| Substitution {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        )
    }

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        )
    }

    #[test]
    fn test_substitutes_placeholder_in_single_run() {
        let docx = build_docx(&wrap(
            r#"<w:p><w:r><w:t xml:space="preserve">Price {{sale}} </w:t></w:r></w:p>"#,
        ));
        let outcome = DocxRenderer::new().render(&docx, &subs(&[("sale", "$250,000.00")]));

        match outcome {
            RenderOutcome::Substituted {
                bytes,
                fields_replaced,
            } => {
                assert_eq!(fields_replaced, 1);
                let xml = read_part(&bytes, DOCUMENT_PART);
                assert!(xml.contains("Price $250,000.00 "));
                assert!(!xml.contains("{{sale}}"));
                assert_eq!(
                    read_part(&bytes, "[Content_Types].xml"),
                    CONTENT_TYPES
                );
            }
            other => panic!("expected substitution, got {:?}", other),
        }
    }

    #[test]
    fn test_substitutes_placeholder_split_across_runs() {
        let docx = build_docx(&wrap(
            r#"<w:p><w:r><w:t>Buyer: {{client</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>_name}}</w:t></w:r></w:p>"#,
        ));
        let outcome = DocxRenderer::new().render(&docx, &subs(&[("client_name", "Jane Doe")]));

        let RenderOutcome::Substituted {
            bytes,
            fields_replaced,
        } = outcome
        else {
            panic!("expected substitution");
        };
        assert_eq!(fields_replaced, 1);

        let xml = read_part(&bytes, DOCUMENT_PART);
        assert!(xml.contains(r#"xml:space="preserve">Buyer: Jane Doe</w:t>"#));
        assert!(!xml.contains("{{"));
        assert!(!xml.contains("_name}}"));
        assert!(xml.contains("<w:b/>"));
    }

    #[test]
    fn test_split_placeholder_next_to_entity() {
        let docx = build_docx(&wrap(
            r#"<w:p><w:r><w:t>Buyer {{buy</w:t></w:r><w:r><w:t>er}} &amp; Co &#169;</w:t></w:r></w:p>"#,
        ));
        let outcome = DocxRenderer::new().render(&docx, &subs(&[("buyer", "Smith")]));

        let RenderOutcome::Substituted {
            bytes,
            fields_replaced,
        } = outcome
        else {
            panic!("expected substitution");
        };
        assert_eq!(fields_replaced, 1);

        let xml = read_part(&bytes, DOCUMENT_PART);
        assert!(xml.contains("Buyer Smith &amp; Co \u{a9}"));
        assert!(!xml.contains("{{"));
    }

    #[test]
    fn test_unknown_entity_is_kept_in_place() {
        let docx = build_docx(&wrap(
            r#"<w:p><w:r><w:t>{{client}} &custom;</w:t></w:r><w:r><w:t> end</w:t></w:r></w:p>"#,
        ));
        let outcome = DocxRenderer::new().render(&docx, &subs(&[("client", "Jane")]));

        let RenderOutcome::Substituted {
            bytes,
            fields_replaced,
        } = outcome
        else {
            panic!("expected substitution");
        };
        assert_eq!(fields_replaced, 1);

        let xml = read_part(&bytes, DOCUMENT_PART);
        assert!(xml.contains("Jane &custom;"));
        assert!(xml.contains("> end</w:t>"));
    }

    #[test]
    fn test_values_are_xml_escaped() {
        let docx = build_docx(&wrap(r#"<w:p><w:r><w:t>{{client}}</w:t></w:r></w:p>"#));
        let outcome =
            DocxRenderer::new().render(&docx, &subs(&[("client", "Smith & Sons <LLC>")]));

        let RenderOutcome::Substituted { bytes, .. } = outcome else {
            panic!("expected substitution");
        };
        let xml = read_part(&bytes, DOCUMENT_PART);
        assert!(xml.contains("Smith &amp; Sons &lt;LLC&gt;"));
    }

    #[test]
    fn test_untouched_paragraphs_are_preserved() {
        let body = r#"<w:p><w:r><w:t>Plain</w:t></w:r><w:r><w:t> text</w:t></w:r></w:p>"#;
        let docx = build_docx(&wrap(body));
        let outcome = DocxRenderer::new().render(&docx, &subs(&[("client", "X")]));

        let RenderOutcome::Substituted {
            bytes,
            fields_replaced,
        } = outcome
        else {
            panic!("expected substitution");
        };
        assert_eq!(fields_replaced, 0);
        assert!(read_part(&bytes, DOCUMENT_PART).contains(body));
    }

    #[test]
    fn test_header_parts_are_substituted() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer
            .write_all(wrap("<w:p><w:r><w:t>Body</w:t></w:r></w:p>").as_bytes())
            .unwrap();
        writer.start_file("word/header1.xml", options).unwrap();
        writer
            .write_all(
                br#"<w:hdr xmlns:w="urn:w"><w:p><w:r><w:t>{{address}}</w:t></w:r></w:p></w:hdr>"#,
            )
            .unwrap();
        let docx = writer.finish().unwrap().into_inner();

        let outcome = DocxRenderer::new().render(&docx, &subs(&[("address", "1 Main St")]));
        let RenderOutcome::Substituted {
            bytes,
            fields_replaced,
        } = outcome
        else {
            panic!("expected substitution");
        };
        assert_eq!(fields_replaced, 1);
        assert!(read_part(&bytes, "word/header1.xml").contains("1 Main St"));
    }

    #[test]
    fn test_invalid_package_falls_back_to_copy() {
        let bytes = b"not a zip archive".to_vec();
        let outcome = DocxRenderer::new().render(&bytes, &subs(&[("a", "b")]));
        assert_eq!(
            outcome,
            RenderOutcome::Copied {
                bytes,
                message: FALLBACK_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_package_without_document_falls_back() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"{{a}}").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let outcome = DocxRenderer::new().render(&bytes, &subs(&[("a", "b")]));
        assert!(matches!(outcome, RenderOutcome::Copied { .. }));
    }

    #[test]
    fn test_part_selection() {
        assert!(is_substitutable_part("word/document.xml"));
        assert!(is_substitutable_part("word/footer2.xml"));
        assert!(!is_substitutable_part("word/styles.xml"));
        assert!(!is_substitutable_part("word/_rels/header1.xml.rels"));
    }
}
