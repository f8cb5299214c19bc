//! Builders for loop and template payloads.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use loopdesk::templates::{MIME_DOCX, MIME_PDF, MIME_TEXT};
use loopdesk::{FieldMappingInput, NewLoop, TemplateUpload};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builder for `NewLoop` payloads. Starts with the two required fields.
pub struct LoopBuilder {
    input: NewLoop,
}

impl LoopBuilder {
    pub fn new() -> Self {
        Self {
            input: NewLoop {
                loop_type: Some("Purchase".to_string()),
                property_address: Some("123 Main St".to_string()),
                ..Default::default()
            },
        }
    }

    pub fn loop_type(mut self, value: &str) -> Self {
        self.input.loop_type = Some(value.to_string());
        self
    }

    pub fn address(mut self, value: &str) -> Self {
        self.input.property_address = Some(value.to_string());
        self
    }

    pub fn client(mut self, name: &str) -> Self {
        self.input.client_name = Some(name.to_string());
        self
    }

    pub fn email(mut self, value: &str) -> Self {
        self.input.client_email = Some(value.to_string());
        self
    }

    pub fn sale(mut self, value: &str) -> Self {
        self.input.sale = Some(value.to_string());
        self
    }

    pub fn status(mut self, value: &str) -> Self {
        self.input.status = Some(value.to_string());
        self
    }

    pub fn tags(mut self, value: &str) -> Self {
        self.input.tags = Some(value.to_string());
        self
    }

    pub fn dates(mut self, start: &str, end: &str) -> Self {
        self.input.start_date = Some(start.to_string());
        self.input.end_date = Some(end.to_string());
        self
    }

    pub fn end_date(mut self, end: &str) -> Self {
        self.input.end_date = Some(end.to_string());
        self
    }

    pub fn build(self) -> NewLoop {
        self.input
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TemplateUpload` payloads.
pub struct TemplateBuilder {
    upload: TemplateUpload,
}

impl TemplateBuilder {
    pub fn text(name: &str, body: &str) -> Self {
        Self::with_file(name, "template.txt", MIME_TEXT, body.as_bytes().to_vec())
    }

    pub fn docx(name: &str, document_xml: &str) -> Self {
        Self::with_file(name, "template.docx", MIME_DOCX, docx_package(document_xml))
    }

    pub fn pdf(name: &str) -> Self {
        Self::with_file(name, "template.pdf", MIME_PDF, b"%PDF-1.4\n%fake\n".to_vec())
    }

    pub fn with_file(name: &str, file_name: &str, mimetype: &str, bytes: Vec<u8>) -> Self {
        Self {
            upload: TemplateUpload {
                name: name.to_string(),
                description: None,
                category: "contract".to_string(),
                file_name: file_name.to_string(),
                mimetype: mimetype.to_string(),
                bytes,
            },
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.upload.category = category.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.upload.description = Some(description.to_string());
        self
    }

    pub fn build(self) -> TemplateUpload {
        self.upload
    }
}

/// `(name, loop_field, type)` triples as mapping inputs.
pub fn mappings(items: &[(&str, &str, &str)]) -> Vec<FieldMappingInput> {
    items
        .iter()
        .map(|(name, field, ty)| FieldMappingInput::new(name, field, ty))
        .collect()
}

/// A minimal Word package around one body.
pub fn docx_package(document_xml: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer
        .write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(document_xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Wraps paragraphs in a Word document body.
pub fn word_body(paragraphs: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        paragraphs
    )
}

/// Reads one part of a zip package as text.
pub fn read_part(package: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(package)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = String::new();
    std::io::Read::read_to_string(&mut file, &mut out).unwrap();
    out
}

/// A small solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
